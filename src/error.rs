use std::path::PathBuf;

/// Errors that can stop the renderer. All of them are fatal for the viewer.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// I/O error while reading an asset.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse an OBJ mesh file.
    #[error("OBJ parse error for {path}: {source}")]
    ObjParse {
        path: PathBuf,
        #[source]
        source: obj::ObjError,
    },

    /// Failed to decode a texture image.
    #[error("image decode error for {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// A face refers to a vertex attribute that does not exist.
    #[error("face {face} refers to {channel} index {index}, but only {len} are defined")]
    IndexOutOfRange {
        face: usize,
        channel: &'static str,
        index: usize,
        len: usize,
    },

    /// A polygon whose normal or uv list doesn't match its corner count.
    #[error("polygon {polygon} has {len} {channel} indices for {corners} corners")]
    ChannelLength {
        polygon: usize,
        channel: &'static str,
        len: usize,
        corners: usize,
    },

    /// Shader name not present in the registry.
    #[error("unknown shader {0:?} (available: {1})")]
    UnknownShader(String, String),

    /// A mesh shader was selected but no mesh was loaded.
    #[error("shader {0:?} needs a mesh")]
    MissingMesh(&'static str),

    /// Framebuffer with zero width or height.
    #[error("framebuffer of size {0}x{1} is empty")]
    EmptyFramebuffer(u32, u32),

    /// A worker exited without reporting completion.
    #[error("{lost} of {expected} shading workers did not report back")]
    WorkerLost { lost: usize, expected: usize },
}
