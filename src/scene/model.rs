use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use image::RgbaImage;
use log::{debug, info, warn};
use nalgebra as na;
use na::{vector, Vector2, Vector3, Vector4};
use obj::raw::object::Polygon;
use obj::raw::{parse_obj, RawObj};

use super::color::Color;
use crate::error::RenderError;

/// One triangle: indices into positions, and optionally into normals and uvs.
/// Every channel is indexed independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Face {
    pub positions: [usize; 3],
    pub normals: Option<[usize; 3]>,
    pub uvs: Option<[usize; 3]>,
}

/// Polygon as it comes out of the OBJ file, with an arbitrary number of corners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polygonal {
    pub positions: Vec<usize>,
    pub normals: Option<Vec<usize>>,
    pub uvs: Option<Vec<usize>>,
}

impl Polygonal {
    fn from_raw(polygon: &Polygon) -> Self {
        return match polygon {
            Polygon::P(p) => Polygonal { positions: p.clone(), normals: None, uvs: None },
            Polygon::PT(pt) => Polygonal {
                positions: pt.iter().map(|v| v.0).collect(),
                normals: None,
                uvs: Some(pt.iter().map(|v| v.1).collect()),
            },
            Polygon::PN(pn) => Polygonal {
                positions: pn.iter().map(|v| v.0).collect(),
                normals: Some(pn.iter().map(|v| v.1).collect()),
                uvs: None,
            },
            Polygon::PTN(ptn) => Polygonal {
                positions: ptn.iter().map(|v| v.0).collect(),
                normals: Some(ptn.iter().map(|v| v.2).collect()),
                uvs: Some(ptn.iter().map(|v| v.1).collect()),
            },
        };
    }

    /// Every present channel needs one index per corner.
    fn check_channels(&self, polygon: usize) -> Result<(), RenderError> {
        let corners = self.positions.len();
        let channels = [("normal", &self.normals), ("uv", &self.uvs)];
        for (channel, indices) in channels {
            if let Some(indices) = indices {
                if indices.len() != corners {
                    return Err(RenderError::ChannelLength { polygon, channel, len: indices.len(), corners });
                }
            }
        }
        return Ok(());
    }
}

/// Splits a polygon into triangles sharing its first corner.
/// A quad [0, 1, 2, 3] becomes [0, 1, 2] and [0, 2, 3].
pub fn triangulate(polygon: &Polygonal) -> Vec<Face> {
    let corners = polygon.positions.len();
    if corners < 3 {
        return Vec::new();
    }
    let pick = |channel: &Vec<usize>, i: usize| [channel[0], channel[i], channel[i + 1]];
    return (1..corners - 1)
        .map(|i| Face {
            positions: pick(&polygon.positions, i),
            normals: polygon.normals.as_ref().map(|n| pick(n, i)),
            uvs: polygon.uvs.as_ref().map(|t| pick(t, i)),
        })
        .collect();
}

/// Loaded mesh with its triangulated faces and an optional diffuse texture.
/// Read-only once built, shared between workers.
pub struct Model {
    positions: Vec<Vector4<f32>>,
    normals: Vec<Vector3<f32>>,
    uvs: Vec<Vector2<f32>>,
    faces: Vec<Face>,
    texture: Option<RgbaImage>,
}

impl Model {
    /// Builds a model from raw attribute arrays and polygons, checking every index.
    pub fn new(
        positions: Vec<Vector4<f32>>,
        normals: Vec<Vector3<f32>>,
        uvs: Vec<Vector2<f32>>,
        polygons: &[Polygonal],
    ) -> Result<Self, RenderError> {
        for (i, polygon) in polygons.iter().enumerate() {
            polygon.check_channels(i)?;
        }
        let faces: Vec<Face> = polygons.iter().flat_map(triangulate).collect();
        let skipped = polygons.iter().filter(|p| p.positions.len() < 3).count();
        if skipped > 0 {
            warn!("Skipped {} polygons with less than 3 vertices", skipped);
        }

        let model = Model { positions, normals, uvs, faces, texture: None };
        model.validate()?;
        return Ok(model);
    }

    /// Parses OBJ text from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R, path: &Path) -> Result<Self, RenderError> {
        let raw: RawObj = parse_obj(reader).map_err(|source| RenderError::ObjParse {
            path: path.to_path_buf(),
            source,
        })?;
        let positions = raw
            .positions
            .iter()
            .map(|&(x, y, z, w)| vector![x, y, z, w])
            .collect();
        let normals = raw.normals.iter().map(|&(x, y, z)| vector![x, y, z]).collect();
        let uvs = raw.tex_coords.iter().map(|&(u, v, _)| vector![u, v]).collect();
        let polygons: Vec<Polygonal> = raw.polygons.iter().map(Polygonal::from_raw).collect();
        if !raw.lines.is_empty() || !raw.points.is_empty() {
            debug!("Ignoring {} lines and {} points", raw.lines.len(), raw.points.len());
        }
        return Model::new(positions, normals, uvs, &polygons);
    }

    /// Loads an OBJ file.
    pub fn load(path: &Path) -> Result<Self, RenderError> {
        let file = File::open(path).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model = Model::from_reader(BufReader::new(file), path)?;
        info!("Number of vertices - {}", model.positions.len());
        info!("Number of normals  - {}", model.normals.len());
        info!("Number of uvs      - {}", model.uvs.len());
        info!("Number of faces    - {} (triangulated)", model.faces.len());
        return Ok(model);
    }

    /// Attaches a texture decoded from any format the image crate can read.
    pub fn load_texture(&mut self, path: &Path) -> Result<(), RenderError> {
        let texture = image::open(path)
            .map_err(|source| RenderError::ImageDecode {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();
        info!("Texture {}x{} from {}", texture.width(), texture.height(), path.display());
        self.set_texture(texture);
        return Ok(());
    }

    pub fn set_texture(&mut self, texture: RgbaImage) {
        self.texture = Some(texture);
    }

    /// Rescales and recenters positions so the mesh fits the [-1, 1] cube.
    pub fn fit_unit_cube(&mut self) {
        if self.positions.is_empty() {
            return;
        }
        let mut lo = vector![f32::MAX, f32::MAX, f32::MAX];
        let mut hi = vector![f32::MIN, f32::MIN, f32::MIN];
        for p in self.positions.iter() {
            let p = p.xyz() / p.w;
            lo = lo.inf(&p);
            hi = hi.sup(&p);
        }
        let center = (lo + hi) / 2.0;
        let extent = (hi - lo).max() / 2.0;
        if extent <= 0.0 {
            return;
        }
        for p in self.positions.iter_mut() {
            let q = (p.xyz() / p.w - center) / extent;
            *p = vector![q.x, q.y, q.z, 1.0];
        }
        debug!("Fitted mesh: center {:?}, extent {}", center, extent);
    }

    pub fn faces(&self) -> &[Face] {
        return &self.faces;
    }

    pub fn position(&self, index: usize) -> Vector4<f32> {
        return self.positions[index];
    }

    pub fn normal(&self, index: usize) -> Vector3<f32> {
        return self.normals[index];
    }

    pub fn uv(&self, index: usize) -> Vector2<f32> {
        return self.uvs[index];
    }

    /// Nearest texel at uv, v axis flipped since texture rows start at the top.
    /// White when no texture is attached.
    pub fn sample(&self, uv: Vector2<f32>) -> Color {
        let texture = match &self.texture {
            Some(texture) => texture,
            None => return Color::WHITE,
        };
        let (width, height) = texture.dimensions();
        if width == 0 || height == 0 {
            return Color::WHITE;
        }
        let x = (uv.x * width as f32) as i64;
        let y = ((1.0 - uv.y) * height as f32) as i64;
        let x = x.clamp(0, width as i64 - 1) as u32;
        let y = y.clamp(0, height as i64 - 1) as u32;
        return Color::from(*texture.get_pixel(x, y));
    }

    fn validate(&self) -> Result<(), RenderError> {
        let check = |face: usize, channel: &'static str, indices: &[usize; 3], len: usize| {
            match indices.iter().find(|&&index| index >= len) {
                Some(&index) => Err(RenderError::IndexOutOfRange { face, channel, index, len }),
                None => Ok(()),
            }
        };
        for (i, face) in self.faces.iter().enumerate() {
            check(i, "position", &face.positions, self.positions.len())?;
            if let Some(normals) = &face.normals {
                check(i, "normal", normals, self.normals.len())?;
            }
            if let Some(uvs) = &face.uvs {
                check(i, "uv", uvs, self.uvs.len())?;
            }
        }
        return Ok(());
    }
}
