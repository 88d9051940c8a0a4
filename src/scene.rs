pub mod buffer;
pub mod color;
pub mod model;
pub mod raster;
pub mod renderer;
pub mod scheduler;
pub mod shader;
pub mod util;

pub use buffer::Framebufctl;
pub use model::Model;
pub use renderer::{RenderContext, Renderer};
pub use scheduler::Scheduler;
pub use shader::Shader;
