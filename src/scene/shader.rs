use std::fmt;
use std::str::FromStr;

use nalgebra as na;
use na::{vector, Matrix2, Matrix4, Vector2, Vector3, Vector4};

use super::color::Color;
use super::util::{smoothstep, to_hom_vector};
use crate::error::RenderError;

/// Frame constants, the same for every vertex and fragment of a shading pass.
#[derive(Debug, Clone)]
pub struct Uniforms {
    pub time: u64,                      // Nanoseconds since the renderer started.
    pub width: u32,                     // Width of the target framebuffer.
    pub height: u32,                    // Height of the target framebuffer.
    pub light_direction: Vector3<f32>,  // Unit vector pointing towards the light.
    pub model_matrix: Matrix4<f32>,     // Object rotation and scale.
    pub normal_matrix: Matrix4<f32>,    // Object rotation, applied to normals.
    pub vpv_matrix: Matrix4<f32>,       // Viewport * projection * view.
    pub show_normals: bool,             // Draw the normal overlay.
}

impl Uniforms {
    /// Elapsed time in seconds.
    pub fn seconds(&self) -> f32 {
        return self.time as f32 * 1e-9;
    }
}

impl Default for Uniforms {
    fn default() -> Self {
        return Self {
            time: 0,
            width: 1,
            height: 1,
            light_direction: vector![0.0, 0.0, 1.0],
            model_matrix: Matrix4::identity(),
            normal_matrix: Matrix4::identity(),
            vpv_matrix: Matrix4::identity(),
            show_normals: false,
        };
    }
}

/// Values handed from the vertex stage to the fragment stage of one triangle.
#[derive(Debug, Clone, Copy, Default)]
pub struct Varyings {
    pub intensities: [f32; 3],         // Diffuse light intensity at each vertex.
    pub normals: [Vector3<f32>; 3],    // Rotated unit normal at each vertex.
}

/// Input of a vertex shader. The shader may rewrite position and normal in place.
pub struct VertexParams<'a> {
    pub uniforms: &'a Uniforms,
    pub varyings: &'a mut Varyings,
    pub position: Vector4<f32>,
    pub normal: Vector3<f32>,
    pub idx: usize, // Slot of the vertex in its triangle, 0..3.
}

/// Input of a fragment shader.
pub struct FragmentParams<'a> {
    pub uniforms: &'a Uniforms,
    pub varyings: &'a Varyings,
    pub p: Vector2<u32>,  // Pixel position in the framebuffer.
    pub bc: Vector3<f32>, // Barycentric coordinates inside the triangle.
    pub staged: Color,    // Texture sample or white.
}

/// The shaders the renderer knows about. Each one is a vertex + fragment pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shader {
    /// Projection only, fragments keep the staged color.
    Identity,
    /// Per vertex diffuse lighting, interpolated across the face.
    Gouraud,
    /// Diffuse lighting quantized into bands.
    Toon,
    /// Pulsing disc, discards everything outside of it.
    Circle,
    /// Rotating rounded box.
    Box,
    /// Distance field rings around a moving circle.
    Rings,
}

/// Shader registry, looked up by name at startup.
pub const REGISTRY: [(&str, Shader); 6] = [
    ("identity", Shader::Identity),
    ("gouraud", Shader::Gouraud),
    ("toon", Shader::Toon),
    ("circle", Shader::Circle),
    ("box", Shader::Box),
    ("rings", Shader::Rings),
];

const TOON_TINT: Color = Color::rgb(255, 170, 60);

impl Shader {
    pub fn from_name(name: &str) -> Result<Shader, RenderError> {
        return REGISTRY
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, shader)| *shader)
            .ok_or_else(|| RenderError::UnknownShader(name.to_string(), Shader::names().join(", ")));
    }

    pub fn names() -> Vec<&'static str> {
        return REGISTRY.iter().map(|(name, _)| *name).collect();
    }

    pub fn name(self) -> &'static str {
        return match self {
            Shader::Identity => "identity",
            Shader::Gouraud => "gouraud",
            Shader::Toon => "toon",
            Shader::Circle => "circle",
            Shader::Box => "box",
            Shader::Rings => "rings",
        };
    }

    /// Procedural shaders are evaluated for every pixel, without a mesh.
    pub fn is_procedural(self) -> bool {
        return matches!(self, Shader::Circle | Shader::Box | Shader::Rings);
    }

    pub fn culls_back_faces(self) -> bool {
        return matches!(self, Shader::Gouraud | Shader::Toon);
    }

    /// Returns clip space coordinates of the vertex, w is left undivided.
    pub fn vertex(self, params: &mut VertexParams) -> Vector4<f32> {
        match self {
            Shader::Identity => {
                params.varyings.intensities[params.idx] = 1.0;
                params.varyings.normals[params.idx] = params.normal;
            }
            Shader::Gouraud | Shader::Toon => diffuse(params),
            // No geometry goes through procedural shaders.
            Shader::Circle | Shader::Box | Shader::Rings => (),
        }
        return params.uniforms.vpv_matrix * (params.uniforms.model_matrix * params.position);
    }

    /// Final color of the fragment, None to discard it.
    pub fn fragment(self, params: &FragmentParams) -> Option<Color> {
        return match self {
            Shader::Identity => Some(params.staged),
            Shader::Gouraud => Some(params.staged.scale(interpolated_intensity(params))),
            Shader::Toon => {
                let band = toon_band(interpolated_intensity(params));
                Some(params.staged.modulate(TOON_TINT).scale(band))
            }
            Shader::Circle => circle(params),
            Shader::Box => Some(rounded_box(params)),
            Shader::Rings => Some(rings(params)),
        };
    }
}

impl FromStr for Shader {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        return Shader::from_name(s);
    }
}

impl fmt::Display for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(self.name());
    }
}

/// Rotates the normal with the object and stores max(0, n . light) for the vertex slot.
fn diffuse(params: &mut VertexParams) {
    let rotated = (params.uniforms.normal_matrix * to_hom_vector(params.normal)).xyz();
    let normal = rotated.try_normalize(f32::EPSILON).unwrap_or_else(Vector3::zeros);
    params.normal = normal;
    params.varyings.normals[params.idx] = normal;
    params.varyings.intensities[params.idx] = normal.dot(&params.uniforms.light_direction).max(0.0);
}

fn interpolated_intensity(params: &FragmentParams) -> f32 {
    let intensities = Vector3::from(params.varyings.intensities);
    return params.bc.dot(&intensities).clamp(0.0, 1.0);
}

fn toon_band(intensity: f32) -> f32 {
    return match intensity {
        i if i > 0.85 => 1.0,
        i if i > 0.60 => 0.80,
        i if i > 0.45 => 0.60,
        i if i > 0.30 => 0.45,
        i if i > 0.15 => 0.30,
        _ => 0.0,
    };
}

/// Pixel position mapped to a frame centered on the screen, y up, with the
/// shorter side spanning [-1, 1].
fn centered_uv(params: &FragmentParams) -> Vector2<f32> {
    let u = params.uniforms;
    let half = u.width.min(u.height) as f32 / 2.0;
    return vector![
        (params.p.x as f32 + 0.5 - u.width as f32 / 2.0) / half,
        (u.height as f32 / 2.0 - params.p.y as f32 - 0.5) / half
    ];
}

fn circle(params: &FragmentParams) -> Option<Color> {
    let t = params.uniforms.seconds();
    let uv = centered_uv(params);
    let radius = 0.5 + 0.2 * t.sin();
    let d = uv.norm();
    if d > radius {
        return None;
    }
    let rim = smoothstep(radius - 0.05, radius, d);
    return Some(Color::blend(Color::WHITE, Color::rgb(220, 40, 40), rim));
}

fn rounded_box(params: &FragmentParams) -> Color {
    let t = params.uniforms.seconds();
    let (s, c) = t.sin_cos();
    let uv = Matrix2::new(c, s, -s, c) * centered_uv(params);
    let half_size = vector![0.5, 0.3];
    let corner = 0.1;
    let q = uv.abs() - half_size;
    let d = q.sup(&Vector2::zeros()).norm() + q.x.max(q.y).min(0.0) - corner;
    let inside = 1.0 - smoothstep(-0.01, 0.01, d);
    let background = Color::gray(0.15 + 0.1 * (1.0 - uv.norm()).max(0.0));
    return Color::blend(Color::rgb(60, 140, 230), background, inside);
}

fn rings(params: &FragmentParams) -> Color {
    let t = params.uniforms.seconds();
    let center = vector![0.3 * t.cos(), 0.3 * (1.3 * t).sin()];
    let d = (centered_uv(params) - center).norm() - 0.4;
    let base = if d > 0.0 { Color::rgb(230, 150, 80) } else { Color::rgb(100, 160, 230) };
    let falloff = 1.0 - (-3.0 * d.abs()).exp();
    let waves = 0.8 + 0.2 * (60.0 * d - 4.0 * t).cos();
    let edge = 1.0 - smoothstep(0.0, 0.015, d.abs());
    return Color::blend(Color::WHITE, base.scale(falloff * waves), edge);
}
