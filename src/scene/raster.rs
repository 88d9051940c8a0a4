use std::ops::Range;

use nalgebra as na;
use na::{vector, Vector2, Vector3, Vector4};

use super::buffer::Framebuffer;
use super::color::Color;
use super::model::{Face, Model};
use super::shader::{FragmentParams, Shader, Uniforms, Varyings, VertexParams};
use super::util::{barycentric, from_hom_point, signed_area, to_hom_point, BoundingBox};

const NORMAL_OVERLAY_COLOR: Color = Color::GREEN;
const NORMAL_OVERLAY_LENGTH: f32 = 0.1;

/// Triangle after the vertex stage: clip space corners (w not divided yet) and
/// the texture coordinates of the corners, if the face has any.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub clip: [Vector4<f32>; 3],
    pub uvs: Option<[Vector2<f32>; 3]>,
}

/// Runs the vertex stage and the rasterizer for one face.
/// Returns the number of fragments that made it into the framebuffer.
pub fn shade_face(fb: &Framebuffer, model: &Model, shader: Shader, uniforms: &Uniforms, face: &Face) -> usize {
    let corners = face.positions.map(|i| model.position(i));
    // Faces without normals get one flat normal, outward for counter-clockwise winding.
    let flat_normal = match face.normals {
        Some(_) => Vector3::zeros(),
        None => {
            let [a, b, c] = corners.map(|p| p.xyz() / p.w);
            -(c - a).cross(&(b - a))
        }
    };

    let mut varyings = Varyings::default();
    let mut clip = [Vector4::zeros(); 3];
    for i in 0..3 {
        let mut params = VertexParams {
            uniforms,
            varyings: &mut varyings,
            position: corners[i],
            normal: face.normals.map_or(flat_normal, |n| model.normal(n[i])),
            idx: i,
        };
        clip[i] = shader.vertex(&mut params);
    }

    let triangle = Triangle {
        clip,
        uvs: face.uvs.map(|t| t.map(|i| model.uv(i))),
    };
    let written = rasterize(fb, model, shader, uniforms, &varyings, &triangle);

    if uniforms.show_normals && written > 0 {
        let world = corners.map(|p| (uniforms.model_matrix * p).xyz() / p.w);
        let centroid = (world[0] + world[1] + world[2]) / 3.0;
        let normal = varyings.normals[0] + varyings.normals[1] + varyings.normals[2];
        draw_normal(fb, uniforms, centroid, normal);
    }
    return written;
}

/// Fills the pixels covered by the triangle, returns how many were written.
pub fn rasterize(
    fb: &Framebuffer,
    model: &Model,
    shader: Shader,
    uniforms: &Uniforms,
    varyings: &Varyings,
    triangle: &Triangle,
) -> usize {
    let clip = triangle.clip;
    // Nothing gets clipped, corners behind the camera drop the whole triangle.
    if clip.iter().any(|v| v.w <= 0.0) {
        return 0;
    }
    let screen = clip.map(|v| vector![v.x / v.w, v.y / v.w]);
    let area = signed_area(screen[0], screen[1], screen[2]);
    // Screen y grows downwards, so front faces end up with a negative area.
    if shader.culls_back_faces() && area >= 0.0 {
        return 0;
    }

    let bbox = BoundingBox::of_triangle(screen, fb.width(), fb.height());
    if bbox.is_empty() {
        return 0;
    }

    let z = vector![clip[0].z, clip[1].z, clip[2].z];
    let w = vector![clip[0].w, clip[1].w, clip[2].w];
    let mut written = 0;
    for y in bbox.min.y..bbox.max.y {
        for x in bbox.min.x..bbox.max.x {
            let p = vector![x as f32, y as f32];
            let bc = barycentric(screen[0], screen[1], screen[2], p);
            if bc.x < 0.0 || bc.y < 0.0 || bc.z < 0.0 {
                continue;
            }
            let (x, y) = (x as u32, y as u32);
            let depth = (bc.dot(&z) / bc.dot(&w)).clamp(0.0, 1.0);
            if !fb.depth_test(x, y, depth) {
                continue;
            }

            let staged = match &triangle.uvs {
                Some(uvs) => model.sample(perspective_uv(uvs, bc, w)),
                None => Color::WHITE,
            };
            let params = FragmentParams {
                uniforms,
                varyings,
                p: vector![x, y],
                bc,
                staged,
            };
            let color = match shader.fragment(&params) {
                Some(color) => color,
                None => continue,
            };
            // The depth may have been taken by another worker in the meantime.
            if fb.commit(x, y, depth, color) {
                written += 1;
            }
        }
    }
    return written;
}

/// UV at a fragment, interpolated with weights corrected by 1 / w.
fn perspective_uv(uvs: &[Vector2<f32>; 3], bc: Vector3<f32>, w: Vector3<f32>) -> Vector2<f32> {
    let weights = bc.component_div(&w);
    let sum = weights.sum();
    if sum == 0.0 {
        return uvs[0];
    }
    return (uvs[0] * weights.x + uvs[1] * weights.y + uvs[2] * weights.z) / sum;
}

/// Draws a short line from the centroid along the normal into the overlay layer.
fn draw_normal(fb: &Framebuffer, uniforms: &Uniforms, centroid: Vector3<f32>, normal: Vector3<f32>) {
    let normal = match normal.try_normalize(f32::EPSILON) {
        Some(normal) => normal,
        None => return,
    };
    let tip = centroid + normal * NORMAL_OVERLAY_LENGTH;
    let project = |v: Vector3<f32>| {
        let clip = uniforms.vpv_matrix * to_hom_point(v);
        if clip.w <= 0.0 {
            return None;
        }
        let screen = from_hom_point(clip);
        return Some(vector![screen.x as i32, screen.y as i32]);
    };
    if let (Some(a), Some(b)) = (project(centroid), project(tip)) {
        fb.draw_normal_line(a, b, NORMAL_OVERLAY_COLOR);
    }
}

/// Evaluates a procedural shader for every pixel of the given rows.
pub fn shade_rows(fb: &Framebuffer, shader: Shader, uniforms: &Uniforms, rows: Range<usize>) {
    let varyings = Varyings::default();
    let mut row = vec![None; fb.width() as usize];
    for y in rows {
        let y = y as u32;
        for (x, out) in row.iter_mut().enumerate() {
            let params = FragmentParams {
                uniforms,
                varyings: &varyings,
                p: vector![x as u32, y],
                bc: Vector3::zeros(),
                staged: Color::WHITE,
            };
            *out = shader.fragment(&params);
        }
        fb.put_row(y, &row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::model::Polygonal;

    fn model() -> Model {
        return Model::new(vec![vector![0.0, 0.0, 0.0, 1.0]], Vec::new(), Vec::new(), &[]).unwrap();
    }

    fn flat(points: [(f32, f32); 3], z: f32) -> Triangle {
        return Triangle {
            clip: points.map(|(x, y)| vector![x, y, z, 1.0]),
            uvs: None,
        };
    }

    fn count(fb: &Framebuffer) -> usize {
        return fb.layers().color.iter().filter(|&&c| c != Color::TRANSPARENT).count();
    }

    #[test]
    fn fills_inside_only() {
        let fb = Framebuffer::new(20, 20).unwrap();
        let varyings = Varyings::default();
        let tri = flat([(2.0, 2.0), (12.0, 2.0), (2.0, 12.0)], 0.5);
        let written = rasterize(&fb, &model(), Shader::Identity, &Uniforms::default(), &varyings, &tri);
        assert_eq!(written, count(&fb));
        // Edge inclusive right triangle with legs of 10 pixels.
        assert_eq!(written, 66);
        assert_eq!(fb.color_at(2, 2), Color::WHITE);
        assert_eq!(fb.color_at(7, 7), Color::WHITE);
        assert_eq!(fb.color_at(8, 8), Color::TRANSPARENT);
        assert_eq!(fb.depth_at(3, 3), 0.5);
    }

    #[test]
    fn nearer_triangle_wins_regardless_of_order() {
        let varyings = Varyings::default();
        let uniforms = Uniforms::default();
        let far = flat([(0.0, 0.0), (9.0, 0.0), (0.0, 9.0)], 0.2);
        let near = flat([(0.0, 0.0), (9.0, 0.0), (0.0, 9.0)], 0.8);
        let near_count = |fb: &Framebuffer| {
            let layers = fb.layers();
            layers.z_buffer.iter().filter(|&&z| z == 0.8).count()
        };

        let fb = Framebuffer::new(10, 10).unwrap();
        rasterize(&fb, &model(), Shader::Identity, &uniforms, &varyings, &far);
        assert!(rasterize(&fb, &model(), Shader::Identity, &uniforms, &varyings, &near) > 0);
        let first = near_count(&fb);

        let fb = Framebuffer::new(10, 10).unwrap();
        rasterize(&fb, &model(), Shader::Identity, &uniforms, &varyings, &near);
        assert_eq!(rasterize(&fb, &model(), Shader::Identity, &uniforms, &varyings, &far), 0);
        assert_eq!(near_count(&fb), first);
    }

    #[test]
    fn equal_depth_keeps_first() {
        let fb = Framebuffer::new(10, 10).unwrap();
        let varyings = Varyings::default();
        let uniforms = Uniforms::default();
        let tri = flat([(0.0, 0.0), (9.0, 0.0), (0.0, 9.0)], 0.5);
        assert!(rasterize(&fb, &model(), Shader::Identity, &uniforms, &varyings, &tri) > 0);
        assert_eq!(rasterize(&fb, &model(), Shader::Identity, &uniforms, &varyings, &tri), 0);
    }

    #[test]
    fn depth_is_perspective_correct() {
        let fb = Framebuffer::new(20, 20).unwrap();
        let varyings = Varyings::default();
        // Screen corners (0, 0), (18, 0), (0, 18) once divided by w.
        let tri = Triangle {
            clip: [
                vector![0.0, 0.0, 1.0, 1.0],
                vector![36.0, 0.0, 1.0, 2.0],
                vector![0.0, 72.0, 1.0, 4.0],
            ],
            uvs: None,
        };
        rasterize(&fb, &model(), Shader::Identity, &Uniforms::default(), &varyings, &tri);

        let bc = barycentric(vector![0.0, 0.0], vector![18.0, 0.0], vector![0.0, 18.0], vector![4.0, 4.0]);
        let expected = 1.0 / bc.dot(&vector![1.0, 2.0, 4.0]);
        assert!((fb.depth_at(4, 4) - expected).abs() < 1e-6);
        // Linear interpolation of z / w would give a different value.
        let linear = bc.dot(&vector![1.0, 0.5, 0.25]);
        assert!((fb.depth_at(4, 4) - linear).abs() > 0.1);
    }

    #[test]
    fn depth_is_clamped_to_unit_range() {
        let fb = Framebuffer::new(10, 10).unwrap();
        let varyings = Varyings::default();
        let uniforms = Uniforms::default();
        let near = flat([(0.0, 0.0), (9.0, 0.0), (0.0, 9.0)], 3.0);
        assert!(rasterize(&fb, &model(), Shader::Identity, &uniforms, &varyings, &near) > 0);
        assert_eq!(fb.depth_at(1, 1), 1.0);
        assert_eq!(fb.depth_at(3, 2), 1.0);

        let fb = Framebuffer::new(10, 10).unwrap();
        let behind_target = flat([(0.0, 0.0), (9.0, 0.0), (0.0, 9.0)], -2.0);
        assert!(rasterize(&fb, &model(), Shader::Identity, &uniforms, &varyings, &behind_target) > 0);
        assert_eq!(fb.depth_at(1, 1), 0.0);
    }

    #[test]
    fn degenerate_and_behind_camera_are_skipped() {
        let fb = Framebuffer::new(10, 10).unwrap();
        let varyings = Varyings::default();
        let uniforms = Uniforms::default();
        let line = flat([(0.0, 0.0), (5.0, 5.0), (9.0, 9.0)], 0.5);
        assert_eq!(rasterize(&fb, &model(), Shader::Identity, &uniforms, &varyings, &line), 0);
        let mut behind = flat([(0.0, 0.0), (9.0, 0.0), (0.0, 9.0)], 0.5);
        behind.clip[1].w = -1.0;
        assert_eq!(rasterize(&fb, &model(), Shader::Identity, &uniforms, &varyings, &behind), 0);
        assert_eq!(count(&fb), 0);
    }

    #[test]
    fn culling_follows_winding() {
        let varyings = Varyings { intensities: [1.0; 3], ..Default::default() };
        let uniforms = Uniforms::default();
        // Clockwise on a y-down screen is counter-clockwise in NDC, so it faces the camera.
        let front = flat([(1.0, 8.0), (8.0, 8.0), (1.0, 1.0)], 0.5);
        let back = flat([(1.0, 8.0), (1.0, 1.0), (8.0, 8.0)], 0.5);
        let fb = Framebuffer::new(10, 10).unwrap();
        assert_eq!(rasterize(&fb, &model(), Shader::Gouraud, &uniforms, &varyings, &back), 0);
        assert!(rasterize(&fb, &model(), Shader::Gouraud, &uniforms, &varyings, &front) > 0);
        let fb = Framebuffer::new(10, 10).unwrap();
        assert!(rasterize(&fb, &model(), Shader::Identity, &uniforms, &varyings, &back) > 0);
    }

    #[test]
    fn textured_triangle_samples_texture() {
        let mut textured = model();
        textured.set_texture(image::RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 255])));
        let fb = Framebuffer::new(10, 10).unwrap();
        let mut tri = flat([(0.0, 0.0), (9.0, 0.0), (0.0, 9.0)], 0.5);
        tri.uvs = Some([vector![0.0, 0.0], vector![1.0, 0.0], vector![0.0, 1.0]]);
        rasterize(&fb, &textured, Shader::Identity, &Uniforms::default(), &Varyings::default(), &tri);
        assert_eq!(fb.color_at(2, 2), Color::rgb(10, 20, 30));
    }

    #[test]
    fn perspective_uv_weights_by_w() {
        let uvs = [vector![0.0, 0.0], vector![1.0, 0.0], vector![0.0, 1.0]];
        let uv = perspective_uv(&uvs, vector![0.5, 0.5, 0.0], vector![1.0, 3.0, 1.0]);
        assert!((uv.x - 0.25).abs() < 1e-6);
        let uv = perspective_uv(&uvs, vector![0.5, 0.5, 0.0], vector![1.0, 1.0, 1.0]);
        assert!((uv.x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn shade_face_derives_flat_normal() {
        // Counter-clockwise in a y-up frame, seen from +z.
        let polygons = [Polygonal { positions: vec![0, 1, 2], normals: None, uvs: None }];
        let positions = vec![
            vector![1.0, 1.0, 0.0, 1.0],
            vector![8.0, 1.0, 0.0, 1.0],
            vector![1.0, 8.0, 0.0, 1.0],
        ];
        let model = Model::new(positions, Vec::new(), Vec::new(), &polygons).unwrap();
        // Flip y so the triangle lands on a y-down screen facing the camera.
        let uniforms = Uniforms {
            vpv_matrix: na::Matrix4::new_nonuniform_scaling(&vector![1.0, -1.0, 1.0])
                .append_translation(&vector![0.0, 9.0, 0.5]),
            ..Default::default()
        };
        let fb = Framebuffer::new(10, 10).unwrap();
        let written = shade_face(&fb, &model, Shader::Gouraud, &uniforms, &model.faces()[0]);
        assert!(written > 0);
        assert_eq!(fb.color_at(2, 7), Color::WHITE);
    }

    #[test]
    fn procedural_rows() {
        let fb = Framebuffer::new(40, 40).unwrap();
        let uniforms = Uniforms { width: 40, height: 40, ..Default::default() };
        shade_rows(&fb, Shader::Circle, &uniforms, 0..40);
        assert_ne!(fb.color_at(20, 20), Color::TRANSPARENT);
        assert_eq!(fb.color_at(0, 0), Color::TRANSPARENT);
        let fb = Framebuffer::new(40, 40).unwrap();
        shade_rows(&fb, Shader::Rings, &uniforms, 10..20);
        assert_eq!(fb.color_at(5, 5), Color::TRANSPARENT);
        assert_ne!(fb.color_at(5, 15), Color::TRANSPARENT);
    }
}
