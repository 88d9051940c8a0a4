use nalgebra as na;
use na::{vector, Vector2, Vector3, Vector4};

/// Transformation of a point to homogenous coordinates.
pub fn to_hom_point(v: Vector3<f32>) -> Vector4<f32> {
    return vector![v.x, v.y, v.z, 1.0];
}

/// Transformation of a vector to homogenous coordinates.
pub fn to_hom_vector(v: Vector3<f32>) -> Vector4<f32> {
    return vector![v.x, v.y, v.z, 0.0];
}

/// Transformation of a point from homogenous coordinates.
pub fn from_hom_point(v: Vector4<f32>) -> Vector3<f32> {
    return vector![v.x / v.w, v.y / v.w, v.z / v.w];
}

/// Twice the signed area of the 2D triangle abc.
/// Positive when a -> b -> c turns counter-clockwise in a y-up frame.
pub fn signed_area(a: Vector2<f32>, b: Vector2<f32>, c: Vector2<f32>) -> f32 {
    return (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y);
}

/// Barycentric coordinates of p with respect to the 2D triangle abc.
/// Degenerate triangles give a vector with a negative coordinate, so that every
/// point is reported as being outside.
pub fn barycentric(a: Vector2<f32>, b: Vector2<f32>, c: Vector2<f32>, p: Vector2<f32>) -> Vector3<f32> {
    let raw_cross = vector![b.x - a.x, c.x - a.x, a.x - p.x]
        .cross(&vector![b.y - a.y, c.y - a.y, a.y - p.y]);
    if raw_cross.z.abs() < 1e-2 {
        return vector![-1.0, 1.0, 1.0];
    }
    return vector![
        1.0 - (raw_cross.x + raw_cross.y) / raw_cross.z,
        raw_cross.x / raw_cross.z,
        raw_cross.y / raw_cross.z
    ];
}

/// Integer pixel rectangle, min inclusive, max exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min: Vector2<i32>,
    pub max: Vector2<i32>,
}

impl BoundingBox {
    /// Bounding box of a triangle, max edges expanded by one unit and clamped to
    /// [0, width) x [0, height).
    pub fn of_triangle(points: [Vector2<f32>; 3], width: u32, height: u32) -> Self {
        let min_x = points[0].x.min(points[1].x).min(points[2].x);
        let min_y = points[0].y.min(points[1].y).min(points[2].y);
        let max_x = points[0].x.max(points[1].x).max(points[2].x);
        let max_y = points[0].y.max(points[1].y).max(points[2].y);
        // Float to int casts saturate, which also takes care of huge values.
        return BoundingBox {
            min: vector![
                (min_x.floor() as i32).clamp(0, width as i32),
                (min_y.floor() as i32).clamp(0, height as i32)
            ],
            max: vector![
                (max_x.floor() as i32 + 1).clamp(0, width as i32),
                (max_y.floor() as i32 + 1).clamp(0, height as i32)
            ],
        };
    }

    pub fn is_empty(&self) -> bool {
        return self.min.x >= self.max.x || self.min.y >= self.max.y;
    }
}

/// 0.0 if x < edge, 1.0 otherwise.
pub fn step(edge: f32, x: f32) -> f32 {
    return if x < edge { 0.0 } else { 1.0 };
}

/// Hermite interpolation between 0.0 and 1.0 for x in [edge_0, edge_1].
pub fn smoothstep(edge_0: f32, edge_1: f32, x: f32) -> f32 {
    if edge_0 == edge_1 {
        return step(edge_0, x);
    }
    let t = ((x - edge_0) / (edge_1 - edge_0)).clamp(0.0, 1.0);
    return t * t * (3.0 - 2.0 * t);
}
