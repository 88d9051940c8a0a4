/// Struct, representing raw rgba8 pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color { r: 0,   g: 0,   b: 0,   a: 0   };
    pub const BLACK: Color =       Color { r: 0,   g: 0,   b: 0,   a: 255 };
    pub const WHITE: Color =       Color { r: 255, g: 255, b: 255, a: 255 };
    pub const RED: Color =         Color { r: 255, g: 0,   b: 0,   a: 255 };
    pub const GREEN: Color =       Color { r: 0,   g: 255, b: 0,   a: 255 };
    pub const BLUE: Color =        Color { r: 0,   g: 0,   b: 255, a: 255 };

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Color {
        return Color { r, g, b, a };
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Color {
        return Color { r, g, b, a: 255 };
    }

    /// Opaque gray level, v is clamped to [0.0, 1.0].
    pub fn gray(v: f32) -> Color {
        let level = (v.clamp(0.0, 1.0) * 255.0) as u8;
        return Color::rgb(level, level, level);
    }

    /// Get convex combination of two colors: t * c_1 + (1 - t) * c_2.
    /// t is clamped to [0.0, 1.0], alpha is blended the same way.
    pub fn blend(color_1: Color, color_2: Color, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        let mix = |c_1: u8, c_2: u8| (t * c_1 as f32 + (1.0 - t) * c_2 as f32).round() as u8;
        return Color {
            r: mix(color_1.r, color_2.r),
            g: mix(color_1.g, color_2.g),
            b: mix(color_1.b, color_2.b),
            a: mix(color_1.a, color_2.a),
        };
    }

    /// Scales rgb channels by k, leaving alpha as is. Saturates at 255.
    pub fn scale(self, k: f32) -> Color {
        let k = k.max(0.0);
        let mul = |c: u8| (c as f32 * k).min(255.0).round() as u8;
        return Color {
            r: mul(self.r),
            g: mul(self.g),
            b: mul(self.b),
            a: self.a,
        };
    }

    /// Channel-wise product, used to tint a color.
    pub fn modulate(self, tint: Color) -> Color {
        let mul = |c: u8, t: u8| ((c as u16 * t as u16 + 127) / 255) as u8;
        return Color {
            r: mul(self.r, tint.r),
            g: mul(self.g, tint.g),
            b: mul(self.b, tint.b),
            a: mul(self.a, tint.a),
        };
    }

    /// Source-over compositing of self onto dst (straight alpha).
    pub fn over(self, dst: Color) -> Color {
        return match self.a {
            255 => self,
            0 => dst,
            a => {
                let src_a = a as f32 / 255.0;
                let dst_a = dst.a as f32 / 255.0 * (1.0 - src_a);
                let out_a = src_a + dst_a;
                let mix = |s: u8, d: u8| {
                    ((s as f32 * src_a + d as f32 * dst_a) / out_a).round() as u8
                };
                Color {
                    r: mix(self.r, dst.r),
                    g: mix(self.g, dst.g),
                    b: mix(self.b, dst.b),
                    a: (out_a * 255.0).round() as u8,
                }
            }
        };
    }

    pub fn to_bytes(self) -> [u8; 4] {
        return [self.r, self.g, self.b, self.a];
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Color {
        return Color { r: bytes[0], g: bytes[1], b: bytes[2], a: bytes[3] };
    }
}

impl From<image::Rgba<u8>> for Color {
    fn from(pixel: image::Rgba<u8>) -> Self {
        return Color::from_bytes(pixel.0);
    }
}

impl From<Color> for image::Rgba<u8> {
    fn from(color: Color) -> Self {
        return image::Rgba(color.to_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_endpoints() {
        assert_eq!(Color::blend(Color::WHITE, Color::BLACK, 1.0), Color::WHITE);
        assert_eq!(Color::blend(Color::WHITE, Color::BLACK, 0.0), Color::BLACK);
        assert_eq!(Color::blend(Color::WHITE, Color::BLACK, 7.0), Color::WHITE);
    }

    #[test]
    fn scale_saturates_and_keeps_alpha() {
        let c = Color::rgba(200, 100, 0, 17).scale(2.0);
        assert_eq!(c, Color::rgba(255, 200, 0, 17));
        assert_eq!(Color::WHITE.scale(-1.0), Color::BLACK);
    }

    #[test]
    fn over_opaque_and_transparent() {
        assert_eq!(Color::RED.over(Color::BLUE), Color::RED);
        assert_eq!(Color::TRANSPARENT.over(Color::BLUE), Color::BLUE);
        let half = Color::rgba(255, 255, 255, 128).over(Color::BLACK);
        assert_eq!(half.a, 255);
        assert!(half.r > 120 && half.r < 135);
    }

    #[test]
    fn modulate_by_white_is_identity() {
        let c = Color::rgba(12, 200, 77, 255);
        assert_eq!(c.modulate(Color::WHITE), c);
        assert_eq!(c.modulate(Color::BLACK), Color::BLACK);
    }

    #[test]
    fn gray_levels() {
        assert_eq!(Color::gray(0.0), Color::BLACK);
        assert_eq!(Color::gray(1.0), Color::WHITE);
        assert_eq!(Color::gray(2.0), Color::WHITE);
    }
}
