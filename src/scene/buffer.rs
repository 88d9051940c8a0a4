use std::sync::{Arc, Mutex, MutexGuard};

use image::RgbaImage;
use log::debug;
use nalgebra::Vector2;

use super::color::Color;
use crate::error::RenderError;

/// Pixel layers of one framebuffer, row-major with (0, 0) in the top left corner.
pub struct Layers {
    pub color: Vec<Color>,   // Shaded fragments.
    pub depth: Vec<Color>,   // Grayscale picture of the accepted depth values.
    pub z_buffer: Vec<f32>,  // Depth test values, larger is nearer.
    pub normals: Vec<Color>, // Debug overlay with per-face normals.
}

impl Layers {
    fn new(n_pixels: usize) -> Self {
        return Self {
            color: vec![Color::TRANSPARENT; n_pixels],
            depth: vec![Color::TRANSPARENT; n_pixels],
            z_buffer: vec![f32::NEG_INFINITY; n_pixels],
            normals: vec![Color::TRANSPARENT; n_pixels],
        };
    }

    fn clear(&mut self) {
        self.color.fill(Color::TRANSPARENT);
        self.depth.fill(Color::TRANSPARENT);
        self.z_buffer.fill(f32::NEG_INFINITY);
        self.normals.fill(Color::TRANSPARENT);
    }
}

/// Framebuffer, shared by all the workers of a shading pass.
/// The layers sit behind a single lock, which also serves as the depth buffer lock.
pub struct Framebuffer {
    width: u32,
    height: u32,
    layers: Mutex<Layers>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyFramebuffer(width, height));
        }
        let n_pixels = width as usize * height as usize;
        return Ok(Self {
            width,
            height,
            layers: Mutex::new(Layers::new(n_pixels)),
        });
    }

    pub fn width(&self) -> u32 {
        return self.width;
    }

    pub fn height(&self) -> u32 {
        return self.height;
    }

    /// Exclusive access to all the layers.
    /// A poisoned lock is taken over, a panicking worker fails the frame elsewhere.
    pub fn layers(&self) -> MutexGuard<'_, Layers> {
        return self.layers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    }

    fn index(&self, x: u32, y: u32) -> usize {
        return x as usize + y as usize * self.width as usize;
    }

    /// Sets color, depth and normal layers to transparent and z-buffer to -inf.
    pub fn clear(&self) {
        self.layers().clear();
    }

    /// Early depth test, true if z would currently win at (x, y).
    pub fn depth_test(&self, x: u32, y: u32, z: f32) -> bool {
        let index = self.index(x, y);
        return z > self.layers().z_buffer[index];
    }

    /// Depth test and write of a fragment as one step.
    /// Ties go to the fragment already stored. Returns true if the fragment was written.
    pub fn commit(&self, x: u32, y: u32, z: f32, color: Color) -> bool {
        let index = self.index(x, y);
        let mut layers = self.layers();
        if z <= layers.z_buffer[index] {
            return false;
        }
        layers.z_buffer[index] = z;
        layers.depth[index] = Color::gray(z);
        layers.color[index] = color;
        return true;
    }

    /// Writes a whole row of the color layer, bypassing the depth test.
    /// Used by shaders that are evaluated per pixel without geometry.
    pub fn put_row(&self, y: u32, row: &[Option<Color>]) {
        let start = self.index(0, y);
        let mut layers = self.layers();
        for (dst, src) in layers.color[start..start + self.width as usize].iter_mut().zip(row) {
            if let Some(color) = src {
                *dst = *color;
            }
        }
    }

    #[cfg(test)]
    pub fn color_at(&self, x: u32, y: u32) -> Color {
        let index = self.index(x, y);
        return self.layers().color[index];
    }

    #[cfg(test)]
    pub fn depth_at(&self, x: u32, y: u32) -> f32 {
        let index = self.index(x, y);
        return self.layers().z_buffer[index];
    }

    /// Draws a line between a and b into the normal overlay layer
    /// via Bresenham's algorithm as presented in https://en.wikipedia.org/wiki/Bresenham%27s_line_algorithm
    /// Pixels outside of the framebuffer are skipped.
    pub fn draw_normal_line(&self, a: Vector2<i32>, b: Vector2<i32>, color: Color) {
        let (mut x_0, mut y_0) = (a.x, a.y);
        let (x_1, y_1) = (b.x, b.y);
        let dx: i32 = (x_1 - x_0).abs();
        let sx: i32 = if x_0 < x_1 { 1 } else { -1 };
        let dy: i32 = -(y_1 - y_0).abs();
        let sy: i32 = if y_0 < y_1 { 1 } else { -1 };
        let mut error: i32 = dx + dy;

        let mut layers = self.layers();
        loop {
            if x_0 >= 0 && y_0 >= 0 && (x_0 as u32) < self.width && (y_0 as u32) < self.height {
                let index = self.index(x_0 as u32, y_0 as u32);
                layers.normals[index] = color;
            }
            if x_0 == x_1 && y_0 == y_1 {
                break;
            }
            let e2 = 2 * error;
            if e2 >= dy {
                error += dy;
                x_0 += sx;
            }
            if e2 <= dx {
                error += dx;
                y_0 += sy;
            }
        }
    }
}

struct SwapChain {
    idx: usize,
    fb: [Arc<Framebuffer>; 2],
}

/// Pair of framebuffers. The front one (idx) is only ever read for display, the
/// back one (idx ^ 1) is the only one that gets reset and rasterized into.
/// Swap and draw share one lock, so a draw never sees a half swapped state.
pub struct Framebufctl {
    chain: Mutex<SwapChain>,
}

impl Framebufctl {
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        let fb = [Arc::new(Framebuffer::new(width, height)?), Arc::new(Framebuffer::new(width, height)?)];
        return Ok(Self {
            chain: Mutex::new(SwapChain { idx: 0, fb }),
        });
    }

    fn chain(&self) -> MutexGuard<'_, SwapChain> {
        return self.chain.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    }

    /// Buffer to render into.
    pub fn back(&self) -> Arc<Framebuffer> {
        let chain = self.chain();
        return chain.fb[chain.idx ^ 1].clone();
    }

    /// Buffer currently on display.
    #[cfg(test)]
    pub fn front(&self) -> Arc<Framebuffer> {
        let chain = self.chain();
        return chain.fb[chain.idx].clone();
    }

    pub fn size(&self) -> (u32, u32) {
        let chain = self.chain();
        return (chain.fb[0].width(), chain.fb[0].height());
    }

    /// Clears the back buffer. Resetting the front buffer is not allowed.
    pub fn reset(&self) {
        self.back().clear();
    }

    pub fn swap(&self) {
        self.chain().idx ^= 1;
    }

    /// Composites the front buffer onto dst: the color layer, or the depth layer
    /// if show_z is set, then the normal overlay if show_normals is set.
    /// Only the overlapping rectangle is touched when the sizes differ.
    pub fn draw(&self, dst: &mut RgbaImage, show_z: bool, show_normals: bool) {
        let chain = self.chain();
        let fb = &chain.fb[chain.idx];
        let layers = fb.layers();
        let width = fb.width().min(dst.width());
        let height = fb.height().min(dst.height());
        let src = if show_z { &layers.depth } else { &layers.color };
        for y in 0..height {
            for x in 0..width {
                let index = fb.index(x, y);
                let pixel = dst.get_pixel_mut(x, y);
                let mut out = src[index].over(Color::from(*pixel));
                if show_normals {
                    out = layers.normals[index].over(out);
                }
                *pixel = out.into();
            }
        }
    }

    /// Reallocates both framebuffers with the new size, dropping their contents.
    pub fn resize(&self, width: u32, height: u32) -> Result<(), RenderError> {
        let fb = [Arc::new(Framebuffer::new(width, height)?), Arc::new(Framebuffer::new(width, height)?)];
        self.chain().fb = fb;
        debug!("Framebuffers reallocated to {}x{}", width, height);
        return Ok(());
    }
}
