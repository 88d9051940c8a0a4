use std::sync::mpsc::{Receiver, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::{debug, trace};
use nalgebra as na;
use na::{matrix, Matrix4, Rotation3, Vector3};

use super::buffer::Framebufctl;
use super::scheduler::Scheduler;
use super::shader::{Shader, Uniforms};
use crate::error::RenderError;

/// Depth given to fragments lying at the camera target. Nearer fragments get more.
const DEPTH_AT_TARGET: f32 = 0.5;

/// Everything that decides how a frame looks, besides the mesh itself.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub shader: Shader,
    pub angle: f32,                    // Initial rotation of the model around y, radians.
    pub speed: f32,                    // Rotation speed, radians per second.
    pub scale: f32,                    // Uniform model scale.
    pub camera_distance: f32,          // Camera sits on +z, looking at the origin.
    pub light_direction: Vector3<f32>, // Towards the light, in world space.
    pub show_normals: bool,
}

impl Default for RenderContext {
    fn default() -> Self {
        return Self {
            shader: Shader::Gouraud,
            angle: 0.0,
            speed: 0.0,
            scale: 1.0,
            camera_distance: 3.0,
            light_direction: Vector3::new(0.0, 0.0, 1.0),
            show_normals: false,
        };
    }
}

impl RenderContext {
    /// Uniforms of the frame rendered `time` nanoseconds after start into a
    /// width x height framebuffer.
    pub fn uniforms(&self, time: u64, width: u32, height: u32) -> Uniforms {
        let angle = self.angle + self.speed * (time as f64 * 1e-9) as f32;
        let rotation = Rotation3::from_axis_angle(&Vector3::y_axis(), angle).to_homogeneous();
        let model_matrix = rotation * Matrix4::new_scaling(self.scale);

        // New coordinate system around camera position.
        let look_from = Vector3::new(0.0, 0.0, self.camera_distance);
        let look_at = Vector3::zeros();
        let up = Vector3::new(0.0, 1.0, 0.0);
        let new_z = (look_from - look_at).normalize();
        let new_y = (up - new_z.dot(&up) * new_z).normalize();
        let new_x = new_y.cross(&new_z).normalize();
        let basis_matrix = matrix![new_x.x, new_x.y, new_x.z, 0.0;
                                   new_y.x, new_y.y, new_y.z, 0.0;
                                   new_z.x, new_z.y, new_z.z, 0.0;
                                   0.0,     0.0,     0.0,     1.0];
        let translation_matrix = matrix![1.0, 0.0, 0.0, -look_from.x;
                                         0.0, 1.0, 0.0, -look_from.y;
                                         0.0, 0.0, 1.0, -look_from.z;
                                         0.0, 0.0, 0.0, 1.0];
        let view_matrix = basis_matrix * translation_matrix;
        // w is the distance along the view axis in units of camera distance, the
        // depth that comes out after the division is DEPTH_AT_TARGET / w.
        let coef = -1.0 / self.camera_distance;
        let projection_matrix = matrix![1.0, 0.0, 0.0,  0.0;
                                        0.0, 1.0, 0.0,  0.0;
                                        0.0, 0.0, 0.0,  DEPTH_AT_TARGET;
                                        0.0, 0.0, coef, 0.0];
        // Screen rows go from top to bottom.
        let w = width as f32;
        let h = height as f32;
        let viewport_matrix = matrix![w / 2.0, 0.0,      0.0, w / 2.0;
                                      0.0,     -h / 2.0, 0.0, h / 2.0;
                                      0.0,     0.0,      1.0, 0.0;
                                      0.0,     0.0,      0.0, 1.0];

        return Uniforms {
            time,
            width,
            height,
            light_direction: self.light_direction.normalize(),
            model_matrix,
            normal_matrix: rotation,
            vpv_matrix: viewport_matrix * projection_matrix * view_matrix,
            show_normals: self.show_normals,
        };
    }
}

/// Running frame time statistics, in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub min: u64,
    pub avg: u64,
    pub max: u64,
    pub last: u64,
    pub n: u64,
    acc: u128,
}

impl Stats {
    pub fn update(&mut self, v: u64) {
        if self.n == 0 || v < self.min {
            self.min = v;
        }
        if v > self.max {
            self.max = v;
        }
        self.acc += v as u128;
        self.n += 1;
        self.avg = (self.acc / self.n as u128) as u64;
        self.last = v;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Resetting,
    Shading,
    Swapping,
}

/// Render loop: reset the back buffer, shade it, swap, tell the display.
pub struct Renderer {
    ctx: RenderContext,
    fbctl: Arc<Framebufctl>,
    scheduler: Scheduler,
    stats: Arc<Mutex<Stats>>,
    state: RenderState,
    frame_ready: SyncSender<()>,
    resize_requests: Receiver<(u32, u32)>,
    start: Instant,
}

impl Renderer {
    pub fn new(
        ctx: RenderContext,
        fbctl: Arc<Framebufctl>,
        scheduler: Scheduler,
        frame_ready: SyncSender<()>,
        resize_requests: Receiver<(u32, u32)>,
    ) -> Self {
        return Self {
            ctx,
            fbctl,
            scheduler,
            stats: Arc::new(Mutex::new(Stats::default())),
            state: RenderState::Idle,
            frame_ready,
            resize_requests,
            start: Instant::now(),
        };
    }

    /// Frame time statistics, shared with whoever wants to print them.
    pub fn stats(&self) -> Arc<Mutex<Stats>> {
        return self.stats.clone();
    }

    #[cfg(test)]
    pub fn state(&self) -> RenderState {
        return self.state;
    }

    fn enter(&mut self, state: RenderState) {
        trace!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Renders frames back to back until the display goes away.
    pub fn run(mut self) -> Result<(), RenderError> {
        while self.frame()? {}
        debug!("Display is gone, render loop stops");
        return Ok(());
    }

    /// Renders one frame. Returns false once nobody listens for frames anymore.
    pub fn frame(&mut self) -> Result<bool, RenderError> {
        self.apply_resize_requests()?;

        self.enter(RenderState::Resetting);
        self.fbctl.reset();

        self.enter(RenderState::Shading);
        let fb = self.fbctl.back();
        let time = self.start.elapsed().as_nanos() as u64;
        let uniforms = Arc::new(self.ctx.uniforms(time, fb.width(), fb.height()));
        let shading_start = Instant::now();
        let fragments = self.scheduler.shade(&fb, self.ctx.shader, &uniforms)?;
        let frame_time = shading_start.elapsed().as_nanos() as u64;
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .update(frame_time);
        trace!("Shaded {} fragments in {}ns", fragments, frame_time);

        self.enter(RenderState::Swapping);
        self.fbctl.swap();
        // A full channel means the display hasn't picked up the last frame yet,
        // it reads the newest front buffer anyway.
        let listening = match self.frame_ready.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Disconnected(())) => false,
        };

        self.enter(RenderState::Idle);
        return Ok(listening);
    }

    /// Only the latest pending size matters.
    fn apply_resize_requests(&mut self) -> Result<(), RenderError> {
        let mut latest = None;
        loop {
            match self.resize_requests.try_recv() {
                Ok(size) => latest = Some(size),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if let Some((width, height)) = latest {
            if (width, height) != self.fbctl.size() {
                self.fbctl.resize(width, height)?;
            }
        }
        return Ok(());
    }
}
