use std::path::PathBuf;
use std::sync::mpsc::{channel, sync_channel, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use image::{Rgba, RgbaImage};
use log::{debug, info};
use show_image::{create_window, event, ImageInfo, ImageView, WindowOptions};

use crate::error::RenderError;
use crate::scene::{Framebufctl, Model, RenderContext, Renderer, Scheduler};

const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Everything the viewer needs to start.
pub struct Params {
    pub width: u32,
    pub height: u32,
    pub workers: usize,
    pub mesh: Option<PathBuf>,
    pub texture: Option<PathBuf>,
    pub fit: bool,
    pub fps: u32,
    pub show_z: bool,
    pub print_stats: bool,
    pub context: RenderContext,
}

/// Helper, defining exit event to be an Escape key press.
fn is_exit_event(window_event: &event::WindowEvent) -> bool {
    if let event::WindowEvent::KeyboardInput(event) = window_event {
        if event.input.key_code == Some(event::VirtualKeyCode::Escape) && event.input.state.is_released() {
            return true;
        }
    }
    return false;
}

fn load_model(params: &Params) -> anyhow::Result<Option<Model>> {
    let path = match &params.mesh {
        Some(path) => path,
        None => return Ok(None),
    };
    let mut model = Model::load(path).with_context(|| format!("failed to load mesh {}", path.display()))?;
    if let Some(texture) = &params.texture {
        model
            .load_texture(texture)
            .with_context(|| format!("failed to load texture {}", texture.display()))?;
    }
    if params.fit {
        model.fit_unit_cube();
    }
    return Ok(Some(model));
}

/// Actually launches the window, showing frames of the render thread.
/// Returns once Escape is pressed or the render thread fails.
pub fn run(params: Params) -> anyhow::Result<()> {
    let model = load_model(&params)?;
    let shader = params.context.shader;
    if model.is_none() && !shader.is_procedural() {
        return Err(RenderError::MissingMesh(shader.name()).into());
    }

    let fbctl = Arc::new(Framebufctl::new(params.width, params.height)?);
    let scheduler = Scheduler::new(params.workers, model.map(Arc::new));
    info!(
        "Shading {}x{} frames with {} on {} workers",
        params.width,
        params.height,
        shader,
        scheduler.workers()
    );

    let (frame_tx, frame_rx) = sync_channel(1);
    let (resize_tx, resize_rx) = channel();
    let renderer = Renderer::new(params.context.clone(), fbctl.clone(), scheduler, frame_tx, resize_rx);
    let stats = renderer.stats();
    let render_thread = thread::Builder::new()
        .name("render".to_string())
        .spawn(move || renderer.run())
        .context("failed to spawn the render thread")?;

    let window_options = WindowOptions {
        size: Some([params.width, params.height]),
        ..Default::default()
    };
    let window = create_window("tiny_rasterizer", window_options)?;
    let event_channel = window.event_channel()?;

    let poll_interval = Duration::from_secs_f64(1.0 / params.fps.max(1) as f64);
    let mut image = RgbaImage::from_pixel(params.width, params.height, BACKGROUND);
    let mut frame_counter_time_begin = Instant::now();
    let mut frame_counter: u32 = 0;
    loop {
        // Whichever comes first: a new frame or the polling interval.
        match frame_rx.recv_timeout(poll_interval) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let (width, height) = fbctl.size();
        if image.dimensions() != (width, height) {
            image = RgbaImage::new(width, height);
        }
        image.pixels_mut().for_each(|pixel| *pixel = BACKGROUND);
        fbctl.draw(&mut image, params.show_z, params.context.show_normals);
        let image_data = ImageView::new(ImageInfo::rgba8(width, height), image.as_raw());
        window.set_image("image", image_data)?;

        let mut exit = false;
        for window_event in event_channel.try_iter() {
            if is_exit_event(&window_event) {
                exit = true;
            }
            if let event::WindowEvent::Resized(resized) = window_event {
                debug!("Window resized to {}x{}", resized.size.x, resized.size.y);
                if resized.size.x > 0 && resized.size.y > 0 {
                    // The render thread going away is reported by the frame channel.
                    let _ = resize_tx.send((resized.size.x, resized.size.y));
                }
            }
        }
        if exit {
            break;
        }

        if params.print_stats {
            // Counting frames to printout stats every second.
            frame_counter += 1;
            if frame_counter_time_begin.elapsed().as_secs_f32() > 1.0 {
                let s = *stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                info!(
                    "Display {} fps, shading min {:.2}ms avg {:.2}ms max {:.2}ms last {:.2}ms over {} frames",
                    frame_counter,
                    s.min as f64 * 1e-6,
                    s.avg as f64 * 1e-6,
                    s.max as f64 * 1e-6,
                    s.last as f64 * 1e-6,
                    s.n
                );
                frame_counter_time_begin = Instant::now();
                frame_counter = 0;
            }
        }
    }

    // The renderer stops at its next frame once nobody listens.
    drop(frame_rx);
    let result = render_thread
        .join()
        .map_err(|_| anyhow!("render thread panicked"))?;
    result.context("render thread failed")?;
    return Ok(());
}
