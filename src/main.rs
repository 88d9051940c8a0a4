mod app;
mod error;
mod scene;

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::thread;

use clap::Parser;
use log::info;
use nalgebra::Vector3;

use scene::{RenderContext, Shader};

/// Software rasterizer, shading a rotating OBJ mesh on a pool of workers.
#[derive(Parser, Debug)]
#[command(name = "tiny_rasterizer", version, about, long_about = None)]
struct Cli {
    /// Number of shading workers, defaults to the available parallelism
    #[arg(short, long)]
    workers: Option<usize>,

    /// OBJ mesh to render, not needed for procedural shaders
    #[arg(short, long)]
    mesh: Option<PathBuf>,

    /// Texture applied through the mesh UVs
    #[arg(short, long)]
    texture: Option<PathBuf>,

    /// Shader to use, one of: identity, gouraud, toon, circle, box, rings
    #[arg(short, long, default_value = "gouraud")]
    shader: String,

    /// Initial rotation around the vertical axis, degrees
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    angle: f32,

    /// Rotation speed, degrees per second
    #[arg(long, default_value_t = 30.0, allow_negative_numbers = true)]
    speed: f32,

    /// Distance of the camera to the origin
    #[arg(long, default_value_t = 3.0)]
    distance: f32,

    /// Uniform scale of the mesh
    #[arg(long, default_value_t = 1.0)]
    scale: f32,

    /// Scale and center the mesh to fit the unit cube
    #[arg(long)]
    fit: bool,

    /// Framebuffer width in pixels
    #[arg(long, default_value_t = 800)]
    width: u32,

    /// Framebuffer height in pixels
    #[arg(long, default_value_t = 800)]
    height: u32,

    /// Display refresh target, frames per second
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Show the depth layer instead of colors
    #[arg(long)]
    show_z: bool,

    /// Overlay per-face normals
    #[arg(long)]
    show_normals: bool,

    /// Log frame statistics every second
    #[arg(long)]
    stats: bool,
}

#[show_image::main]
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let cli = Cli::parse();
    let shader = Shader::from_name(&cli.shader)?;
    let workers = cli
        .workers
        .unwrap_or_else(|| thread::available_parallelism().map_or(1, NonZeroUsize::get));
    info!("Starting tiny_rasterizer with shader {}", shader);

    let params = app::Params {
        width: cli.width,
        height: cli.height,
        workers,
        mesh: cli.mesh,
        texture: cli.texture,
        fit: cli.fit,
        fps: cli.fps,
        show_z: cli.show_z,
        print_stats: cli.stats,
        context: RenderContext {
            shader,
            angle: cli.angle.to_radians(),
            speed: cli.speed.to_radians(),
            scale: cli.scale,
            camera_distance: cli.distance,
            light_direction: Vector3::new(0.0, 0.0, 1.0),
            show_normals: cli.show_normals,
        },
    };

    app::run(params)?;

    return Ok(());
}
