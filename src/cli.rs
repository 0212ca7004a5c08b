use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crate::config::BloomSettings;
use crate::demo_scene::{DemoScene, SceneKind};
use crate::gpu::bloom_effect::BloomEffect;
use crate::gpu::device::GraphicsDevice;
use crate::gpu::pass_plan::BloomParams;
use crate::gpu::wgpu_device::WgpuGraphics;
use crate::software::SoftwareGraphics;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// wgpu on the first available adapter
    Gpu,
    /// CPU rasterizer
    Software,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one bloomed frame of a test scene to a PNG
    Render {
        /// Output PNG path
        #[arg(long)]
        out: PathBuf,

        /// JSON bloom settings file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Frame width
        #[arg(long, default_value_t = 256)]
        width: u32,

        /// Frame height
        #[arg(long, default_value_t = 256)]
        height: u32,

        /// Bloom intensity (overrides the settings file)
        #[arg(long)]
        intensity: Option<f32>,

        /// Blur tap spacing (overrides the settings file)
        #[arg(long)]
        blur_strength: Option<f32>,

        /// Blur pass count (overrides the settings file)
        #[arg(long)]
        blur_passes: Option<u32>,

        #[arg(long, value_enum, default_value_t = Backend::Gpu)]
        backend: Backend,

        #[arg(long, value_enum, default_value_t = SceneKind::Square)]
        scene: SceneKind,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            out,
            config,
            width,
            height,
            intensity,
            blur_strength,
            blur_passes,
            backend,
            scene,
        } => {
            let mut settings = match config {
                Some(path) => BloomSettings::load(&path)
                    .with_context(|| format!("Failed to load settings from {}", path.display()))?,
                None => BloomSettings::default(),
            };
            if let Some(v) = intensity {
                settings.intensity = v;
            }
            if let Some(v) = blur_strength {
                settings.blur_strength = v;
            }
            if let Some(v) = blur_passes {
                settings.blur_passes = v;
            }
            let params = settings.validate()?;

            log::info!(
                "Rendering {:?} scene at {}x{} on {:?} backend with {:?}",
                scene,
                width,
                height,
                backend,
                params
            );

            let pixels = match backend {
                Backend::Gpu => {
                    let mut device = pollster::block_on(WgpuGraphics::new_headless(width, height))?;
                    render_frame(&mut device, params, scene, width, height)?;
                    device.read_output()?
                }
                Backend::Software => {
                    let mut device = SoftwareGraphics::new(width, height);
                    render_frame(&mut device, params, scene, width, height)?;
                    device.output().to_rgba8()
                }
            };

            save_png(&out, &pixels, width, height)?;
            println!("Wrote {}", out.display());
        }
    }
    Ok(())
}

/// Capture the scene through the bloom effect onto the device's default output.
pub fn render_frame<D: GraphicsDevice>(
    device: &mut D,
    params: BloomParams,
    kind: SceneKind,
    width: u32,
    height: u32,
) -> crate::error::Result<()> {
    let mut effect = BloomEffect::new(device, width, height, params)?;
    let scene = match DemoScene::new(device, kind, width, height) {
        Ok(scene) => scene,
        Err(e) => {
            effect.dispose(device);
            return Err(e);
        }
    };
    let mut batch = match device.create_sprite_batch() {
        Ok(batch) => batch,
        Err(e) => {
            scene.release(device);
            effect.dispose(device);
            return Err(e);
        }
    };

    let result = capture(device, &mut effect, &scene, &mut batch, width, height);

    device.destroy_sprite_batch(batch);
    scene.release(device);
    effect.dispose(device);
    result
}

fn capture<D: GraphicsDevice>(
    device: &mut D,
    effect: &mut BloomEffect<D>,
    scene: &DemoScene,
    batch: &mut D::SpriteBatch,
    width: u32,
    height: u32,
) -> crate::error::Result<()> {
    effect.begin_capture(device, width, height)?;
    scene.draw(device, batch)?;
    effect.end_capture(device)
}

fn save_png(path: &Path, pixels: &[u8], width: u32, height: u32) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    image::save_buffer(path, pixels, width, height, image::ColorType::Rgba8)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
