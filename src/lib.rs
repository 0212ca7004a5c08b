pub mod gpu;
pub mod config;
pub mod error;
pub mod software;
pub mod demo_scene;

pub mod cli;

pub use config::BloomSettings;
pub use error::{BloomError, Result};
pub use gpu::bloom_effect::{BloomEffect, CaptureState};
pub use gpu::device::{BlendMode, Color, GraphicsDevice, Rect, SpriteDraw, TargetId};
pub use gpu::pass_plan::{BloomParams, PassDescriptor, Placement, Surface};
pub use gpu::wgpu_device::WgpuGraphics;
pub use software::SoftwareGraphics;
