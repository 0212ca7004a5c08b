pub mod device;
pub mod pass_plan;
pub mod bloom_effect;
pub mod sprite_pipeline;
pub mod wgpu_device;
