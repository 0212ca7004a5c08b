//! Textured-quad pipelines for the wgpu backend.
//!
//! One shader, two pipelines (alpha and additive). Each sprite is six vertices
//! carrying clip-space position, uv and tint, so a batch of sprites with
//! different sources is one render pass with one draw per sprite.

use bytemuck::{Pod, Zeroable};

use crate::gpu::device::{BlendMode, Color, Rect};

/// Vertices emitted per sprite (two triangles).
pub const VERTICES_PER_SPRITE: usize = 6;

/// Vertex for a sprite quad.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

impl SpriteVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2, 2 => Float32x4];

    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SpriteVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Quad covering `dest` (pixels, origin top-left) of a `target_w` x `target_h` target.
pub fn sprite_vertices(dest: Rect, tint: Color, target_w: u32, target_h: u32) -> [SpriteVertex; 6] {
    let to_ndc = |x: f32, y: f32| {
        [
            x / target_w as f32 * 2.0 - 1.0,
            1.0 - y / target_h as f32 * 2.0,
        ]
    };
    let left = dest.x;
    let right = dest.x + dest.width;
    let top = dest.y;
    let bottom = dest.y + dest.height;
    let color = tint.to_array();

    let tl = SpriteVertex { position: to_ndc(left, top), uv: [0.0, 0.0], color };
    let tr = SpriteVertex { position: to_ndc(right, top), uv: [1.0, 0.0], color };
    let bl = SpriteVertex { position: to_ndc(left, bottom), uv: [0.0, 1.0], color };
    let br = SpriteVertex { position: to_ndc(right, bottom), uv: [1.0, 1.0], color };

    [bl, br, tr, bl, tr, tl]
}

/// Blend state matching [`BlendMode`] semantics.
pub fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    match mode {
        BlendMode::Alpha => wgpu::BlendState::ALPHA_BLENDING,
        BlendMode::Additive => wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::Zero,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        },
    }
}

/// Shared GPU state for sprite drawing.
pub struct SpritePipeline {
    alpha_pipeline: wgpu::RenderPipeline,
    additive_pipeline: wgpu::RenderPipeline,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

impl SpritePipeline {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Sprite Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sprite Texture Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Sprite Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader_sprite.wgsl").into()),
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Sprite Pipeline Layout"),
            bind_group_layouts: &[&texture_layout],
            push_constant_ranges: &[],
        });

        let alpha_pipeline = Self::create_pipeline(
            device,
            format,
            &layout,
            &shader,
            BlendMode::Alpha,
            "Sprite Alpha Pipeline",
        );
        let additive_pipeline = Self::create_pipeline(
            device,
            format,
            &layout,
            &shader,
            BlendMode::Additive,
            "Sprite Additive Pipeline",
        );

        Self {
            alpha_pipeline,
            additive_pipeline,
            texture_layout,
            sampler,
        }
    }

    fn create_pipeline(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        layout: &wgpu::PipelineLayout,
        shader: &wgpu::ShaderModule,
        blend: BlendMode,
        label: &str,
    ) -> wgpu::RenderPipeline {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                buffers: &[SpriteVertex::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(blend_state(blend)),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }

    pub fn pipeline(&self, blend: BlendMode) -> &wgpu::RenderPipeline {
        match blend {
            BlendMode::Alpha => &self.alpha_pipeline,
            BlendMode::Additive => &self.additive_pipeline,
        }
    }

    /// Bind group sampling `view` with the shared linear-clamp sampler.
    pub fn texture_bind_group(
        &self,
        device: &wgpu::Device,
        view: &wgpu::TextureView,
        label: &str,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }
}

/// Growable vertex buffer reused across draws.
pub struct WgpuSpriteBatch {
    pub(crate) vertex_buffer: wgpu::Buffer,
    /// Capacity in sprites.
    pub(crate) capacity: usize,
}

impl WgpuSpriteBatch {
    pub(crate) fn new(device: &wgpu::Device, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sprite Vertex Buffer"),
            size: (capacity * VERTICES_PER_SPRITE * std::mem::size_of::<SpriteVertex>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self { vertex_buffer, capacity }
    }

    /// Grow so at least `sprites` quads fit.
    pub(crate) fn reserve(&mut self, device: &wgpu::Device, sprites: usize) {
        if sprites > self.capacity {
            self.vertex_buffer.destroy();
            *self = Self::new(device, sprites.next_power_of_two());
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sprite_vertex_size() {
        assert_eq!(std::mem::size_of::<SpriteVertex>(), 32);
    }

    #[test]
    fn test_full_target_quad_covers_ndc() {
        let verts = sprite_vertices(Rect::from_size(64, 32), Color::WHITE, 64, 32);
        let xs: Vec<f32> = verts.iter().map(|v| v.position[0]).collect();
        let ys: Vec<f32> = verts.iter().map(|v| v.position[1]).collect();
        assert_eq!(xs.iter().cloned().fold(f32::MAX, f32::min), -1.0);
        assert_eq!(xs.iter().cloned().fold(f32::MIN, f32::max), 1.0);
        assert_eq!(ys.iter().cloned().fold(f32::MAX, f32::min), -1.0);
        assert_eq!(ys.iter().cloned().fold(f32::MIN, f32::max), 1.0);

        // Top-left corner samples uv (0, 0).
        let tl = verts[5];
        assert_eq!(tl.position, [-1.0, 1.0]);
        assert_eq!(tl.uv, [0.0, 0.0]);
    }

    #[test]
    fn test_offset_quad_and_tint() {
        let tint = Color::WHITE.with_alpha(0.2);
        let verts = sprite_vertices(Rect::new(2.0, 0.0, 4.0, 4.0), tint, 4, 4);
        assert_eq!(verts[0].position, [0.0, -1.0]);
        assert!(verts.iter().all(|v| v.color == [1.0, 1.0, 1.0, 0.2]));
    }

    #[test]
    fn test_additive_blend_keeps_destination_alpha() {
        let state = blend_state(BlendMode::Additive);
        assert_eq!(state.color.dst_factor, wgpu::BlendFactor::One);
        assert_eq!(state.alpha.src_factor, wgpu::BlendFactor::Zero);
        assert_eq!(blend_state(BlendMode::Alpha), wgpu::BlendState::ALPHA_BLENDING);
    }
}
