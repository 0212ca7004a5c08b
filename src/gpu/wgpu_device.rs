//! wgpu implementation of [`GraphicsDevice`].
//!
//! Render targets are `Rgba8Unorm` textures. Every device call records and
//! submits its own command buffer, which keeps the immediate-mode ordering of
//! the sprite API without a deferred command list.

use std::collections::HashMap;

use crate::error::{BloomError, Result};
use crate::gpu::device::{rgba8_len, BlendMode, Color, GraphicsDevice, SpriteDraw, TargetId};
use crate::gpu::sprite_pipeline::{
    sprite_vertices, SpritePipeline, WgpuSpriteBatch, VERTICES_PER_SPRITE,
};

/// Format of every render target and of the default output.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Sprites the batch vertex buffer holds before it has to grow.
const INITIAL_BATCH_CAPACITY: usize = 16;

struct GpuTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

/// GPU device with an owned default output texture.
pub struct WgpuGraphics {
    device: wgpu::Device,
    queue: wgpu::Queue,
    sprites: SpritePipeline,
    targets: HashMap<TargetId, GpuTarget>,
    output: GpuTarget,
    current: Option<TargetId>,
    next_id: u32,
}

impl WgpuGraphics {
    /// Request an adapter without a surface and build a device around it.
    pub async fn new_headless(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(BloomError::AdapterNotFound)?;

        let info = adapter.get_info();
        log::info!("Using adapter: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await?;

        Self::from_device(device, queue, width, height)
    }

    /// Wrap an existing device. The default output is an owned `width` x `height` texture.
    pub fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let sprites = SpritePipeline::new(&device, TARGET_FORMAT);
        let output = Self::allocate(&device, &sprites, width, height, "Bloom Output")?;
        Ok(Self {
            device,
            queue,
            sprites,
            targets: HashMap::new(),
            output,
            current: None,
            next_id: 1,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// View of the default output, for presenting or further processing.
    pub fn output_view(&self) -> &wgpu::TextureView {
        &self.output.view
    }

    /// Replace the default output with a new `width` x `height` texture.
    pub fn set_output_size(&mut self, width: u32, height: u32) -> Result<()> {
        if (width, height) == (self.output.width, self.output.height) {
            return Ok(());
        }
        let output = Self::allocate(&self.device, &self.sprites, width, height, "Bloom Output")?;
        self.output.texture.destroy();
        self.output = output;
        Ok(())
    }

    fn allocate(
        device: &wgpu::Device,
        sprites: &SpritePipeline,
        width: u32,
        height: u32,
        label: &str,
    ) -> Result<GpuTarget> {
        let max = device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(BloomError::Device(format!(
                "cannot allocate {} of {}x{} (limit {})",
                label, width, height, max
            )));
        }

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            texture.destroy();
            return Err(BloomError::Device(err.to_string()));
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = sprites.texture_bind_group(device, &view, label);
        Ok(GpuTarget {
            texture,
            view,
            bind_group,
            width,
            height,
        })
    }

    fn current_target(&self) -> Result<&GpuTarget> {
        match self.current {
            None => Ok(&self.output),
            Some(id) => self.targets.get(&id).ok_or(BloomError::UnknownTarget(id)),
        }
    }

    /// Read the default output back as tightly packed RGBA8.
    pub fn read_output(&self) -> Result<Vec<u8>> {
        self.read_texture(&self.output)
    }

    /// Read a render target back as tightly packed RGBA8.
    pub fn read_render_target(&self, id: TargetId) -> Result<Vec<u8>> {
        let target = self.targets.get(&id).ok_or(BloomError::UnknownTarget(id))?;
        self.read_texture(target)
    }

    fn read_texture(&self, target: &GpuTarget) -> Result<Vec<u8>> {
        let (width, height) = (target.width, target.height);

        // Rows must be aligned to COPY_BYTES_PER_ROW_ALIGNMENT
        let unpadded_bytes_per_row = 4 * width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Bloom Readback Buffer"),
            size: padded_bytes_per_row as wgpu::BufferAddress * height as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Bloom Readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| BloomError::Readback(e.to_string()))??;

        let data = slice.get_mapped_range();
        let row_len = unpadded_bytes_per_row as usize;
        let mut pixels = Vec::with_capacity(row_len * height as usize);
        for row in 0..height as usize {
            let start = row * padded_bytes_per_row as usize;
            pixels.extend_from_slice(&data[start..start + row_len]);
        }
        drop(data);
        buffer.unmap();

        Ok(pixels)
    }
}

impl GraphicsDevice for WgpuGraphics {
    type SpriteBatch = WgpuSpriteBatch;

    fn create_render_target(&mut self, width: u32, height: u32, label: &str) -> Result<TargetId> {
        let target = Self::allocate(&self.device, &self.sprites, width, height, label)?;
        let id = TargetId(self.next_id);
        self.next_id += 1;
        self.targets.insert(id, target);
        Ok(id)
    }

    fn destroy_render_target(&mut self, id: TargetId) {
        match self.targets.remove(&id) {
            Some(target) => {
                target.texture.destroy();
                if self.current == Some(id) {
                    self.current = None;
                }
            }
            None => log::warn!("Ignoring release of unknown render target {:?}", id),
        }
    }

    fn render_target_size(&self, id: TargetId) -> Option<(u32, u32)> {
        self.targets.get(&id).map(|t| (t.width, t.height))
    }

    fn set_render_target(&mut self, target: Option<TargetId>) {
        self.current = target;
    }

    fn clear(&mut self, color: Color) -> Result<()> {
        let target = self.current_target()?;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Bloom Clear") });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Bloom Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color.to_wgpu()),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn create_sprite_batch(&mut self) -> Result<WgpuSpriteBatch> {
        Ok(WgpuSpriteBatch::new(&self.device, INITIAL_BATCH_CAPACITY))
    }

    fn destroy_sprite_batch(&mut self, batch: WgpuSpriteBatch) {
        batch.vertex_buffer.destroy();
    }

    fn draw_sprites(
        &mut self,
        batch: &mut WgpuSpriteBatch,
        blend: BlendMode,
        sprites: &[SpriteDraw],
    ) -> Result<()> {
        if sprites.is_empty() {
            return Ok(());
        }
        if let Some(current) = self.current {
            if sprites.iter().any(|s| s.source == current) {
                return Err(BloomError::Device(format!(
                    "render target {:?} cannot be sampled while bound for drawing",
                    current
                )));
            }
        }

        let target = self.current_target()?;
        let mut vertices = Vec::with_capacity(sprites.len() * VERTICES_PER_SPRITE);
        let mut bind_groups = Vec::with_capacity(sprites.len());
        for sprite in sprites {
            let source = self
                .targets
                .get(&sprite.source)
                .ok_or(BloomError::UnknownTarget(sprite.source))?;
            bind_groups.push(&source.bind_group);
            vertices.extend_from_slice(&sprite_vertices(
                sprite.dest,
                sprite.tint,
                target.width,
                target.height,
            ));
        }

        batch.reserve(&self.device, sprites.len());
        self.queue
            .write_buffer(&batch.vertex_buffer, 0, bytemuck::cast_slice(&vertices));

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Sprite Batch"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Sprite Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(self.sprites.pipeline(blend));
            pass.set_vertex_buffer(0, batch.vertex_buffer.slice(..));
            for (i, bind_group) in bind_groups.iter().enumerate() {
                let first = (i * VERTICES_PER_SPRITE) as u32;
                pass.set_bind_group(0, *bind_group, &[]);
                pass.draw(first..first + VERTICES_PER_SPRITE as u32, 0..1);
            }
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn upload_render_target(&mut self, id: TargetId, rgba: &[u8]) -> Result<()> {
        let target = self.targets.get(&id).ok_or(BloomError::UnknownTarget(id))?;
        let expected = rgba8_len(target.width, target.height);
        if rgba.len() != expected {
            return Err(BloomError::Device(format!(
                "upload size mismatch: expected {} bytes, got {}",
                expected,
                rgba.len()
            )));
        }

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * target.width),
                rows_per_image: Some(target.height),
            },
            wgpu::Extent3d {
                width: target.width,
                height: target.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn output_size(&self) -> (u32, u32) {
        (self.output.width, self.output.height)
    }
}
