//! CPU implementation of [`GraphicsDevice`].
//!
//! A small deterministic rasterizer: targets are RGBA `f32` images clamped to
//! `[0, 1]`, sprites are sampled bilinearly with clamp-to-edge addressing and
//! blended with the same equations as the wgpu sprite pipelines. Every call is
//! counted and logged so tests can observe allocation behavior and ordering.

use std::collections::BTreeMap;

use crate::error::{BloomError, Result};
use crate::gpu::device::{BlendMode, Color, GraphicsDevice, Rect, SpriteDraw, TargetId};

/// RGBA image with `f32` channels.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<[f32; 4]>,
}

impl Image {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0.0; 4]; (width as usize) * (height as usize)],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }

    pub fn fill(&mut self, color: Color) {
        let c = clamp_color(color.to_array());
        self.pixels.iter_mut().for_each(|p| *p = c);
    }

    /// Pixels as tightly packed RGBA8.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|p| p.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
            .collect()
    }

    fn texel(&self, x: i64, y: i64) -> [f32; 4] {
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        self.pixel(x, y)
    }

    /// Bilinear sample at normalized coordinates, clamp-to-edge.
    fn sample(&self, u: f32, v: f32) -> [f32; 4] {
        let tx = u * self.width as f32 - 0.5;
        let ty = v * self.height as f32 - 0.5;
        let x0 = tx.floor();
        let y0 = ty.floor();
        let fx = tx - x0;
        let fy = ty - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let a = self.texel(x0, y0);
        let b = self.texel(x0 + 1, y0);
        let c = self.texel(x0, y0 + 1);
        let d = self.texel(x0 + 1, y0 + 1);

        let mut out = [0.0; 4];
        for i in 0..4 {
            let top = a[i] + (b[i] - a[i]) * fx;
            let bottom = c[i] + (d[i] - c[i]) * fx;
            out[i] = top + (bottom - top) * fy;
        }
        out
    }

    fn draw(&mut self, source: &Image, dest: Rect, tint: Color, blend: BlendMode) {
        if dest.width <= 0.0 || dest.height <= 0.0 || source.width == 0 || source.height == 0 {
            return;
        }

        // Pixel centers inside [x, x + width) x [y, y + height).
        let span = |start: f32, len: f32, limit: u32| {
            let first = (start - 0.5).ceil().max(0.0) as u32;
            let last = (start + len - 0.5).ceil().clamp(0.0, limit as f32) as u32;
            first..last.max(first)
        };
        let tint = tint.to_array();

        for py in span(dest.y, dest.height, self.height) {
            let v = (py as f32 + 0.5 - dest.y) / dest.height;
            for px in span(dest.x, dest.width, self.width) {
                let u = (px as f32 + 0.5 - dest.x) / dest.width;
                let texel = source.sample(u, v);
                let src = [
                    texel[0] * tint[0],
                    texel[1] * tint[1],
                    texel[2] * tint[2],
                    texel[3] * tint[3],
                ];
                let idx = py as usize * self.width as usize + px as usize;
                self.pixels[idx] = blend_pixel(src, self.pixels[idx], blend);
            }
        }
    }
}

fn clamp_color(c: [f32; 4]) -> [f32; 4] {
    c.map(|v| v.clamp(0.0, 1.0))
}

/// Blend equations shared with the GPU sprite pipelines.
///
/// `src` is clamped to `[0, 1]` first, as a unorm target clamps the fragment
/// output before the blend unit sees it. A tint alpha above 1 therefore
/// saturates instead of scaling the source.
pub fn blend_pixel(src: [f32; 4], dst: [f32; 4], blend: BlendMode) -> [f32; 4] {
    let src = clamp_color(src);
    let a = src[3];
    let out = match blend {
        BlendMode::Alpha => [
            src[0] * a + dst[0] * (1.0 - a),
            src[1] * a + dst[1] * (1.0 - a),
            src[2] * a + dst[2] * (1.0 - a),
            a + dst[3] * (1.0 - a),
        ],
        BlendMode::Additive => [
            dst[0] + src[0] * a,
            dst[1] + src[1] * a,
            dst[2] + src[2] * a,
            dst[3],
        ],
    };
    clamp_color(out)
}

/// Allocation counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub targets_created: u32,
    pub targets_destroyed: u32,
    /// Destroy calls for handles that were unknown or already released.
    pub ignored_destroys: u32,
    pub batches_created: u32,
    pub batches_destroyed: u32,
    pub draw_calls: u32,
}

/// One recorded device call.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceOp {
    CreateTarget { id: TargetId, width: u32, height: u32 },
    DestroyTarget(TargetId),
    SetTarget(Option<TargetId>),
    Clear { target: Option<TargetId>, color: Color },
    Draw { target: Option<TargetId>, blend: BlendMode, sprites: Vec<SpriteDraw> },
    Upload(TargetId),
}

#[derive(Debug)]
pub struct SoftwareSpriteBatch {
    draws: u64,
}

impl SoftwareSpriteBatch {
    pub fn draws(&self) -> u64 {
        self.draws
    }
}

/// CPU graphics device.
#[derive(Debug)]
pub struct SoftwareGraphics {
    targets: BTreeMap<TargetId, Image>,
    output: Image,
    current: Option<TargetId>,
    next_id: u32,
    stats: DeviceStats,
    ops: Vec<DeviceOp>,
    /// Remaining allocations before `create_render_target` fails.
    allocation_budget: Option<u32>,
}

impl SoftwareGraphics {
    /// Device whose default output is `width` x `height`, cleared to transparent black.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            targets: BTreeMap::new(),
            output: Image::new(width, height),
            current: None,
            next_id: 1,
            stats: DeviceStats::default(),
            ops: Vec::new(),
            allocation_budget: None,
        }
    }

    pub fn output(&self) -> &Image {
        &self.output
    }

    pub fn set_output_size(&mut self, width: u32, height: u32) {
        self.output = Image::new(width, height);
    }

    pub fn target_image(&self, id: TargetId) -> Option<&Image> {
        self.targets.get(&id)
    }

    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn current_target(&self) -> Option<TargetId> {
        self.current
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    pub fn ops(&self) -> &[DeviceOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<DeviceOp> {
        std::mem::take(&mut self.ops)
    }

    /// Make `create_render_target` fail after `remaining` more successful allocations.
    pub fn limit_allocations(&mut self, remaining: Option<u32>) {
        self.allocation_budget = remaining;
    }

    fn current_image_mut(&mut self) -> Result<&mut Image> {
        match self.current {
            None => Ok(&mut self.output),
            Some(id) => self.targets.get_mut(&id).ok_or(BloomError::UnknownTarget(id)),
        }
    }
}

impl GraphicsDevice for SoftwareGraphics {
    type SpriteBatch = SoftwareSpriteBatch;

    fn create_render_target(&mut self, width: u32, height: u32, label: &str) -> Result<TargetId> {
        if let Some(budget) = self.allocation_budget.as_mut() {
            if *budget == 0 {
                return Err(BloomError::Device(format!(
                    "out of memory allocating {} ({}x{})",
                    label, width, height
                )));
            }
            *budget -= 1;
        }
        if width == 0 || height == 0 {
            return Err(BloomError::Device(format!(
                "cannot allocate zero-sized target {} ({}x{})",
                label, width, height
            )));
        }

        let id = TargetId(self.next_id);
        self.next_id += 1;
        self.targets.insert(id, Image::new(width, height));
        self.stats.targets_created += 1;
        self.ops.push(DeviceOp::CreateTarget { id, width, height });
        Ok(id)
    }

    fn destroy_render_target(&mut self, id: TargetId) {
        if self.targets.remove(&id).is_none() {
            log::warn!("Ignoring release of unknown render target {:?}", id);
            self.stats.ignored_destroys += 1;
            return;
        }
        if self.current == Some(id) {
            self.current = None;
        }
        self.stats.targets_destroyed += 1;
        self.ops.push(DeviceOp::DestroyTarget(id));
    }

    fn render_target_size(&self, id: TargetId) -> Option<(u32, u32)> {
        self.targets.get(&id).map(|img| (img.width, img.height))
    }

    fn set_render_target(&mut self, target: Option<TargetId>) {
        self.current = target;
        self.ops.push(DeviceOp::SetTarget(target));
    }

    fn clear(&mut self, color: Color) -> Result<()> {
        let target = self.current;
        self.current_image_mut()?.fill(color);
        self.ops.push(DeviceOp::Clear { target, color });
        Ok(())
    }

    fn create_sprite_batch(&mut self) -> Result<SoftwareSpriteBatch> {
        self.stats.batches_created += 1;
        Ok(SoftwareSpriteBatch { draws: 0 })
    }

    fn destroy_sprite_batch(&mut self, _batch: SoftwareSpriteBatch) {
        self.stats.batches_destroyed += 1;
    }

    fn draw_sprites(
        &mut self,
        batch: &mut SoftwareSpriteBatch,
        blend: BlendMode,
        sprites: &[SpriteDraw],
    ) -> Result<()> {
        let target = self.current;
        for sprite in sprites {
            // Snapshot the source so a target may sample itself.
            let source = self
                .targets
                .get(&sprite.source)
                .cloned()
                .ok_or(BloomError::UnknownTarget(sprite.source))?;
            self.current_image_mut()?.draw(&source, sprite.dest, sprite.tint, blend);
        }
        batch.draws += sprites.len() as u64;
        self.stats.draw_calls += 1;
        self.ops.push(DeviceOp::Draw { target, blend, sprites: sprites.to_vec() });
        Ok(())
    }

    fn upload_render_target(&mut self, id: TargetId, rgba: &[u8]) -> Result<()> {
        let image = self.targets.get_mut(&id).ok_or(BloomError::UnknownTarget(id))?;
        let expected = image.pixels.len() * 4;
        if rgba.len() != expected {
            return Err(BloomError::Device(format!(
                "upload size mismatch: expected {} bytes, got {}",
                expected,
                rgba.len()
            )));
        }
        for (p, chunk) in image.pixels.iter_mut().zip(rgba.chunks_exact(4)) {
            *p = [
                chunk[0] as f32 / 255.0,
                chunk[1] as f32 / 255.0,
                chunk[2] as f32 / 255.0,
                chunk[3] as f32 / 255.0,
            ];
        }
        self.ops.push(DeviceOp::Upload(id));
        Ok(())
    }

    fn output_size(&self) -> (u32, u32) {
        (self.output.width, self.output.height)
    }
}
