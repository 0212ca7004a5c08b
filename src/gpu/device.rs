//! Graphics device boundary used by the bloom effect.
//!
//! The effect never talks to wgpu directly. It needs exactly five capabilities
//! from the host: create/destroy off-screen color buffers, redirect drawing to a
//! buffer or to the default output, clear the current buffer, and draw textured
//! quads with a tint and a blend mode. Backends implement [`GraphicsDevice`].

use crate::error::Result;

/// Opaque handle to an off-screen render target owned by a device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub(crate) u32);

impl TargetId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Straight (non-premultiplied) RGBA color, components in `[0, 1]`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Same color with a different alpha.
    pub const fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn to_wgpu(self) -> wgpu::Color {
        wgpu::Color {
            r: self.r as f64,
            g: self.g as f64,
            b: self.b as f64,
            a: self.a as f64,
        }
    }
}

impl From<[f32; 4]> for Color {
    fn from(c: [f32; 4]) -> Self {
        Color::rgba(c[0], c[1], c[2], c[3])
    }
}

/// How a sprite is combined with the pixels already in the target.
///
/// `src` is `texel * tint`, clamped to `[0, 1]` like any unorm fragment output.
/// * `Alpha`: `rgb = src.rgb * src.a + dst.rgb * (1 - src.a)`, `a = src.a + dst.a * (1 - src.a)`
/// * `Additive`: `rgb = dst.rgb + src.rgb * src.a`, `a = dst.a`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Alpha,
    Additive,
}

/// Axis-aligned rectangle in destination pixels, origin top-left.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle at the origin covering `width` x `height` pixels.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }
}

/// Byte length of a tightly packed RGBA8 image, as taken by
/// [`GraphicsDevice::upload_render_target`].
pub fn rgba8_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

/// One textured quad: `source` sampled over `dest`, multiplied by `tint`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SpriteDraw {
    pub source: TargetId,
    pub dest: Rect,
    pub tint: Color,
}

/// Host graphics API the bloom effect is built on.
///
/// All calls are synchronous and happen on the thread that owns the device.
pub trait GraphicsDevice {
    /// Immediate-mode quad drawing helper.
    type SpriteBatch;

    fn create_render_target(&mut self, width: u32, height: u32, label: &str) -> Result<TargetId>;

    /// Release a render target. Unknown or already released handles are ignored.
    fn destroy_render_target(&mut self, id: TargetId);

    fn render_target_size(&self, id: TargetId) -> Option<(u32, u32)>;

    /// Redirect subsequent drawing. `None` selects the default output.
    fn set_render_target(&mut self, target: Option<TargetId>);

    /// Clear the current target to a solid color.
    fn clear(&mut self, color: Color) -> Result<()>;

    fn create_sprite_batch(&mut self) -> Result<Self::SpriteBatch>;

    fn destroy_sprite_batch(&mut self, batch: Self::SpriteBatch);

    /// Draw `sprites` in order into the current target with linear-clamp sampling.
    fn draw_sprites(
        &mut self,
        batch: &mut Self::SpriteBatch,
        blend: BlendMode,
        sprites: &[SpriteDraw],
    ) -> Result<()>;

    /// Overwrite a render target with tightly packed RGBA8 pixels.
    fn upload_render_target(&mut self, id: TargetId, rgba: &[u8]) -> Result<()>;

    /// Size of the default output.
    fn output_size(&self) -> (u32, u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_alpha_keeps_rgb() {
        let c = Color::WHITE.with_alpha(0.2);
        assert_eq!(c.to_array(), [1.0, 1.0, 1.0, 0.2]);
    }

    #[test]
    fn test_rect_from_size() {
        let r = Rect::from_size(64, 32);
        assert_eq!(r, Rect::new(0.0, 0.0, 64.0, 32.0));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_rgba8_len_does_not_wrap() {
        assert_eq!(rgba8_len(16, 16), 1024);
        // 40000 * 40000 * 4 does not fit in a u32.
        assert_eq!(rgba8_len(40_000, 40_000) as u64, 6_400_000_000);
    }
}
