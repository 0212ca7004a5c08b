//! Procedural test scenes for the CLI.
//!
//! A scene is generated on the CPU, uploaded into a render target, and drawn as
//! one full-frame sprite while the bloom effect is capturing.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gpu::device::{
    rgba8_len, BlendMode, Color, GraphicsDevice, Rect, SpriteDraw, TargetId,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SceneKind {
    /// White square covering the middle quarter of the frame, black elsewhere.
    Square,
    /// The whole frame white.
    Full,
    /// Alternating white/black vertical stripes, 8 pixels wide.
    Stripes,
}

const STRIPE_WIDTH: u32 = 8;

/// Scene pixels as tightly packed opaque RGBA8.
pub fn scene_pixels(kind: SceneKind, width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(rgba8_len(width, height));
    for y in 0..height {
        for x in 0..width {
            let lit = match kind {
                SceneKind::Full => true,
                SceneKind::Square => {
                    x >= width / 4 && x < width * 3 / 4 && y >= height / 4 && y < height * 3 / 4
                }
                SceneKind::Stripes => (x / STRIPE_WIDTH) % 2 == 0,
            };
            let v = if lit { 255 } else { 0 };
            pixels.extend_from_slice(&[v, v, v, 255]);
        }
    }
    pixels
}

/// A scene uploaded to the device and ready to draw.
pub struct DemoScene {
    source: TargetId,
    width: u32,
    height: u32,
}

impl DemoScene {
    pub fn new<D: GraphicsDevice>(
        device: &mut D,
        kind: SceneKind,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let source = device.create_render_target(width, height, "Demo Scene Source")?;
        if let Err(e) = device.upload_render_target(source, &scene_pixels(kind, width, height)) {
            device.destroy_render_target(source);
            return Err(e);
        }
        Ok(Self { source, width, height })
    }

    /// Draw the scene over the whole current target.
    pub fn draw<D: GraphicsDevice>(
        &self,
        device: &mut D,
        batch: &mut D::SpriteBatch,
    ) -> Result<()> {
        device.draw_sprites(
            batch,
            BlendMode::Alpha,
            &[SpriteDraw {
                source: self.source,
                dest: Rect::from_size(self.width, self.height),
                tint: Color::WHITE,
            }],
        )
    }

    pub fn release<D: GraphicsDevice>(self, device: &mut D) {
        device.destroy_render_target(self.source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(pixels: &[u8], width: u32, x: u32, y: u32) -> bool {
        pixels[(y as usize * width as usize + x as usize) * 4] == 255
    }

    #[test]
    fn test_square_scene() {
        let pixels = scene_pixels(SceneKind::Square, 16, 16);
        assert_eq!(pixels.len(), 16 * 16 * 4);
        assert!(lit(&pixels, 16, 8, 8));
        assert!(!lit(&pixels, 16, 0, 0));
        assert!(!lit(&pixels, 16, 12, 8));
    }

    #[test]
    fn test_stripes_scene() {
        let pixels = scene_pixels(SceneKind::Stripes, 32, 2);
        assert!(lit(&pixels, 32, 0, 1));
        assert!(!lit(&pixels, 32, 8, 1));
        assert!(lit(&pixels, 32, 16, 0));
    }

    #[test]
    fn test_scene_length_matches_rgba8_len() {
        for kind in [SceneKind::Square, SceneKind::Full, SceneKind::Stripes] {
            assert_eq!(scene_pixels(kind, 7, 5).len(), rgba8_len(7, 5));
        }
    }

    #[test]
    fn test_scene_kind_serde() {
        let kind: SceneKind = serde_json::from_str("\"stripes\"").unwrap();
        assert_eq!(kind, SceneKind::Stripes);
    }
}
