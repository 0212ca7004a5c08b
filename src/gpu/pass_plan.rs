//! The bloom draw sequence as data.
//!
//! `end_capture` is a fixed list of steps. Each step reads one surface, writes
//! another, and draws one or more taps of the source with a single blend mode.

use glam::Vec2;

use crate::gpu::device::{BlendMode, Color};

/// Offsets (in units of blur strength) of the five blur taps.
pub const BLUR_TAP_OFFSETS: [f32; 5] = [-2.0, -1.0, 0.0, 1.0, 2.0];

/// Alpha of each blur tap. Five additive taps at 0.2 sum to unit weight.
pub const BLUR_TAP_ALPHA: f32 = 0.2;

/// Upper bound on blur passes (caps GPU cost).
pub const MAX_BLUR_PASSES: u32 = 64;

/// Effect parameters fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BloomParams {
    /// Alpha of the additive bloom layer in the final composite.
    pub intensity: f32,
    /// Spacing, in quarter-resolution pixels, between blur taps.
    pub blur_strength: f32,
    /// Number of horizontal+vertical blur iterations.
    pub blur_passes: u32,
}

impl BloomParams {
    /// Blur iterations actually run: `blur_passes` capped at [`MAX_BLUR_PASSES`].
    pub fn effective_blur_passes(&self) -> u32 {
        self.blur_passes.min(MAX_BLUR_PASSES)
    }
}

impl Default for BloomParams {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            blur_strength: 1.0,
            blur_passes: 2,
        }
    }
}

/// Buffers a pass can read from or write to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Surface {
    /// Full-resolution scene capture.
    Scene,
    HalfA,
    HalfB,
    QuarterA,
    QuarterB,
    /// The device's default output.
    Output,
}

/// Where a tap lands in the destination.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Placement {
    /// Stretch the source over `(0, 0)` .. the size of the given surface.
    StretchTo(Surface),
    /// Draw the source at its natural size, shifted by the offset.
    Offset(Vec2),
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Tap {
    pub placement: Placement,
    pub tint: Color,
}

/// One step of the bloom sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct PassDescriptor {
    pub label: &'static str,
    pub source: Surface,
    pub destination: Surface,
    pub blend: BlendMode,
    /// Color the destination is cleared to before drawing, if any.
    pub clear: Option<Color>,
    pub taps: Vec<Tap>,
}

fn stretch_pass(label: &'static str, source: Surface, destination: Surface) -> PassDescriptor {
    PassDescriptor {
        label,
        source,
        destination,
        blend: BlendMode::Alpha,
        clear: Some(Color::BLACK),
        taps: vec![Tap {
            placement: Placement::StretchTo(destination),
            tint: Color::WHITE,
        }],
    }
}

fn blur_pass(
    label: &'static str,
    source: Surface,
    destination: Surface,
    axis: Vec2,
    strength: f32,
) -> PassDescriptor {
    let tint = Color::WHITE.with_alpha(BLUR_TAP_ALPHA);
    PassDescriptor {
        label,
        source,
        destination,
        blend: BlendMode::Additive,
        clear: Some(Color::BLACK),
        taps: BLUR_TAP_OFFSETS
            .iter()
            .map(|&i| Tap {
                placement: Placement::Offset(axis * (i * strength)),
                tint,
            })
            .collect(),
    }
}

/// Build the ordered pass list run by `end_capture`.
pub fn build_pass_plan(params: &BloomParams) -> Vec<PassDescriptor> {
    let passes = params.effective_blur_passes() as usize;
    let mut plan = Vec::with_capacity(5 + passes * 2);

    plan.push(stretch_pass("downsample-half", Surface::Scene, Surface::HalfA));
    plan.push(stretch_pass("downsample-quarter", Surface::HalfA, Surface::QuarterA));

    for _ in 0..passes {
        plan.push(blur_pass(
            "blur-horizontal",
            Surface::QuarterA,
            Surface::QuarterB,
            Vec2::X,
            params.blur_strength,
        ));
        plan.push(blur_pass(
            "blur-vertical",
            Surface::QuarterB,
            Surface::QuarterA,
            Vec2::Y,
            params.blur_strength,
        ));
    }

    plan.push(stretch_pass("upsample-half", Surface::QuarterA, Surface::HalfB));

    plan.push(PassDescriptor {
        label: "composite-scene",
        source: Surface::Scene,
        destination: Surface::Output,
        blend: BlendMode::Alpha,
        clear: None,
        taps: vec![Tap {
            placement: Placement::Offset(Vec2::ZERO),
            tint: Color::WHITE,
        }],
    });

    plan.push(PassDescriptor {
        label: "composite-bloom",
        source: Surface::HalfB,
        destination: Surface::Output,
        blend: BlendMode::Additive,
        clear: None,
        taps: vec![Tap {
            placement: Placement::StretchTo(Surface::Scene),
            tint: Color::WHITE.with_alpha(params.intensity),
        }],
    });

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(plan: &[PassDescriptor]) -> Vec<&'static str> {
        plan.iter().map(|p| p.label).collect()
    }

    #[test]
    fn test_plan_order_with_two_passes() {
        let plan = build_pass_plan(&BloomParams { blur_passes: 2, ..Default::default() });
        assert_eq!(
            labels(&plan),
            vec![
                "downsample-half",
                "downsample-quarter",
                "blur-horizontal",
                "blur-vertical",
                "blur-horizontal",
                "blur-vertical",
                "upsample-half",
                "composite-scene",
                "composite-bloom",
            ]
        );
    }

    #[test]
    fn test_zero_passes_skips_blur() {
        let plan = build_pass_plan(&BloomParams { blur_passes: 0, ..Default::default() });
        assert_eq!(plan.len(), 5);
        assert!(plan.iter().all(|p| !p.label.starts_with("blur")));
    }

    #[test]
    fn test_blur_taps_scale_with_strength() {
        let plan = build_pass_plan(&BloomParams {
            blur_strength: 1.5,
            blur_passes: 1,
            ..Default::default()
        });
        let horizontal = &plan[2];
        assert_eq!(horizontal.source, Surface::QuarterA);
        assert_eq!(horizontal.destination, Surface::QuarterB);
        assert_eq!(horizontal.blend, BlendMode::Additive);
        assert_eq!(horizontal.clear, Some(Color::BLACK));

        let offsets: Vec<Vec2> = horizontal
            .taps
            .iter()
            .map(|t| match t.placement {
                Placement::Offset(o) => o,
                Placement::StretchTo(_) => panic!("blur tap should be an offset"),
            })
            .collect();
        assert_eq!(
            offsets,
            vec![
                Vec2::new(-3.0, 0.0),
                Vec2::new(-1.5, 0.0),
                Vec2::ZERO,
                Vec2::new(1.5, 0.0),
                Vec2::new(3.0, 0.0),
            ]
        );

        let vertical = &plan[3];
        assert_eq!(vertical.source, Surface::QuarterB);
        assert_eq!(vertical.destination, Surface::QuarterA);
        assert_eq!(vertical.taps[4].placement, Placement::Offset(Vec2::new(0.0, 3.0)));
    }

    #[test]
    fn test_tap_weights_sum_to_one() {
        let total: f32 = BLUR_TAP_OFFSETS.iter().map(|_| BLUR_TAP_ALPHA).sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_composite_uses_intensity_and_additive_blend() {
        let plan = build_pass_plan(&BloomParams { intensity: 0.35, ..Default::default() });
        let scene = &plan[plan.len() - 2];
        assert_eq!(scene.destination, Surface::Output);
        assert_eq!(scene.clear, None);
        assert_eq!(scene.blend, BlendMode::Alpha);

        let bloom = plan.last().unwrap();
        assert_eq!(bloom.source, Surface::HalfB);
        assert_eq!(bloom.blend, BlendMode::Additive);
        assert_eq!(bloom.taps[0].placement, Placement::StretchTo(Surface::Scene));
        assert!((bloom.taps[0].tint.a - 0.35).abs() < 1e-6);
    }

    #[test]
    fn test_pass_count_is_capped() {
        let params = BloomParams { blur_passes: u32::MAX, ..Default::default() };
        assert_eq!(params.effective_blur_passes(), MAX_BLUR_PASSES);
        let plan = build_pass_plan(&params);
        assert_eq!(plan.len(), 5 + 2 * MAX_BLUR_PASSES as usize);
    }

    #[test]
    fn test_effective_passes_below_cap() {
        let params = BloomParams { blur_passes: 3, ..Default::default() };
        assert_eq!(params.effective_blur_passes(), 3);
        let at_cap = BloomParams { blur_passes: MAX_BLUR_PASSES, ..Default::default() };
        assert_eq!(at_cap.effective_blur_passes(), MAX_BLUR_PASSES);
    }
}
