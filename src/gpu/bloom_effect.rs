//! Bloom post-processing effect.
//!
//! Owns a chain of five render targets:
//! 1. Scene capture at full resolution
//! 2. Two half-resolution buffers (downsample source, upsampled bloom)
//! 3. Two quarter-resolution buffers (blur ping-pong)
//!
//! Per frame the caller wraps its scene drawing in `begin_capture` /
//! `end_capture`. `end_capture` downsamples, blurs, upsamples and composites the
//! bloom additively over the scene on the default output.

use crate::error::{BloomError, Result};
use crate::gpu::device::{Color, GraphicsDevice, Rect, SpriteDraw, TargetId};
use crate::gpu::pass_plan::{
    build_pass_plan, BloomParams, PassDescriptor, Placement, Surface, MAX_BLUR_PASSES,
};

/// Smallest accepted width/height. Anything smaller leaves a zero-sized quarter buffer.
pub const MIN_DIMENSION: u32 = 4;

/// Sizes of the five buffers for a `width` x `height` scene, in
/// scene, half A, half B, quarter A, quarter B order.
pub fn target_sizes(width: u32, height: u32) -> [(u32, u32); 5] {
    let half = (width / 2, height / 2);
    let quarter = (width / 4, height / 4);
    [(width, height), half, half, quarter, quarter]
}

const TARGET_LABELS: [&str; 5] = [
    "Bloom Scene",
    "Bloom Half A",
    "Bloom Half B",
    "Bloom Quarter A",
    "Bloom Quarter B",
];

fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width < MIN_DIMENSION || height < MIN_DIMENSION {
        return Err(BloomError::InvalidDimensions { width, height });
    }
    Ok(())
}

impl BloomParams {
    /// Reject values that would make the composite meaningless.
    pub fn validate(&self) -> Result<()> {
        if !self.intensity.is_finite() || self.intensity < 0.0 {
            return Err(BloomError::InvalidParameter {
                name: "intensity",
                reason: format!("must be finite and non-negative, got {}", self.intensity),
            });
        }
        if !self.blur_strength.is_finite() {
            return Err(BloomError::InvalidParameter {
                name: "blur_strength",
                reason: format!("must be finite, got {}", self.blur_strength),
            });
        }
        Ok(())
    }
}

/// The full set of render targets. Always complete: a set is never partially valid.
#[derive(Clone, Copy, Debug)]
struct BloomTargets {
    scene: TargetId,
    half_a: TargetId,
    half_b: TargetId,
    quarter_a: TargetId,
    quarter_b: TargetId,
}

impl BloomTargets {
    fn create<D: GraphicsDevice>(device: &mut D, width: u32, height: u32) -> Result<Self> {
        let mut created = Vec::with_capacity(5);
        for ((w, h), label) in target_sizes(width, height).into_iter().zip(TARGET_LABELS) {
            match device.create_render_target(w, h, label) {
                Ok(id) => created.push(id),
                Err(e) => {
                    for id in created {
                        device.destroy_render_target(id);
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            scene: created[0],
            half_a: created[1],
            half_b: created[2],
            quarter_a: created[3],
            quarter_b: created[4],
        })
    }

    fn all(&self) -> [TargetId; 5] {
        [self.scene, self.half_a, self.half_b, self.quarter_a, self.quarter_b]
    }

    /// Target backing a surface; `None` for the default output.
    fn resolve(&self, surface: Surface) -> Option<TargetId> {
        match surface {
            Surface::Scene => Some(self.scene),
            Surface::HalfA => Some(self.half_a),
            Surface::HalfB => Some(self.half_b),
            Surface::QuarterA => Some(self.quarter_a),
            Surface::QuarterB => Some(self.quarter_b),
            Surface::Output => None,
        }
    }

    fn release<D: GraphicsDevice>(self, device: &mut D) {
        for id in self.all() {
            device.destroy_render_target(id);
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing,
}

/// Bloom effect bound to a graphics device type.
///
/// The device is borrowed per call; the effect only stores handles.
pub struct BloomEffect<D: GraphicsDevice> {
    batch: Option<D::SpriteBatch>,
    targets: Option<BloomTargets>,
    params: BloomParams,
    plan: Vec<PassDescriptor>,
    width: u32,
    height: u32,
    state: CaptureState,
    disposed: bool,
}

impl<D: GraphicsDevice> BloomEffect<D> {
    pub fn new(device: &mut D, width: u32, height: u32, params: BloomParams) -> Result<Self> {
        params.validate()?;
        check_dimensions(width, height)?;
        if params.blur_passes > MAX_BLUR_PASSES {
            log::warn!(
                "blur_passes {} exceeds the maximum of {}; running {} passes",
                params.blur_passes,
                MAX_BLUR_PASSES,
                params.effective_blur_passes()
            );
        }

        let batch = device.create_sprite_batch()?;
        let mut effect = Self {
            batch: Some(batch),
            targets: None,
            params,
            plan: build_pass_plan(&params),
            width: 0,
            height: 0,
            state: CaptureState::Idle,
            disposed: false,
        };

        if let Err(e) = effect.resize(device, width, height) {
            effect.dispose(device);
            return Err(e);
        }
        Ok(effect)
    }

    /// Make the buffers match `width` x `height`.
    ///
    /// No-op when the size is unchanged. Otherwise releases all five buffers and
    /// allocates a new set.
    pub fn resize(&mut self, device: &mut D, width: u32, height: u32) -> Result<()> {
        if self.disposed {
            return Err(BloomError::Disposed);
        }
        check_dimensions(width, height)?;

        if self.targets.is_some() && width == self.width && height == self.height {
            return Ok(());
        }

        if let Some(old) = self.targets.take() {
            old.release(device);
        }
        self.width = 0;
        self.height = 0;

        let targets = BloomTargets::create(device, width, height)?;
        log::debug!(
            "Bloom targets allocated: {}x{} (half {}x{}, quarter {}x{})",
            width,
            height,
            width / 2,
            height / 2,
            width / 4,
            height / 4
        );

        self.targets = Some(targets);
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Resize if needed, then redirect drawing into the scene buffer cleared to black.
    pub fn begin_capture(&mut self, device: &mut D, width: u32, height: u32) -> Result<()> {
        if self.disposed {
            return Err(BloomError::Disposed);
        }
        if self.state == CaptureState::Capturing {
            return Err(BloomError::AlreadyCapturing);
        }

        self.resize(device, width, height)?;
        let targets = self.targets.ok_or(BloomError::Disposed)?;

        device.set_render_target(Some(targets.scene));
        device.clear(Color::BLACK)?;
        self.state = CaptureState::Capturing;
        log::trace!("Bloom capture started ({}x{})", width, height);
        Ok(())
    }

    /// Run the bloom passes and composite scene + bloom onto the default output.
    pub fn end_capture(&mut self, device: &mut D) -> Result<()> {
        if self.disposed {
            return Err(BloomError::Disposed);
        }
        if self.state != CaptureState::Capturing {
            return Err(BloomError::NotCapturing);
        }
        self.state = CaptureState::Idle;

        let targets = self.targets.ok_or(BloomError::Disposed)?;
        let batch = self.batch.as_mut().ok_or(BloomError::Disposed)?;

        device.set_render_target(None);

        for pass in &self.plan {
            log::trace!("Bloom pass: {}", pass.label);
            run_pass(device, batch, &targets, pass, self.width, self.height)?;
        }
        Ok(())
    }

    /// Release all buffers and the sprite batch. Safe to call repeatedly.
    pub fn dispose(&mut self, device: &mut D) {
        if let Some(targets) = self.targets.take() {
            targets.release(device);
        }
        if let Some(batch) = self.batch.take() {
            device.destroy_sprite_batch(batch);
        }
        if !self.disposed {
            log::debug!("Bloom effect disposed");
        }
        self.state = CaptureState::Idle;
        self.width = 0;
        self.height = 0;
        self.disposed = true;
    }

    /// Current scene dimensions, `(0, 0)` when no buffers are held.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Sizes of the held buffers, if any.
    pub fn target_sizes(&self) -> Option<[(u32, u32); 5]> {
        self.targets.map(|_| target_sizes(self.width, self.height))
    }

    /// Handle of the buffer backing `surface`.
    pub fn target(&self, surface: Surface) -> Option<TargetId> {
        self.targets.and_then(|t| t.resolve(surface))
    }

    pub fn params(&self) -> &BloomParams {
        &self.params
    }

    pub fn pass_plan(&self) -> &[PassDescriptor] {
        &self.plan
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.state == CaptureState::Capturing
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl<D: GraphicsDevice> Drop for BloomEffect<D> {
    fn drop(&mut self) {
        if self.targets.is_some() || self.batch.is_some() {
            log::warn!("BloomEffect dropped without dispose(); device resources were not released");
        }
    }
}

fn surface_size<D: GraphicsDevice>(
    device: &D,
    surface: Surface,
    width: u32,
    height: u32,
) -> (u32, u32) {
    let sizes = target_sizes(width, height);
    match surface {
        Surface::Scene => sizes[0],
        Surface::HalfA => sizes[1],
        Surface::HalfB => sizes[2],
        Surface::QuarterA => sizes[3],
        Surface::QuarterB => sizes[4],
        Surface::Output => device.output_size(),
    }
}

fn run_pass<D: GraphicsDevice>(
    device: &mut D,
    batch: &mut D::SpriteBatch,
    targets: &BloomTargets,
    pass: &PassDescriptor,
    width: u32,
    height: u32,
) -> Result<()> {
    let source = targets.resolve(pass.source).ok_or_else(|| {
        BloomError::Device(format!("pass {} reads the default output", pass.label))
    })?;
    let (src_w, src_h) = surface_size(device, pass.source, width, height);

    let sprites: Vec<SpriteDraw> = pass
        .taps
        .iter()
        .map(|tap| {
            let dest = match tap.placement {
                Placement::StretchTo(surface) => {
                    let (w, h) = surface_size(device, surface, width, height);
                    Rect::from_size(w, h)
                }
                Placement::Offset(offset) => {
                    Rect::new(offset.x, offset.y, src_w as f32, src_h as f32)
                }
            };
            SpriteDraw { source, dest, tint: tap.tint }
        })
        .collect();

    device.set_render_target(targets.resolve(pass.destination));
    if let Some(color) = pass.clear {
        device.clear(color)?;
    }
    device.draw_sprites(batch, pass.blend, &sprites)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_sizes_use_integer_division() {
        assert_eq!(
            target_sizes(301, 203),
            [(301, 203), (150, 101), (150, 101), (75, 50), (75, 50)]
        );
    }

    #[test]
    fn test_validate_rejects_bad_params() {
        let nan = BloomParams { intensity: f32::NAN, ..Default::default() };
        assert!(matches!(
            nan.validate(),
            Err(BloomError::InvalidParameter { name: "intensity", .. })
        ));

        let negative = BloomParams { intensity: -0.5, ..Default::default() };
        assert!(negative.validate().is_err());

        let inf = BloomParams { blur_strength: f32::INFINITY, ..Default::default() };
        assert!(matches!(
            inf.validate(),
            Err(BloomError::InvalidParameter { name: "blur_strength", .. })
        ));

        let negative_strength = BloomParams { blur_strength: -2.0, ..Default::default() };
        assert!(negative_strength.validate().is_ok());
    }

    #[test]
    fn test_check_dimensions() {
        assert!(check_dimensions(4, 4).is_ok());
        assert!(check_dimensions(0, 10).is_err());
        assert!(check_dimensions(10, 3).is_err());
    }
}
