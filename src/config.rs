use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gpu::pass_plan::BloomParams;

/// Bloom parameters as read from a JSON settings file.
///
/// Missing fields fall back to the defaults below.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomSettings {
    pub intensity: f32,
    pub blur_strength: f32,
    pub blur_passes: u32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        let params = BloomParams::default();
        Self {
            intensity: params.intensity,
            blur_strength: params.blur_strength,
            blur_passes: params.blur_passes,
        }
    }
}

impl BloomSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let settings = Self::from_json_str(&contents)?;
        log::debug!("Loaded bloom settings from {}: {:?}", path.display(), settings);
        Ok(settings)
    }

    /// Checked effect parameters.
    pub fn validate(&self) -> Result<BloomParams> {
        let params = BloomParams {
            intensity: self.intensity,
            blur_strength: self.blur_strength,
            blur_passes: self.blur_passes,
        };
        params.validate()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BloomError;

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings = BloomSettings::from_json_str(r#"{ "intensity": 0.5 }"#).unwrap();
        assert_eq!(settings.intensity, 0.5);
        assert_eq!(settings.blur_strength, 1.0);
        assert_eq!(settings.blur_passes, 2);
    }

    #[test]
    fn test_validate_produces_params() {
        let settings = BloomSettings {
            intensity: 0.8,
            blur_strength: 2.0,
            blur_passes: 0,
        };
        let params = settings.validate().unwrap();
        assert_eq!(params.blur_passes, 0);
        assert_eq!(params.blur_strength, 2.0);
    }

    #[test]
    fn test_validate_rejects_negative_intensity() {
        let settings = BloomSettings { intensity: -1.0, ..Default::default() };
        assert!(matches!(
            settings.validate(),
            Err(BloomError::InvalidParameter { name: "intensity", .. })
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            BloomSettings::from_json_str("{ intensity: }"),
            Err(BloomError::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result = BloomSettings::load("/nonexistent/spritebloom/settings.json");
        assert!(matches!(result, Err(BloomError::Config(_))));
    }
}
