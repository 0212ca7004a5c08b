//! Error types for the bloom effect and its graphics backends.

use crate::gpu::device::TargetId;

/// Errors that can occur while driving the bloom effect.
#[derive(Debug, thiserror::Error)]
pub enum BloomError {
    #[error(
        "invalid render target dimensions {width}x{height} (both sides must be at least {min})",
        min = crate::gpu::bloom_effect::MIN_DIMENSION
    )]
    InvalidDimensions { width: u32, height: u32 },

    #[error("invalid bloom parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("end_capture called without a matching begin_capture")]
    NotCapturing,

    #[error("begin_capture called while a capture is already in progress")]
    AlreadyCapturing,

    #[error("bloom effect has been disposed")]
    Disposed,

    #[error("unknown render target {0:?}")]
    UnknownTarget(TargetId),

    #[error("no suitable GPU adapter found")]
    AdapterNotFound,

    #[error("device error: {0}")]
    Device(String),

    #[error("readback error: {0}")]
    Readback(String),

    #[error("config error: {0}")]
    Config(String),
}

impl From<wgpu::RequestDeviceError> for BloomError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        BloomError::Device(e.to_string())
    }
}

impl From<wgpu::BufferAsyncError> for BloomError {
    fn from(e: wgpu::BufferAsyncError) -> Self {
        BloomError::Readback(e.to_string())
    }
}

impl From<serde_json::Error> for BloomError {
    fn from(e: serde_json::Error) -> Self {
        BloomError::Config(e.to_string())
    }
}

impl From<std::io::Error> for BloomError {
    fn from(e: std::io::Error) -> Self {
        BloomError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BloomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_error_message() {
        let err = BloomError::InvalidDimensions { width: 0, height: 16 };
        let msg = err.to_string();
        assert!(msg.contains("0x16"));
        assert!(msg.contains("at least 4"));
    }

    #[test]
    fn test_json_error_converts_to_config() {
        let err: BloomError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(matches!(err, BloomError::Config(_)));
    }
}
