//! Error handling for the pylon camera wrapper

use thiserror::Error;

/// Result type for camera operations
pub type Result<T> = std::result::Result<T, CameraError>;

/// Errors that can occur when working with a camera
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CameraError {
    /// Enumeration returned no devices
    #[error("no camera present")]
    NoDevice,
    /// Requested device index is past the end of the enumeration
    #[error("camera index {index} out of range ({available} device(s) present)")]
    DeviceIndexOutOfRange { index: usize, available: usize },
    /// Register access or grab attempted on a closed device
    #[error("camera is not open")]
    NotOpen,
    /// No frame arrived before the grab timeout expired
    #[error("grab timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    /// The SDK delivered a grab result flagged as failed
    #[error("grab failed (0x{code:08x}): {description}")]
    GrabFailed { code: u32, description: String },
    /// Raw pixel format the converter cannot handle
    #[error("unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),
    /// Raw payload length does not match the frame geometry
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },
    /// Value rejected before it reached the device
    #[error("invalid value {value} for {feature}")]
    InvalidValue { feature: &'static str, value: f64 },
    /// Feature (GenICam node) access failed
    #[error("feature {name}: {message}")]
    Feature { name: String, message: String },
    /// Any other vendor SDK failure, passed through unchanged
    #[error("pylon error: {0}")]
    Sdk(String),
    /// Display backend failure
    #[error("display error: {0}")]
    Display(String),
}

impl CameraError {
    pub(crate) fn feature(name: &str, message: impl Into<String>) -> Self {
        CameraError::Feature {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(feature = "pylon")]
impl From<pylon_cxx::PylonError> for CameraError {
    fn from(err: pylon_cxx::PylonError) -> Self {
        CameraError::Sdk(err.to_string())
    }
}

#[cfg(feature = "highgui")]
impl From<opencv::Error> for CameraError {
    fn from(err: opencv::Error) -> Self {
        CameraError::Display(err.to_string())
    }
}
