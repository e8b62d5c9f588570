//! Control wrapper for Basler pylon cameras.
//!
//! [`Camera`] enumerates devices through a [`TransportLayer`], pushes exposure and gain
//! settings and grabs single frames converted to 24-bit BGR. [`run_preview`] drives a trackbar
//! preview through a [`Display`]. The `pylon` feature provides the real SDK transport;
//! [`sim::SimTransport`] is always available for tests and demos.

pub mod camera;
pub mod common;
pub mod converter;
pub mod device_info;
pub mod display;
pub mod error;
pub mod frame;
pub mod preview;
#[cfg(feature = "pylon")]
pub mod pylon;
pub mod sim;
pub mod transport;

// Re-export main types for convenience
pub use crate::camera::{Camera, CameraConfig, CameraSettings, DEFAULT_GRAB_TIMEOUT};
pub use crate::common::{AutoMode, Exposure, FeatureNaming, Gain, GainNode, PixelFormat};
pub use crate::converter::{BitAlignment, ImageFormatConverter};
pub use crate::device_info::DeviceInfo;
pub use crate::display::{Display, ScriptStep, ScriptedDisplay, WindowMode};
pub use crate::error::{CameraError, Result};
pub use crate::frame::{BgrImage, RawFrame, TestPattern};
pub use crate::preview::{PreviewMode, PreviewOptions, PreviewSummary, run_preview};
pub use crate::transport::{CameraDevice, GrabStrategy, TransportLayer};

#[cfg(feature = "highgui")]
pub use crate::display::HighGui;
#[cfg(feature = "pylon")]
pub use crate::pylon::PylonTransport;
