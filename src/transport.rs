//! Seam between the wrapper and the vendor SDK.
//!
//! `Camera` only talks to these traits. `sim::SimTransport` implements them in memory and
//! `pylon::PylonTransport` (feature `pylon`) maps them onto the pylon SDK.

use std::time::Duration;

use crate::device_info::DeviceInfo;
use crate::error::Result;
use crate::frame::RawFrame;

/// How buffered frames are handed out while grabbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrabStrategy {
    /// Frames are delivered in acquisition order.
    OneByOne,
    /// Only the newest frame is kept; older buffers are dropped.
    #[default]
    LatestImageOnly,
}

/// Device discovery and handle creation.
pub trait TransportLayer {
    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>>;

    fn create_device(&self, info: &DeviceInfo) -> Result<Box<dyn CameraDevice + '_>>;
}

/// A live, exclusively owned connection to one camera.
///
/// Register accessors take GenICam feature names. Implementations report a missing or
/// inaccessible feature as `CameraError::Feature`.
pub trait CameraDevice {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn is_open(&self) -> Result<bool>;

    fn has_feature(&self, name: &str) -> bool;

    fn float(&self, name: &str) -> Result<f64>;
    fn set_float(&mut self, name: &str, value: f64) -> Result<()>;
    fn integer(&self, name: &str) -> Result<i64>;
    fn set_integer(&mut self, name: &str, value: i64) -> Result<()>;
    fn enumeration(&self, name: &str) -> Result<String>;
    fn set_enumeration(&mut self, name: &str, value: &str) -> Result<()>;

    fn start_grabbing(&mut self, strategy: GrabStrategy) -> Result<()>;
    /// Blocks for at most `timeout`. The SDK buffer is released before this returns.
    fn retrieve(&mut self, timeout: Duration) -> Result<RawFrame>;
    fn stop_grabbing(&mut self) -> Result<()>;
    fn is_grabbing(&self) -> bool;
}
