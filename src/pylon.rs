//! Basler pylon backend (feature `pylon`).
//!
//! Requires the pylon SDK to be installed where `pylon-cxx` can find it.

use std::time::Duration;

use pylon_cxx::{
    GrabOptions, GrabResult, HasProperties, InstantCamera, Pylon, TimeoutHandling, TlFactory,
};

use crate::common::{self, PixelFormat};
use crate::device_info::DeviceInfo;
use crate::error::{CameraError, Result};
use crate::frame::RawFrame;
use crate::transport::{CameraDevice, GrabStrategy, TransportLayer};

/// Owns the pylon runtime; devices created from it borrow it.
pub struct PylonTransport {
    pylon: Pylon,
}

impl PylonTransport {
    pub fn new() -> Self {
        PylonTransport { pylon: Pylon::new() }
    }
}

impl Default for PylonTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn property(info: &pylon_cxx::DeviceInfo, name: &str) -> String {
    info.property_value(name).unwrap_or_default()
}

impl TransportLayer for PylonTransport {
    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>> {
        let devices = TlFactory::instance(&self.pylon).enumerate_devices()?;
        Ok(devices
            .iter()
            .enumerate()
            .map(|(index, info)| DeviceInfo {
                index,
                friendly_name: property(info, "FriendlyName"),
                model_name: property(info, "ModelName"),
                serial_number: property(info, "SerialNumber"),
                vendor_name: property(info, "VendorName"),
                device_class: property(info, "DeviceClass"),
            })
            .collect())
    }

    fn create_device(&self, info: &DeviceInfo) -> Result<Box<dyn CameraDevice + '_>> {
        let factory = TlFactory::instance(&self.pylon);
        let devices = factory.enumerate_devices()?;
        // Enumeration order can change between calls; match on the serial number.
        let native = devices
            .iter()
            .find(|d| property(d, "SerialNumber") == info.serial_number)
            .ok_or_else(|| {
                CameraError::Sdk(format!("device {} is no longer attached", info.serial_number))
            })?;
        let camera = factory.create_device(native)?;
        Ok(Box::new(PylonDevice { camera, pixel_format: None }))
    }
}

pub struct PylonDevice<'a> {
    camera: InstantCamera<'a>,
    /// Raw format captured when grabbing starts.
    pixel_format: Option<PixelFormat>,
}

impl PylonDevice<'_> {
    fn read_pixel_format(&self) -> Result<PixelFormat> {
        let name = self.camera.node_map()?.enum_node(common::PIXEL_FORMAT)?.value()?;
        name.parse()
    }
}

fn feature_err(name: &str) -> impl FnOnce(pylon_cxx::PylonError) -> CameraError + '_ {
    move |err| CameraError::feature(name, err.to_string())
}

impl CameraDevice for PylonDevice<'_> {
    fn open(&mut self) -> Result<()> {
        Ok(self.camera.open()?)
    }

    fn close(&mut self) -> Result<()> {
        Ok(self.camera.close()?)
    }

    fn is_open(&self) -> Result<bool> {
        Ok(self.camera.is_open()?)
    }

    fn has_feature(&self, name: &str) -> bool {
        let Ok(map) = self.camera.node_map() else {
            return false;
        };
        map.float_node(name).is_ok()
            || map.integer_node(name).is_ok()
            || map.enum_node(name).is_ok()
    }

    fn float(&self, name: &str) -> Result<f64> {
        let node = self.camera.node_map()?.float_node(name).map_err(feature_err(name))?;
        node.value().map_err(feature_err(name))
    }

    fn set_float(&mut self, name: &str, value: f64) -> Result<()> {
        let mut node = self.camera.node_map()?.float_node(name).map_err(feature_err(name))?;
        node.set_value(value).map_err(feature_err(name))
    }

    fn integer(&self, name: &str) -> Result<i64> {
        let node = self.camera.node_map()?.integer_node(name).map_err(feature_err(name))?;
        node.value().map_err(feature_err(name))
    }

    fn set_integer(&mut self, name: &str, value: i64) -> Result<()> {
        let mut node = self.camera.node_map()?.integer_node(name).map_err(feature_err(name))?;
        node.set_value(value).map_err(feature_err(name))
    }

    fn enumeration(&self, name: &str) -> Result<String> {
        let node = self.camera.node_map()?.enum_node(name).map_err(feature_err(name))?;
        node.value().map_err(feature_err(name))
    }

    fn set_enumeration(&mut self, name: &str, value: &str) -> Result<()> {
        let mut node = self.camera.node_map()?.enum_node(name).map_err(feature_err(name))?;
        node.set_value(value).map_err(feature_err(name))
    }

    fn start_grabbing(&mut self, strategy: GrabStrategy) -> Result<()> {
        self.pixel_format = Some(self.read_pixel_format()?);
        let strategy = match strategy {
            GrabStrategy::OneByOne => pylon_cxx::GrabStrategy::OneByOne,
            GrabStrategy::LatestImageOnly => pylon_cxx::GrabStrategy::LatestImageOnly,
        };
        self.camera.start_grabbing(&GrabOptions::default().strategy(strategy))?;
        Ok(())
    }

    fn retrieve(&mut self, timeout: Duration) -> Result<RawFrame> {
        let timeout_ms = timeout.as_millis().min(u128::from(u32::MAX)) as u32;
        let mut result = GrabResult::new()?;
        let arrived =
            self.camera.retrieve_result(timeout_ms, &mut result, TimeoutHandling::Return)?;
        if !arrived {
            return Err(CameraError::Timeout { timeout_ms: u64::from(timeout_ms) });
        }
        if !result.grab_succeeded()? {
            return Err(CameraError::GrabFailed {
                code: result.error_code()?,
                description: result.error_description()?,
            });
        }
        let pixel_format = match self.pixel_format {
            Some(format) => format,
            None => self.read_pixel_format()?,
        };
        // Copy out; the SDK buffer goes back to the pool when `result` drops.
        let data = result.buffer()?.to_vec();
        Ok(RawFrame::new(result.width()?, result.height()?, pixel_format, data))
    }

    fn stop_grabbing(&mut self) -> Result<()> {
        Ok(self.camera.stop_grabbing()?)
    }

    fn is_grabbing(&self) -> bool {
        self.camera.is_grabbing()
    }
}
