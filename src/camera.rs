use std::time::{Duration, Instant};

use log::{Level, debug, info, log_enabled};
use serde::{Deserialize, Serialize};

use crate::common::{self, AutoMode, Exposure, FeatureNaming, Gain, GainNode};
use crate::converter::ImageFormatConverter;
use crate::device_info::DeviceInfo;
use crate::error::{CameraError, Result};
use crate::frame::BgrImage;
use crate::transport::{CameraDevice, GrabStrategy, TransportLayer};

pub const DEFAULT_GRAB_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_DISPLAY_MAGNIFICATION: u32 = 50;
pub const MAX_DISPLAY_MAGNIFICATION: u32 = 200;

/// Settings applied while the camera is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Position in the device enumeration
    pub index: usize,
    pub exposure: Exposure,
    pub gain: Gain,
    /// Preview window size as a percentage of the sensor size
    pub display_magnification: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            exposure: Exposure::default(),
            gain: Gain::default(),
            display_magnification: DEFAULT_DISPLAY_MAGNIFICATION,
        }
    }
}

impl CameraConfig {
    /// Select the device at `index` in enumeration order.
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// Exposure pushed to the device on construction.
    pub fn with_exposure(mut self, exposure: Exposure) -> Self {
        self.exposure = exposure;
        self
    }

    /// Gain pushed to the device on construction.
    pub fn with_gain(mut self, gain: Gain) -> Self {
        self.gain = gain;
        self
    }

    /// Initial preview magnification in percent; clamped like
    /// [`Camera::set_display_magnification`].
    pub fn with_display_magnification(mut self, percent: u32) -> Self {
        self.display_magnification = percent;
        self
    }
}

/// Read-back of the camera state, suitable for printing or JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub name: String,
    pub width: i64,
    pub height: i64,
    pub pixel_format: String,
    pub exposure_auto: AutoMode,
    pub exposure_us: f64,
    pub gain_auto: AutoMode,
    /// In the unit of `gain_node`
    pub gain: f64,
    pub exposure_upper_limit_us: f64,
    pub gain_upper_limit: f64,
    pub naming: FeatureNaming,
    pub gain_node: GainNode,
}

/// Wrapper around one exclusively owned camera handle.
///
/// The handle must be open for every register access and grab; those calls fail with
/// [`CameraError::NotOpen`] otherwise. A camera comes back closed from [`Camera::new`] and is
/// closed again when dropped.
pub struct Camera<'a> {
    info: DeviceInfo,
    device: Box<dyn CameraDevice + 'a>,
    converter: ImageFormatConverter,
    naming: FeatureNaming,
    gain_node: GainNode,
    display_magnification: u32,
}

impl<'a> Camera<'a> {
    /// Select the device at `config.index`, push the exposure and gain settings and close it
    /// again.
    pub fn new<T: TransportLayer + ?Sized>(
        transport: &'a T,
        config: &CameraConfig,
    ) -> Result<Self> {
        let devices = transport.enumerate_devices()?;
        if devices.is_empty() {
            return Err(CameraError::NoDevice);
        }
        let info = devices.get(config.index).cloned().ok_or(CameraError::DeviceIndexOutOfRange {
            index: config.index,
            available: devices.len(),
        })?;
        let device = transport.create_device(&info)?;

        let mut camera = Camera {
            info,
            device,
            converter: ImageFormatConverter::new(),
            naming: FeatureNaming::Standard,
            gain_node: GainNode::Db,
            display_magnification: DEFAULT_DISPLAY_MAGNIFICATION,
        };
        camera.set_display_magnification(config.display_magnification);

        camera.open()?;
        let configured = camera.configure(config);
        // Close on both paths; a configure error takes precedence.
        let closed = camera.close();
        let settings = configured?;
        closed?;

        info!(
            "opened {}: {}x{} {}, ExposureAuto = {}, ExposureTime = {} us, GainAuto = {}, \
             Gain = {} {}",
            settings.name,
            settings.width,
            settings.height,
            settings.pixel_format,
            settings.exposure_auto,
            settings.exposure_us,
            settings.gain_auto,
            settings.gain,
            settings.gain_node.unit(),
        );
        Ok(camera)
    }

    fn configure(&mut self, config: &CameraConfig) -> Result<CameraSettings> {
        self.naming = if self.device.has_feature(FeatureNaming::Standard.exposure_time()) {
            FeatureNaming::Standard
        } else {
            FeatureNaming::Legacy
        };
        self.gain_node = if self.device.has_feature(GainNode::Db.value()) {
            GainNode::Db
        } else {
            GainNode::Raw
        };
        debug!(
            "{}: exposure names {:?}, gain node {}",
            self.info.friendly_name,
            self.naming,
            self.gain_node.value()
        );
        self.set_exposure(config.exposure)?;
        self.set_gain(config.gain)?;
        self.settings()
    }

    /// Enumeration entry this camera was created from.
    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Exposure feature names detected on construction.
    pub fn feature_naming(&self) -> FeatureNaming {
        self.naming
    }

    /// Gain register detected on construction; decides the unit of the gain values.
    pub fn gain_node(&self) -> GainNode {
        self.gain_node
    }

    /// Open the device. A no-op when it is already open.
    pub fn open(&mut self) -> Result<()> {
        if self.device.is_open()? {
            return Ok(());
        }
        self.device.open()
    }

    /// Close the device. A no-op when it is already closed.
    pub fn close(&mut self) -> Result<()> {
        if !self.device.is_open()? {
            return Ok(());
        }
        self.device.close()
    }

    /// Whether the SDK reports the device as open.
    pub fn is_open(&self) -> Result<bool> {
        self.device.is_open()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.device.is_open()? { Ok(()) } else { Err(CameraError::NotOpen) }
    }

    /// `Auto` hands exposure to the device; `Manual(us)` turns auto off and writes exactly `us`.
    ///
    /// Legacy integer registers get `us` rounded.
    pub fn set_exposure(&mut self, exposure: Exposure) -> Result<()> {
        self.ensure_open()?;
        match exposure.validate()? {
            Exposure::Auto => {
                self.device
                    .set_enumeration(common::EXPOSURE_AUTO, AutoMode::Continuous.as_genicam())?;
            }
            Exposure::Manual(us) => {
                self.device.set_enumeration(common::EXPOSURE_AUTO, AutoMode::Off.as_genicam())?;
                let name = self.naming.exposure_time();
                if self.naming.uses_integer_registers() {
                    self.device.set_integer(name, us.round() as i64)?;
                } else {
                    self.device.set_float(name, us)?;
                }
            }
        }
        if log_enabled!(Level::Debug) {
            debug!(
                "ExposureAuto = {}, ExposureTime = {} us",
                self.exposure_auto()?,
                self.exposure_us()?
            );
        }
        Ok(())
    }

    /// Numeric form: `0` selects auto exposure.
    pub fn set_exposure_us(&mut self, us: f64) -> Result<()> {
        self.set_exposure(Exposure::from_micros(us))
    }

    /// `Auto` hands gain to the device; `Manual(v)` turns auto off and writes exactly `v`.
    ///
    /// On [`GainNode::Raw`] cameras `v` is in raw units and must be a whole number, since the
    /// register cannot hold anything else.
    pub fn set_gain(&mut self, gain: Gain) -> Result<()> {
        self.ensure_open()?;
        match gain.validate()? {
            Gain::Auto => {
                self.device
                    .set_enumeration(common::GAIN_AUTO, AutoMode::Continuous.as_genicam())?;
            }
            Gain::Manual(value) => {
                let name = self.gain_node.value();
                if self.gain_node == GainNode::Raw && value.fract() != 0.0 {
                    return Err(CameraError::InvalidValue { feature: "GainRaw", value });
                }
                self.device.set_enumeration(common::GAIN_AUTO, AutoMode::Off.as_genicam())?;
                match self.gain_node {
                    GainNode::Db => self.device.set_float(name, value)?,
                    GainNode::Raw => self.device.set_integer(name, value as i64)?,
                }
            }
        }
        if log_enabled!(Level::Debug) {
            debug!(
                "GainAuto = {}, Gain = {} {}",
                self.gain_auto()?,
                self.gain_db()?,
                self.gain_node.unit()
            );
        }
        Ok(())
    }

    /// Numeric form: `0` selects auto gain.
    pub fn set_gain_db(&mut self, db: f64) -> Result<()> {
        self.set_gain(Gain::from_db(db))
    }

    pub fn exposure_auto(&self) -> Result<AutoMode> {
        self.read_auto_mode(common::EXPOSURE_AUTO)
    }

    /// Current exposure time in microseconds, also while the auto loop runs.
    pub fn exposure_us(&self) -> Result<f64> {
        self.ensure_open()?;
        self.read_number(self.naming.exposure_time())
    }

    /// Current exposure as a typed request: `Auto` while the device loop runs continuously.
    pub fn exposure(&self) -> Result<Exposure> {
        Ok(match self.exposure_auto()? {
            AutoMode::Continuous => Exposure::Auto,
            _ => Exposure::Manual(self.exposure_us()?),
        })
    }

    pub fn gain_auto(&self) -> Result<AutoMode> {
        self.read_auto_mode(common::GAIN_AUTO)
    }

    /// Current gain in dB, or in raw units on [`GainNode::Raw`] cameras.
    pub fn gain_db(&self) -> Result<f64> {
        self.ensure_open()?;
        self.read_number(self.gain_node.value())
    }

    pub fn gain(&self) -> Result<Gain> {
        Ok(match self.gain_auto()? {
            AutoMode::Continuous => Gain::Auto,
            _ => Gain::Manual(self.gain_db()?),
        })
    }

    /// Frame width in pixels.
    pub fn width(&self) -> Result<i64> {
        self.ensure_open()?;
        self.device.integer(common::WIDTH)
    }

    /// Frame height in pixels.
    pub fn height(&self) -> Result<i64> {
        self.ensure_open()?;
        self.device.integer(common::HEIGHT)
    }

    /// Upper bound the auto-exposure loop may use.
    pub fn exposure_upper_limit_us(&self) -> Result<f64> {
        self.ensure_open()?;
        self.read_number(self.naming.exposure_upper_limit())
    }

    /// Upper bound the auto-gain loop may use, in the unit of [`Camera::gain_node`].
    pub fn gain_upper_limit_db(&self) -> Result<f64> {
        self.ensure_open()?;
        self.read_number(self.gain_node.upper_limit())
    }

    /// Snapshot of every setting the wrapper manages.
    pub fn settings(&self) -> Result<CameraSettings> {
        self.ensure_open()?;
        Ok(CameraSettings {
            name: self.info.friendly_name.clone(),
            width: self.width()?,
            height: self.height()?,
            pixel_format: self.device.enumeration(common::PIXEL_FORMAT)?,
            exposure_auto: self.exposure_auto()?,
            exposure_us: self.exposure_us()?,
            gain_auto: self.gain_auto()?,
            gain: self.gain_db()?,
            exposure_upper_limit_us: self.exposure_upper_limit_us()?,
            gain_upper_limit: self.gain_upper_limit_db()?,
            naming: self.naming,
            gain_node: self.gain_node,
        })
    }

    /// Grab the most recent frame and convert it to BGR8.
    ///
    /// Grabbing is started with the latest-image-only strategy and stopped again before this
    /// returns, also when retrieval or conversion fails.
    pub fn grab(&mut self, timeout: Duration) -> Result<BgrImage> {
        self.ensure_open()?;
        let started = Instant::now();
        let converter = self.converter;

        self.device.start_grabbing(GrabStrategy::LatestImageOnly)?;
        let converted = self.device.retrieve(timeout).and_then(|raw| {
            debug!("retrieved frame {}: {}", raw.frame_id, raw.describe());
            converter.convert(&raw)
        });
        let stopped = self.device.stop_grabbing();
        let image = converted?;
        stopped?;

        debug!(
            "grab time: {:.2} ms ({}x{})",
            started.elapsed().as_secs_f64() * 1000.0,
            image.width(),
            image.height()
        );
        Ok(image)
    }

    /// [`Camera::grab`] with [`DEFAULT_GRAB_TIMEOUT`].
    pub fn grab_default(&mut self) -> Result<BgrImage> {
        self.grab(DEFAULT_GRAB_TIMEOUT)
    }

    pub fn display_magnification(&self) -> u32 {
        self.display_magnification
    }

    /// Clamped to `1..=200` percent.
    pub fn set_display_magnification(&mut self, percent: u32) {
        self.display_magnification = percent.clamp(1, MAX_DISPLAY_MAGNIFICATION);
    }

    /// Sensor size scaled by the display magnification.
    pub fn display_size(&self) -> Result<(u32, u32)> {
        let percent = u64::from(self.display_magnification);
        let scale = |v: i64| ((v.max(0) as u64 * percent) / 100).max(1) as u32;
        Ok((scale(self.width()?), scale(self.height()?)))
    }

    fn read_auto_mode(&self, name: &str) -> Result<AutoMode> {
        self.ensure_open()?;
        let entry = self.device.enumeration(name)?;
        AutoMode::from_genicam(&entry)
            .ok_or_else(|| CameraError::feature(name, format!("unexpected entry {entry}")))
    }

    fn read_number(&self, name: &str) -> Result<f64> {
        match self.device.float(name) {
            Ok(value) => Ok(value),
            Err(float_err) => self.device.integer(name).map(|v| v as f64).map_err(|_| float_err),
        }
    }
}

impl Drop for Camera<'_> {
    fn drop(&mut self) {
        if matches!(self.device.is_open(), Ok(true)) {
            let _ = self.device.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{GainNode, PixelFormat};
    use crate::sim::{AUTO_EXPOSURE_SETTLED_US, SimCamera, SimFault, SimTransport};

    #[test]
    fn new_leaves_the_camera_closed_and_configured() {
        let transport = SimTransport::single();
        let config =
            CameraConfig::default().with_exposure(Exposure::Manual(20_000.0)).with_gain(Gain::Auto);
        let camera = Camera::new(&transport, &config).unwrap();
        let handle = transport.handle(0).unwrap();

        assert!(!camera.is_open().unwrap());
        assert_eq!(handle.open_count(), 1);
        assert_eq!(handle.stored_value("ExposureAuto").as_deref(), Some("Off"));
        assert_eq!(handle.stored_value("ExposureTime").as_deref(), Some("20000"));
        assert_eq!(handle.stored_value("GainAuto").as_deref(), Some("Continuous"));
    }

    #[test]
    fn no_device_and_bad_index_are_reported() {
        let empty = SimTransport::empty();
        assert_eq!(
            Camera::new(&empty, &CameraConfig::default()).err(),
            Some(CameraError::NoDevice)
        );

        let one = SimTransport::single();
        assert_eq!(
            Camera::new(&one, &CameraConfig::default().with_index(3)).err(),
            Some(CameraError::DeviceIndexOutOfRange { index: 3, available: 1 })
        );
    }

    #[test]
    fn exposure_readback_follows_auto_mode() {
        let transport = SimTransport::single();
        let mut camera = Camera::new(&transport, &CameraConfig::default()).unwrap();
        camera.open().unwrap();
        camera.set_exposure_us(0.0).unwrap();
        assert_eq!(camera.exposure().unwrap(), Exposure::Auto);
        assert_eq!(camera.exposure_us().unwrap(), AUTO_EXPOSURE_SETTLED_US);
        camera.set_exposure_us(1234.0).unwrap();
        assert_eq!(camera.exposure().unwrap(), Exposure::Manual(1234.0));
    }

    #[test]
    fn legacy_cameras_get_integer_register_writes() {
        let transport =
            SimTransport::new(vec![SimCamera::new("acA640-90gm", "20123456").legacy()]);
        let mut camera = Camera::new(&transport, &CameraConfig::default()).unwrap();
        assert_eq!(camera.feature_naming(), FeatureNaming::Legacy);
        assert_eq!(camera.gain_node(), GainNode::Raw);
        camera.open().unwrap();
        camera.set_exposure_us(1500.6).unwrap();
        camera.set_gain_db(100.0).unwrap();
        let handle = transport.handle(0).unwrap();
        assert_eq!(handle.stored_value("ExposureTimeRaw").as_deref(), Some("1501"));
        assert_eq!(handle.stored_value("GainRaw").as_deref(), Some("100"));
        assert_eq!(camera.gain_upper_limit_db().unwrap(), 1023.0);
        assert_eq!(camera.settings().unwrap().gain_node.unit(), "raw");
    }

    #[test]
    fn raw_gain_register_rejects_fractional_values() {
        let transport =
            SimTransport::new(vec![SimCamera::new("acA640-90gm", "20123456").legacy()]);
        let handle = transport.handle(0).unwrap();
        let mut camera = Camera::new(&transport, &CameraConfig::default()).unwrap();
        camera.open().unwrap();
        handle.clear_writes();

        assert_eq!(
            camera.set_gain_db(2.5).unwrap_err(),
            CameraError::InvalidValue { feature: "GainRaw", value: 2.5 }
        );
        assert!(handle.writes().is_empty());
    }

    #[test]
    fn legacy_exposure_with_float_gain_applies_exact_db() {
        let transport = SimTransport::new(vec![
            SimCamera::new("acA1300-60gc", "22000042").legacy().with_gain_node(GainNode::Db),
        ]);
        let handle = transport.handle(0).unwrap();
        let mut camera = Camera::new(&transport, &CameraConfig::default()).unwrap();
        assert_eq!(camera.feature_naming(), FeatureNaming::Legacy);
        assert_eq!(camera.gain_node(), GainNode::Db);
        camera.open().unwrap();

        camera.set_gain_db(2.5).unwrap();
        camera.set_exposure_us(8000.0).unwrap();

        assert_eq!(camera.gain().unwrap(), Gain::Manual(2.5));
        assert_eq!(handle.stored_value("Gain").as_deref(), Some("2.5"));
        assert_eq!(handle.stored_value("GainRaw"), None);
        assert_eq!(handle.stored_value("ExposureTimeRaw").as_deref(), Some("8000"));
        assert_eq!(camera.gain_upper_limit_db().unwrap(), 24.0);
    }

    #[test]
    fn grab_stops_grabbing_even_when_retrieve_fails() {
        let transport =
            SimTransport::new(vec![SimCamera::default().with_pixel_format(PixelFormat::Mono8)]);
        let handle = transport.handle(0).unwrap();
        let mut camera = Camera::new(&transport, &CameraConfig::default()).unwrap();
        camera.open().unwrap();

        handle.push_fault(SimFault::Timeout);
        let err = camera.grab(Duration::from_millis(5)).unwrap_err();
        assert_eq!(err, CameraError::Timeout { timeout_ms: 5 });
        assert!(!handle.is_grabbing());

        let img = camera.grab_default().unwrap();
        assert_eq!((img.width(), img.height()), (640, 480));
        assert!(!handle.is_grabbing());
        assert_eq!(handle.last_strategy(), Some(GrabStrategy::LatestImageOnly));
    }

    #[test]
    fn magnification_is_clamped_and_scales_display_size() {
        let transport = SimTransport::single();
        let config = CameraConfig::default().with_display_magnification(500);
        let mut camera = Camera::new(&transport, &config).unwrap();
        assert_eq!(camera.display_magnification(), MAX_DISPLAY_MAGNIFICATION);
        camera.set_display_magnification(0);
        assert_eq!(camera.display_magnification(), 1);
        camera.set_display_magnification(50);
        camera.open().unwrap();
        assert_eq!(camera.display_size().unwrap(), (320, 240));
    }

    #[test]
    fn drop_closes_an_open_camera() {
        let transport = SimTransport::single();
        let handle = transport.handle(0).unwrap();
        {
            let mut camera = Camera::new(&transport, &CameraConfig::default()).unwrap();
            camera.open().unwrap();
            assert!(handle.is_open());
        }
        assert!(!handle.is_open());
    }
}
