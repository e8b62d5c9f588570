//! In-memory stand-in for the pylon transport layer.
//!
//! Emulates the handful of GenICam features the wrapper touches, the open/closed state of the
//! device and a grab engine that renders test patterns. Frames the sensor buffered before the
//! first retrieve form a backlog: `LatestImageOnly` drains it and returns the newest frame,
//! `OneByOne` hands frames out oldest first. Faults can be queued to exercise timeout and
//! failed-grab paths.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::common::{self, AutoMode, FeatureNaming, GainNode, PixelFormat};
use crate::device_info::DeviceInfo;
use crate::error::{CameraError, Result};
use crate::frame::{RawFrame, TestPattern};
use crate::transport::{CameraDevice, GrabStrategy, TransportLayer};

/// Exposure reported by the emulated auto-exposure loop once settled.
pub const AUTO_EXPOSURE_SETTLED_US: f64 = 10_000.0;
/// Gain reported by the emulated auto-gain loop once settled.
pub const AUTO_GAIN_SETTLED_DB: f64 = 6.0;

/// Static description of a simulated camera.
#[derive(Debug, Clone)]
pub struct SimCamera {
    pub model_name: String,
    pub serial_number: String,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub naming: FeatureNaming,
    pub gain_node: GainNode,
    pub exposure_range_us: (f64, f64),
    /// In the unit of `gain_node`
    pub gain_range: (f64, f64),
    pub exposure_upper_limit_us: f64,
    pub gain_upper_limit: f64,
    pub pattern: TestPattern,
    /// Frames already buffered when grabbing starts
    pub frame_backlog: usize,
}

impl Default for SimCamera {
    fn default() -> Self {
        SimCamera {
            model_name: "acA1300-30uc".to_string(),
            serial_number: "21000001".to_string(),
            width: 640,
            height: 480,
            pixel_format: PixelFormat::BayerRg8,
            naming: FeatureNaming::Standard,
            gain_node: GainNode::Db,
            exposure_range_us: (10.0, 1_000_000.0),
            gain_range: (0.0, 24.0),
            exposure_upper_limit_us: 100_000.0,
            gain_upper_limit: 24.0,
            pattern: TestPattern::ColorBars,
            frame_backlog: 0,
        }
    }
}

impl SimCamera {
    pub fn new(model_name: impl Into<String>, serial_number: impl Into<String>) -> Self {
        SimCamera {
            model_name: model_name.into(),
            serial_number: serial_number.into(),
            ..Default::default()
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    /// Older GigE register layout: integer `ExposureTimeRaw` / `GainRaw`.
    pub fn legacy(mut self) -> Self {
        self.naming = FeatureNaming::Legacy;
        self.with_gain_node(GainNode::Raw)
    }

    /// Swap the gain register, with a range typical for it.
    pub fn with_gain_node(mut self, gain_node: GainNode) -> Self {
        self.gain_node = gain_node;
        (self.gain_range, self.gain_upper_limit) = match gain_node {
            GainNode::Db => ((0.0, 24.0), 24.0),
            GainNode::Raw => ((0.0, 1023.0), 1023.0),
        };
        self
    }

    /// Number of frames waiting in the buffer pool each time grabbing starts.
    pub fn with_frame_backlog(mut self, frames: usize) -> Self {
        self.frame_backlog = frames;
        self
    }
}

/// Failure to inject into the next `retrieve`.
#[derive(Debug, Clone, PartialEq)]
pub enum SimFault {
    Timeout,
    GrabFailed { code: u32, description: String },
}

#[derive(Debug, Clone, PartialEq)]
enum Register {
    Float { value: f64, min: f64, max: f64 },
    Integer { value: i64, min: i64, max: i64 },
    Enumeration { value: String, entries: Vec<String> },
}

/// One successful register write, recorded in order.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterWrite {
    pub feature: String,
    pub value: String,
}

#[derive(Debug)]
struct SimState {
    camera: SimCamera,
    registers: BTreeMap<String, Register>,
    open: bool,
    grabbing: Option<GrabStrategy>,
    last_strategy: Option<GrabStrategy>,
    writes: Vec<RegisterWrite>,
    faults: VecDeque<SimFault>,
    /// Frame ids waiting to be retrieved, oldest first
    backlog: VecDeque<u64>,
    /// Frames the sensor has produced so far
    produced: u64,
    open_count: usize,
    grab_count: u64,
}

impl SimState {
    fn new(camera: SimCamera) -> Self {
        let mut registers = BTreeMap::new();
        let naming = camera.naming;
        let auto_entries = || ["Off", "Once", "Continuous"].map(String::from).to_vec();
        registers.insert(
            common::EXPOSURE_AUTO.to_string(),
            Register::Enumeration { value: "Off".into(), entries: auto_entries() },
        );
        registers.insert(
            common::GAIN_AUTO.to_string(),
            Register::Enumeration { value: "Off".into(), entries: auto_entries() },
        );
        registers.insert(
            common::PIXEL_FORMAT.to_string(),
            Register::Enumeration {
                value: camera.pixel_format.as_genicam().into(),
                entries: vec![camera.pixel_format.as_genicam().into()],
            },
        );
        registers.insert(
            common::WIDTH.to_string(),
            Register::Integer { value: camera.width.into(), min: 1, max: camera.width.into() },
        );
        registers.insert(
            common::HEIGHT.to_string(),
            Register::Integer { value: camera.height.into(), min: 1, max: camera.height.into() },
        );

        let (exp_min, exp_max) = camera.exposure_range_us;
        let exposure = if naming.uses_integer_registers() {
            Register::Integer { value: 5000, min: exp_min as i64, max: exp_max as i64 }
        } else {
            Register::Float { value: 5000.0, min: exp_min, max: exp_max }
        };
        registers.insert(naming.exposure_time().into(), exposure);
        registers.insert(
            naming.exposure_upper_limit().into(),
            Register::Float { value: camera.exposure_upper_limit_us, min: exp_min, max: exp_max },
        );

        let gain_node = camera.gain_node;
        let (gain_min, gain_max) = camera.gain_range;
        let (gain, gain_limit) = match gain_node {
            GainNode::Db => (
                Register::Float { value: gain_min, min: gain_min, max: gain_max },
                Register::Float { value: camera.gain_upper_limit, min: gain_min, max: gain_max },
            ),
            GainNode::Raw => {
                let (min, max) = (gain_min as i64, gain_max as i64);
                (
                    Register::Integer { value: min, min, max },
                    Register::Integer { value: camera.gain_upper_limit as i64, min, max },
                )
            }
        };
        registers.insert(gain_node.value().into(), gain);
        registers.insert(gain_node.upper_limit().into(), gain_limit);

        SimState {
            camera,
            registers,
            open: false,
            grabbing: None,
            last_strategy: None,
            writes: Vec::new(),
            faults: VecDeque::new(),
            backlog: VecDeque::new(),
            produced: 0,
            open_count: 0,
            grab_count: 0,
        }
    }

    fn require_open(&self, name: &str) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(CameraError::feature(name, "node map not accessible, device is closed"))
        }
    }

    fn register(&self, name: &str) -> Result<&Register> {
        self.require_open(name)?;
        self.registers
            .get(name)
            .ok_or_else(|| CameraError::feature(name, "node not found"))
    }

    fn register_mut(&mut self, name: &str) -> Result<&mut Register> {
        self.require_open(name)?;
        self.registers
            .get_mut(name)
            .ok_or_else(|| CameraError::feature(name, "node not found"))
    }

    fn auto_mode(&self, name: &str) -> AutoMode {
        match self.registers.get(name) {
            Some(Register::Enumeration { value, .. }) => {
                AutoMode::from_genicam(value).unwrap_or(AutoMode::Off)
            }
            _ => AutoMode::Off,
        }
    }

    /// Value the running auto loop would report for `name`, if any.
    fn settled_value(&self, name: &str) -> Option<f64> {
        let exposure_auto = self.auto_mode(common::EXPOSURE_AUTO) == AutoMode::Continuous;
        if name == self.camera.naming.exposure_time() && exposure_auto {
            return Some(AUTO_EXPOSURE_SETTLED_US);
        }
        let gain_auto = self.auto_mode(common::GAIN_AUTO) == AutoMode::Continuous;
        if name == self.camera.gain_node.value() && gain_auto {
            return Some(AUTO_GAIN_SETTLED_DB);
        }
        None
    }

    fn next_frame_id(&mut self) -> u64 {
        self.produced += 1;
        self.produced
    }

    fn stop(&mut self) {
        self.grabbing = None;
        self.backlog.clear();
    }

    fn record(&mut self, feature: &str, value: String) {
        self.writes.push(RegisterWrite { feature: feature.to_string(), value });
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Transport layer over a fixed list of simulated cameras.
#[derive(Debug, Clone)]
pub struct SimTransport {
    devices: Vec<(DeviceInfo, Arc<Mutex<SimState>>)>,
}

impl SimTransport {
    pub fn new(cameras: Vec<SimCamera>) -> Self {
        let devices = cameras
            .into_iter()
            .enumerate()
            .map(|(index, camera)| {
                let class = match camera.naming {
                    FeatureNaming::Standard => "BaslerUsb",
                    FeatureNaming::Legacy => "BaslerGigE",
                };
                let info =
                    DeviceInfo::new(index, camera.model_name.clone(), camera.serial_number.clone())
                        .with_device_class(class);
                (info, Arc::new(Mutex::new(SimState::new(camera))))
            })
            .collect();
        SimTransport { devices }
    }

    /// One default camera.
    pub fn single() -> Self {
        SimTransport::new(vec![SimCamera::default()])
    }

    /// Nothing attached.
    pub fn empty() -> Self {
        SimTransport::new(Vec::new())
    }

    /// Inspection handle for the device at `index`.
    pub fn handle(&self, index: usize) -> Option<SimHandle> {
        self.devices.get(index).map(|(_, state)| SimHandle { state: Arc::clone(state) })
    }
}

impl TransportLayer for SimTransport {
    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.devices.iter().map(|(info, _)| info.clone()).collect())
    }

    fn create_device(&self, info: &DeviceInfo) -> Result<Box<dyn CameraDevice + '_>> {
        let (_, state) = self
            .devices
            .iter()
            .find(|(known, _)| known.serial_number == info.serial_number)
            .ok_or_else(|| {
                CameraError::Sdk(format!("no device with serial {}", info.serial_number))
            })?;
        Ok(Box::new(SimDevice { state: Arc::clone(state) }))
    }
}

/// Device handle produced by `SimTransport::create_device`.
#[derive(Debug)]
pub struct SimDevice {
    state: Arc<Mutex<SimState>>,
}

impl CameraDevice for SimDevice {
    fn open(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.open {
            state.open = true;
            state.open_count += 1;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.stop();
        state.open = false;
        Ok(())
    }

    fn is_open(&self) -> Result<bool> {
        Ok(lock(&self.state).open)
    }

    fn has_feature(&self, name: &str) -> bool {
        let state = lock(&self.state);
        state.open && state.registers.contains_key(name)
    }

    fn float(&self, name: &str) -> Result<f64> {
        let state = lock(&self.state);
        match state.register(name)? {
            Register::Float { value, .. } => Ok(state.settled_value(name).unwrap_or(*value)),
            _ => Err(CameraError::feature(name, "not a float node")),
        }
    }

    fn set_float(&mut self, name: &str, value: f64) -> Result<()> {
        let mut state = lock(&self.state);
        match state.register_mut(name)? {
            Register::Float { value: current, min, max } => {
                if value < *min || value > *max {
                    let message = format!("value {value} out of range [{min}, {max}]");
                    return Err(CameraError::feature(name, message));
                }
                *current = value;
            }
            _ => return Err(CameraError::feature(name, "not a float node")),
        }
        state.record(name, value.to_string());
        Ok(())
    }

    fn integer(&self, name: &str) -> Result<i64> {
        let state = lock(&self.state);
        match state.register(name)? {
            Register::Integer { value, .. } => {
                Ok(state.settled_value(name).map(|v| v as i64).unwrap_or(*value))
            }
            _ => Err(CameraError::feature(name, "not an integer node")),
        }
    }

    fn set_integer(&mut self, name: &str, value: i64) -> Result<()> {
        let mut state = lock(&self.state);
        match state.register_mut(name)? {
            Register::Integer { value: current, min, max } => {
                if value < *min || value > *max {
                    let message = format!("value {value} out of range [{min}, {max}]");
                    return Err(CameraError::feature(name, message));
                }
                *current = value;
            }
            _ => return Err(CameraError::feature(name, "not an integer node")),
        }
        state.record(name, value.to_string());
        Ok(())
    }

    fn enumeration(&self, name: &str) -> Result<String> {
        let state = lock(&self.state);
        match state.register(name)? {
            Register::Enumeration { value, .. } => Ok(value.clone()),
            _ => Err(CameraError::feature(name, "not an enumeration node")),
        }
    }

    fn set_enumeration(&mut self, name: &str, value: &str) -> Result<()> {
        let mut state = lock(&self.state);
        match state.register_mut(name)? {
            Register::Enumeration { value: current, entries } => {
                if !entries.iter().any(|e| e == value) {
                    return Err(CameraError::feature(name, format!("no enum entry {value}")));
                }
                *current = value.to_string();
            }
            _ => return Err(CameraError::feature(name, "not an enumeration node")),
        }
        state.record(name, value.to_string());
        Ok(())
    }

    fn start_grabbing(&mut self, strategy: GrabStrategy) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.open {
            let message = "cannot start grabbing, the camera device is not open";
            return Err(CameraError::Sdk(message.into()));
        }
        state.grabbing = Some(strategy);
        state.last_strategy = Some(strategy);
        for _ in 0..state.camera.frame_backlog {
            let id = state.next_frame_id();
            state.backlog.push_back(id);
        }
        Ok(())
    }

    fn retrieve(&mut self, timeout: Duration) -> Result<RawFrame> {
        let mut state = lock(&self.state);
        let Some(strategy) = state.grabbing else {
            return Err(CameraError::Sdk("retrieve called while not grabbing".into()));
        };
        match state.faults.pop_front() {
            Some(SimFault::Timeout) => {
                return Err(CameraError::Timeout { timeout_ms: timeout.as_millis() as u64 });
            }
            Some(SimFault::GrabFailed { code, description }) => {
                return Err(CameraError::GrabFailed { code, description });
            }
            None => {}
        }
        let buffered = match strategy {
            GrabStrategy::LatestImageOnly => {
                let newest = state.backlog.pop_back();
                state.backlog.clear();
                newest
            }
            GrabStrategy::OneByOne => state.backlog.pop_front(),
        };
        let frame_id = match buffered {
            Some(id) => id,
            None => state.next_frame_id(),
        };
        state.grab_count += 1;
        let width = match state.registers.get(common::WIDTH) {
            Some(Register::Integer { value, .. }) => *value as u32,
            _ => state.camera.width,
        };
        let height = match state.registers.get(common::HEIGHT) {
            Some(Register::Integer { value, .. }) => *value as u32,
            _ => state.camera.height,
        };
        let camera = &state.camera;
        Ok(RawFrame::test_pattern(width, height, camera.pixel_format, camera.pattern)
            .with_frame_id(frame_id))
    }

    fn stop_grabbing(&mut self) -> Result<()> {
        lock(&self.state).stop();
        Ok(())
    }

    fn is_grabbing(&self) -> bool {
        lock(&self.state).grabbing.is_some()
    }
}

/// Shared view of a simulated device's state, for assertions.
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    pub fn is_grabbing(&self) -> bool {
        lock(&self.state).grabbing.is_some()
    }

    pub fn open_count(&self) -> usize {
        lock(&self.state).open_count
    }

    /// Frames delivered by `retrieve`.
    pub fn grab_count(&self) -> u64 {
        lock(&self.state).grab_count
    }

    pub fn last_strategy(&self) -> Option<GrabStrategy> {
        lock(&self.state).last_strategy
    }

    pub fn writes(&self) -> Vec<RegisterWrite> {
        lock(&self.state).writes.clone()
    }

    pub fn clear_writes(&self) {
        lock(&self.state).writes.clear();
    }

    /// Raw register value as stored, ignoring the emulated auto loops.
    pub fn stored_value(&self, name: &str) -> Option<String> {
        match lock(&self.state).registers.get(name)? {
            Register::Float { value, .. } => Some(value.to_string()),
            Register::Integer { value, .. } => Some(value.to_string()),
            Register::Enumeration { value, .. } => Some(value.clone()),
        }
    }

    pub fn push_fault(&self, fault: SimFault) {
        lock(&self.state).faults.push_back(fault);
    }
}
