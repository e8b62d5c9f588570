use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CameraError, Result};

/// Raw pixel layouts a camera can deliver, named after their GenICam `PixelFormat` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Mono8,
    Mono10,
    Mono12,
    Mono16,
    Rgb8,
    Bgr8,
    BayerRg8,
    BayerBg8,
    BayerGb8,
    BayerGr8,
    YCbCr422_8,
}

impl PixelFormat {
    /// Parse a GenICam enum entry.
    ///
    /// Both the SFNC names and the older `*Packed` spellings are accepted.
    pub fn from_genicam(name: &str) -> Option<Self> {
        use PixelFormat::*;
        match name {
            "Mono8" => Some(Mono8),
            "Mono10" => Some(Mono10),
            "Mono12" => Some(Mono12),
            "Mono16" => Some(Mono16),
            "RGB8" | "RGB8Packed" => Some(Rgb8),
            "BGR8" | "BGR8Packed" => Some(Bgr8),
            "BayerRG8" => Some(BayerRg8),
            "BayerBG8" => Some(BayerBg8),
            "BayerGB8" => Some(BayerGb8),
            "BayerGR8" => Some(BayerGr8),
            "YCbCr422_8" | "YUV422_8" | "YUV422Packed" => Some(YCbCr422_8),
            _ => None,
        }
    }

    /// GenICam enum entry in its SFNC spelling.
    pub fn as_genicam(&self) -> &'static str {
        use PixelFormat::*;
        match self {
            Mono8 => "Mono8",
            Mono10 => "Mono10",
            Mono12 => "Mono12",
            Mono16 => "Mono16",
            Rgb8 => "RGB8",
            Bgr8 => "BGR8",
            BayerRg8 => "BayerRG8",
            BayerBg8 => "BayerBG8",
            BayerGb8 => "BayerGB8",
            BayerGr8 => "BayerGR8",
            YCbCr422_8 => "YCbCr422_8",
        }
    }

    /// Bytes per pixel in the unpacked transport layout.
    pub fn bytes_per_pixel(&self) -> usize {
        use PixelFormat::*;
        match self {
            Mono8 | BayerRg8 | BayerBg8 | BayerGb8 | BayerGr8 => 1,
            Mono10 | Mono12 | Mono16 | YCbCr422_8 => 2,
            Rgb8 | Bgr8 => 3,
        }
    }

    /// Significant bits per sample for the mono formats, `None` otherwise.
    pub fn mono_bit_depth(&self) -> Option<u32> {
        match self {
            PixelFormat::Mono8 => Some(8),
            PixelFormat::Mono10 => Some(10),
            PixelFormat::Mono12 => Some(12),
            PixelFormat::Mono16 => Some(16),
            _ => None,
        }
    }

    /// Single-channel color filter array formats.
    pub fn is_bayer(&self) -> bool {
        matches!(
            self,
            PixelFormat::BayerRg8
                | PixelFormat::BayerBg8
                | PixelFormat::BayerGb8
                | PixelFormat::BayerGr8
        )
    }

    /// Color filter at `(x, y)` for Bayer formats: 0 = R, 1 = G, 2 = B.
    pub fn cfa_channel(&self, x: u32, y: u32) -> Option<usize> {
        // Filters of the 2x2 tile in order (0,0), (1,0), (0,1), (1,1).
        let tile: [usize; 4] = match self {
            PixelFormat::BayerRg8 => [0, 1, 1, 2],
            PixelFormat::BayerBg8 => [2, 1, 1, 0],
            PixelFormat::BayerGb8 => [1, 2, 0, 1],
            PixelFormat::BayerGr8 => [1, 0, 2, 1],
            _ => return None,
        };
        Some(tile[((y % 2) * 2 + x % 2) as usize])
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_genicam())
    }
}

impl FromStr for PixelFormat {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self> {
        PixelFormat::from_genicam(s)
            .ok_or_else(|| CameraError::UnsupportedPixelFormat(s.to_string()))
    }
}

/// State of a GenICam `*Auto` enumeration (`ExposureAuto`, `GainAuto`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoMode {
    Off,
    Once,
    Continuous,
}

impl AutoMode {
    /// GenICam enum entry, as written to `ExposureAuto` / `GainAuto`.
    pub fn as_genicam(&self) -> &'static str {
        match self {
            AutoMode::Off => "Off",
            AutoMode::Once => "Once",
            AutoMode::Continuous => "Continuous",
        }
    }

    /// Parse an enum entry read back from the device.
    pub fn from_genicam(name: &str) -> Option<Self> {
        match name {
            "Off" => Some(AutoMode::Off),
            "Once" => Some(AutoMode::Once),
            "Continuous" => Some(AutoMode::Continuous),
            _ => None,
        }
    }
}

impl fmt::Display for AutoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_genicam())
    }
}

/// Exposure request: the device's auto-exposure loop or a fixed time in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Exposure {
    Auto,
    Manual(f64),
}

impl Exposure {
    /// `0` selects auto exposure, anything else is a manual exposure of exactly that many
    /// microseconds.
    pub fn from_micros(us: f64) -> Self {
        if us == 0.0 { Exposure::Auto } else { Exposure::Manual(us) }
    }

    pub(crate) fn validate(self) -> Result<Self> {
        match self {
            Exposure::Manual(us) if !us.is_finite() || us < 0.0 => {
                Err(CameraError::InvalidValue { feature: "ExposureTime", value: us })
            }
            other => Ok(other),
        }
    }
}

impl Default for Exposure {
    fn default() -> Self {
        Exposure::Manual(30_000.0)
    }
}

/// Gain request: the device's auto-gain loop or a fixed value.
///
/// The value is in dB, or in raw units on cameras that only expose [`GainNode::Raw`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Gain {
    Auto,
    Manual(f64),
}

impl Gain {
    /// `0` selects auto gain, anything else is a manual gain of exactly that value.
    ///
    /// `Gain::Manual(0.0)` is still available through the typed API.
    pub fn from_db(db: f64) -> Self {
        if db == 0.0 { Gain::Auto } else { Gain::Manual(db) }
    }

    pub(crate) fn validate(self) -> Result<Self> {
        match self {
            Gain::Manual(db) if !db.is_finite() || db < 0.0 => {
                Err(CameraError::InvalidValue { feature: "Gain", value: db })
            }
            other => Ok(other),
        }
    }
}

impl Default for Gain {
    fn default() -> Self {
        Gain::Auto
    }
}

/// GenICam exposure feature names differ between camera generations.
///
/// `Standard` follows SFNC (USB3 Vision and newer GigE models), `Legacy` covers older GigE
/// models whose exposure time is a raw integer register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureNaming {
    Standard,
    Legacy,
}

impl FeatureNaming {
    /// Exposure time node, in microseconds.
    pub fn exposure_time(&self) -> &'static str {
        match self {
            FeatureNaming::Standard => "ExposureTime",
            FeatureNaming::Legacy => "ExposureTimeRaw",
        }
    }

    /// Upper bound node for the auto-exposure loop.
    pub fn exposure_upper_limit(&self) -> &'static str {
        match self {
            FeatureNaming::Standard => "AutoExposureTimeUpperLimit",
            FeatureNaming::Legacy => "AutoExposureTimeAbsUpperLimit",
        }
    }

    /// Legacy exposure registers are integers; the SFNC one is a float.
    pub fn uses_integer_registers(&self) -> bool {
        matches!(self, FeatureNaming::Legacy)
    }
}

/// Which gain register a camera exposes.
///
/// Detected independently of [`FeatureNaming`]: many older GigE models pair `ExposureTimeRaw`
/// with a float `Gain` node in dB. Only cameras without `Gain` fall back to `GainRaw`, an
/// integer in device-specific raw units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GainNode {
    Db,
    Raw,
}

impl GainNode {
    /// Gain value node.
    pub fn value(&self) -> &'static str {
        match self {
            GainNode::Db => "Gain",
            GainNode::Raw => "GainRaw",
        }
    }

    /// Upper bound node for the auto-gain loop.
    pub fn upper_limit(&self) -> &'static str {
        match self {
            GainNode::Db => "AutoGainUpperLimit",
            GainNode::Raw => "AutoGainRawUpperLimit",
        }
    }

    /// Unit label for printing: `dB` or `raw`.
    pub fn unit(&self) -> &'static str {
        match self {
            GainNode::Db => "dB",
            GainNode::Raw => "raw",
        }
    }
}

pub const EXPOSURE_AUTO: &str = "ExposureAuto";
pub const GAIN_AUTO: &str = "GainAuto";
pub const WIDTH: &str = "Width";
pub const HEIGHT: &str = "Height";
pub const PIXEL_FORMAT: &str = "PixelFormat";
