//! Enumeration entries for attached cameras

use std::fmt;

use serde::{Deserialize, Serialize};

/// Description of one enumerated camera, copied out of the transport layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Position in the enumeration order
    pub index: usize,
    pub friendly_name: String,
    pub model_name: String,
    pub serial_number: String,
    pub vendor_name: String,
    /// Transport layer class, e.g. `BaslerUsb` or `BaslerGigE`
    pub device_class: String,
}

impl DeviceInfo {
    pub fn new(
        index: usize,
        model_name: impl Into<String>,
        serial_number: impl Into<String>,
    ) -> Self {
        let model_name = model_name.into();
        let serial_number = serial_number.into();
        DeviceInfo {
            index,
            friendly_name: format!("{model_name} ({serial_number})"),
            model_name,
            serial_number,
            vendor_name: "Basler".to_string(),
            device_class: String::new(),
        }
    }

    pub fn with_device_class(mut self, class: impl Into<String>) -> Self {
        self.device_class = class.into();
        self
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.friendly_name.is_empty() {
            write!(f, "#{} {} [{}]", self.index, self.model_name, self.serial_number)
        } else {
            write!(f, "#{} {} [{}]", self.index, self.friendly_name, self.serial_number)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_builds_a_friendly_name() {
        let info = DeviceInfo::new(1, "acA1920-40uc", "22334455").with_device_class("BaslerUsb");
        assert_eq!(info.friendly_name, "acA1920-40uc (22334455)");
        assert_eq!(info.to_string(), "#1 acA1920-40uc (22334455) [22334455]");
    }

    #[test]
    fn serializes_for_listings() {
        let info = DeviceInfo::new(0, "a2A1920-51gc", "40112233");
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["serial_number"], "40112233");
        assert_eq!(json["vendor_name"], "Basler");
    }
}
