//! Shared data types for the ranging network
//!
//! Wire layouts match the ranging module's register conventions: all
//! multi-byte integers little-endian, device records packed to 15 bytes.

use serde::{Deserialize, Serialize};

/// 16-bit identifier, unique per device on the ranging network.
pub type NetworkAddress = u16;

/// Whether a device is a fixed reference point or the mobile unit being solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    Anchor,
    Tag,
}

impl DeviceRole {
    /// Role flag byte in the device record wire format
    pub fn flag(self) -> u8 {
        match self {
            DeviceRole::Anchor => 0x01,
            DeviceRole::Tag => 0x00,
        }
    }
}

/// Position in millimeters. The system operates in 2.5-D: z is supplied
/// per anchor and never solved for the tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coordinate {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Wire size of a packed device record
pub const DEVICE_RECORD_LEN: usize = 15;

/// One entry in a module's device list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Device {
    pub address: NetworkAddress,
    pub role: DeviceRole,
    pub position: Coordinate,
}

impl Device {
    pub fn anchor(address: NetworkAddress, x: i32, y: i32, z: i32) -> Self {
        Self {
            address,
            role: DeviceRole::Anchor,
            position: Coordinate::new(x, y, z),
        }
    }

    pub fn tag(address: NetworkAddress) -> Self {
        Self {
            address,
            role: DeviceRole::Tag,
            position: Coordinate::default(),
        }
    }

    /// Pack into the 15-byte record the device-add function expects:
    /// address(2 LE), role flag(1), x/y/z(4 LE each).
    pub fn to_record(&self) -> [u8; DEVICE_RECORD_LEN] {
        let mut rec = [0u8; DEVICE_RECORD_LEN];
        rec[0..2].copy_from_slice(&self.address.to_le_bytes());
        rec[2] = self.role.flag();
        rec[3..7].copy_from_slice(&self.position.x.to_le_bytes());
        rec[7..11].copy_from_slice(&self.position.y.to_le_bytes());
        rec[11..15].copy_from_slice(&self.position.z.to_le_bytes());
        rec
    }
}

/// Ordered anchor set for the module's built-in auto-calibration:
/// origin, x-axis, y-axis, then one optional extra anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationSet {
    pub origin: NetworkAddress,
    pub x_axis: NetworkAddress,
    pub y_axis: NetworkAddress,
    pub extra: NetworkAddress,
}

impl CalibrationSet {
    /// Pack into the calibrate-function payload: dimension byte,
    /// measurement count, then the four anchor addresses (LE).
    pub fn to_request(&self, dimension: u8, measurements: u8) -> [u8; 10] {
        let mut req = [0u8; 10];
        req[0] = dimension;
        req[1] = measurements;
        req[2..4].copy_from_slice(&self.origin.to_le_bytes());
        req[4..6].copy_from_slice(&self.x_axis.to_le_bytes());
        req[6..8].copy_from_slice(&self.y_axis.to_le_bytes());
        req[8..10].copy_from_slice(&self.extra.to_le_bytes());
        req
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_record_layout() {
        let dev = Device::anchor(0x1172, 100, 21860, 5000);
        let rec = dev.to_record();

        assert_eq!(rec[0], 0x72);
        assert_eq!(rec[1], 0x11);
        assert_eq!(rec[2], 0x01); // anchor flag
        assert_eq!(i32::from_le_bytes(rec[3..7].try_into().unwrap()), 100);
        assert_eq!(i32::from_le_bytes(rec[7..11].try_into().unwrap()), 21860);
        assert_eq!(i32::from_le_bytes(rec[11..15].try_into().unwrap()), 5000);
    }

    #[test]
    fn test_tag_record_flag_and_zero_position() {
        let rec = Device::tag(0x6875).to_record();
        assert_eq!(rec[2], 0x00);
        assert!(rec[3..15].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_calibration_request_layout() {
        let set = CalibrationSet {
            origin: 0x1172,
            x_axis: 0x1114,
            y_axis: 0x1103,
            extra: 0x1131,
        };
        let req = set.to_request(0x01, 10);
        assert_eq!(req[0], 0x01);
        assert_eq!(req[1], 10);
        assert_eq!(u16::from_le_bytes(req[2..4].try_into().unwrap()), 0x1172);
        assert_eq!(u16::from_le_bytes(req[8..10].try_into().unwrap()), 0x1131);
    }
}
