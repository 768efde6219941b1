//! Core types and the register-bus seam

pub mod bus;
pub mod types;

pub use bus::RegisterBus;
pub use types::{CalibrationSet, Coordinate, Device, DeviceRole, NetworkAddress};
