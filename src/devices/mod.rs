//! Bus and radio backends selected by configuration

pub mod mock;
pub mod serial;

use std::io::Write;

use crate::config::AppConfig;
use crate::core::RegisterBus;
use crate::error::{Error, Result};
use crate::sensors::{FixedLoadSensor, JitterLoadSensor, LoadSensor};
use mock::MockRangingBus;
use serial::SerialRegisterBus;

/// Create the register bus named by the `[hardware]` section.
pub fn create_bus(config: &AppConfig) -> Result<Box<dyn RegisterBus>> {
    match config.hardware.bus.as_str() {
        "serial" => {
            let bus = SerialRegisterBus::open(
                &config.hardware.bus_port,
                config.hardware.bus_baud,
                config.bus_timeout(),
            )?;
            Ok(Box::new(bus))
        }
        "mock" => {
            let mut bus = MockRangingBus::new().with_jitter(config.hardware.mock_jitter_mm);
            // start the simulated tag in the middle of the bay
            bus.set_remote_position(
                (config.bay.x_min_mm + config.bay.x_max_mm) / 2,
                (config.bay.y_min_mm + config.bay.y_max_mm) / 2,
            );
            Ok(Box::new(bus))
        }
        other => Err(Error::ConfigInvalid(format!("unknown bus type '{}'", other))),
    }
}

/// Create the telemetry radio sink named by the `[hardware]` section.
pub fn create_radio(config: &AppConfig) -> Result<Box<dyn Write + Send>> {
    match config.hardware.radio.as_str() {
        "serial" => {
            let port = serialport::new(&config.hardware.radio_port, config.hardware.radio_baud)
                .timeout(config.bus_timeout())
                .open()?;
            Ok(Box::new(port))
        }
        "stdout" => Ok(Box::new(std::io::stdout())),
        other => Err(Error::ConfigInvalid(format!(
            "unknown radio type '{}'",
            other
        ))),
    }
}

/// Create the load sensor matching the bus backend: jittered readings in
/// mock mode, the configured baseline otherwise.
pub fn create_load_sensor(config: &AppConfig) -> Box<dyn LoadSensor> {
    if config.hardware.bus == "mock" {
        Box::new(JitterLoadSensor::new(config.crane.load_baseline, 50))
    } else {
        Box::new(FixedLoadSensor::new(config.crane.load_baseline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_bus_selected_by_config() {
        let mut config = AppConfig::site_defaults();
        config.hardware.bus = "mock".to_string();
        assert!(create_bus(&config).is_ok());
    }

    #[test]
    fn test_unknown_bus_rejected() {
        let mut config = AppConfig::site_defaults();
        config.hardware.bus = "spi".to_string();
        assert!(matches!(create_bus(&config), Err(Error::ConfigInvalid(_))));
    }
}
