//! Configuration for the cranetrack daemon
//!
//! Loads configuration from a TOML file: serial links, bay geometry, sample
//! acceptance thresholds, zone split and the full anchor/tag roster. Nothing
//! the control loop compares against is hardcoded in the core.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Device, DeviceRole, NetworkAddress};
use crate::error::{Error, Result};
use crate::ranging::constants::{DIM_2_5D, FILTER_MOVING_AVERAGE};
use crate::ranging::local::ModuleSettings;
use crate::ranging::DrainPolicy;
use crate::tracking::runner::LoopSettings;
use crate::tracking::state::{BayExtent, MotionPolicy};
use crate::tracking::zones::ZonePlan;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub hardware: HardwareConfig,
    pub crane: CraneConfig,
    pub tracking: TrackingConfig,
    pub bay: BayConfig,
    pub zones: ZoneConfig,
    pub ranging: RangingConfig,
    pub logging: LoggingConfig,
    pub devices: Vec<DeviceEntry>,
}

/// Hardware links: ranging-module bus and telemetry radio
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HardwareConfig {
    /// Bus backend: `serial` or `mock`
    pub bus: String,
    /// Ranging module serial port
    pub bus_port: String,
    pub bus_baud: u32,
    /// Per-transaction bus timeout
    pub bus_timeout_ms: u64,
    /// Radio backend: `serial` or `stdout`
    pub radio: String,
    /// Telemetry radio serial port
    pub radio_port: String,
    pub radio_baud: u32,
    /// Fix jitter applied by the mock bus, millimeters per axis
    #[serde(default)]
    pub mock_jitter_mm: i32,
}

/// Crane identity and load gauge
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CraneConfig {
    /// Id carried in every telemetry frame
    pub id: u8,
    /// Raw gauge reading used when no gauge is fitted
    #[serde(default)]
    pub load_baseline: u32,
}

/// Sampling cadence and acceptance thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackingConfig {
    /// Minimum time between position requests
    pub sample_period_ms: u64,
    /// Per-axis delta below which the crane counts as stationary
    pub stationary_threshold_mm: i32,
    /// Upper bound of the minor-movement band that still counts as stationary
    pub minor_movement_threshold_mm: i32,
    /// Largest credible travel per elapsed read interval
    pub max_travel_per_read_mm: i32,
    /// Stationary reads before telemetry drops to heartbeats
    pub stationary_cap: u8,
    /// Wait between the positioning command and the result reads
    pub position_settle_ms: u64,
}

/// Bay rectangle, millimeters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BayConfig {
    pub x_min_mm: i32,
    pub x_max_mm: i32,
    pub y_min_mm: i32,
    pub y_max_mm: i32,
    /// Slack beyond the rectangle before a fix is rejected
    pub boundary_tolerance_mm: i32,
}

/// Anchor-zone split
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ZoneConfig {
    /// Tracked volume splits into two anchor sets at this y coordinate
    pub split_y_mm: i32,
}

/// Ranging module settings pushed during provisioning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RangingConfig {
    /// Moving-average filter strength
    pub filter_strength: u8,
    pub uwb_channel: u8,
    /// Anchors used per fix
    pub anchor_count: u8,
    /// Reply-poll budget for relay drains
    pub drain_poll_attempts: u32,
    pub drain_poll_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

/// One roster entry: an anchor with its surveyed position, or the tag
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceEntry {
    pub address: NetworkAddress,
    pub role: DeviceRole,
    #[serde(default)]
    pub x_mm: i32,
    #[serde(default)]
    pub y_mm: i32,
    #[serde(default)]
    pub z_mm: i32,
}

impl DeviceEntry {
    pub fn to_device(&self) -> Device {
        Device {
            address: self.address,
            role: self.role,
            position: crate::core::Coordinate::new(self.x_mm, self.y_mm, self.z_mm),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| Error::ConfigInvalid(e.to_string()))?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Configuration of the commissioned bay. Suitable for testing and as a
    /// template; deployments should load a proper TOML file.
    pub fn site_defaults() -> Self {
        Self {
            hardware: HardwareConfig {
                bus: "serial".to_string(),
                bus_port: "/dev/ttyS1".to_string(),
                bus_baud: 115200,
                bus_timeout_ms: 50,
                radio: "serial".to_string(),
                radio_port: "/dev/ttyS2".to_string(),
                radio_baud: 38400,
                mock_jitter_mm: 0,
            },
            crane: CraneConfig {
                id: 3,
                load_baseline: 1000,
            },
            tracking: TrackingConfig {
                sample_period_ms: 200,
                stationary_threshold_mm: 350,
                minor_movement_threshold_mm: 400,
                max_travel_per_read_mm: 2000,
                stationary_cap: 200,
                position_settle_ms: 70,
            },
            bay: BayConfig {
                x_min_mm: 0,
                x_max_mm: 21860,
                y_min_mm: 0,
                y_max_mm: 45600,
                boundary_tolerance_mm: 1500,
            },
            zones: ZoneConfig { split_y_mm: 30400 },
            ranging: RangingConfig {
                filter_strength: 10,
                uwb_channel: 5,
                anchor_count: 8,
                drain_poll_attempts: 100,
                drain_poll_interval_ms: 2,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            devices: vec![
                DeviceEntry { address: 0x1172, role: DeviceRole::Anchor, x_mm: 100, y_mm: 100, z_mm: 5000 },
                DeviceEntry { address: 0x1114, role: DeviceRole::Anchor, x_mm: 21860, y_mm: 0, z_mm: 5000 },
                DeviceEntry { address: 0x1103, role: DeviceRole::Anchor, x_mm: 0, y_mm: 15200, z_mm: 5000 },
                DeviceEntry { address: 0x1131, role: DeviceRole::Anchor, x_mm: 21860, y_mm: 15200, z_mm: 5000 },
                DeviceEntry { address: 0x6830, role: DeviceRole::Anchor, x_mm: 0, y_mm: 30400, z_mm: 5000 },
                DeviceEntry { address: 0x1152, role: DeviceRole::Anchor, x_mm: 21860, y_mm: 30400, z_mm: 5000 },
                DeviceEntry { address: 0x6846, role: DeviceRole::Anchor, x_mm: 0, y_mm: 45600, z_mm: 5000 },
                DeviceEntry { address: 0x6842, role: DeviceRole::Anchor, x_mm: 21860, y_mm: 45600, z_mm: 5000 },
                DeviceEntry { address: 0x6875, role: DeviceRole::Tag, x_mm: 0, y_mm: 0, z_mm: 0 },
            ],
        }
    }

    /// Reject configurations the daemon cannot run with.
    pub fn validate(&self) -> Result<()> {
        let mut addresses: Vec<NetworkAddress> = self.devices.iter().map(|d| d.address).collect();
        addresses.sort_unstable();
        addresses.dedup();
        if addresses.len() != self.devices.len() {
            return Err(Error::ConfigInvalid(
                "device addresses must be unique".to_string(),
            ));
        }

        let tags = self
            .devices
            .iter()
            .filter(|d| d.role == DeviceRole::Tag)
            .count();
        if tags != 1 {
            return Err(Error::ConfigInvalid(format!(
                "exactly one tag expected, found {}",
                tags
            )));
        }

        if self.tracking.stationary_threshold_mm > self.tracking.minor_movement_threshold_mm {
            return Err(Error::ConfigInvalid(
                "stationary threshold exceeds minor-movement threshold".to_string(),
            ));
        }

        if self.tracking.sample_period_ms == 0 {
            return Err(Error::ConfigInvalid("sample period must be non-zero".to_string()));
        }

        // zone plan construction checks the anchor count
        self.zone_plan().map(|_| ())
    }

    /// Anchors in roster order.
    pub fn anchors(&self) -> Vec<Device> {
        self.devices
            .iter()
            .filter(|d| d.role == DeviceRole::Anchor)
            .map(DeviceEntry::to_device)
            .collect()
    }

    /// Every roster device, anchors first as listed.
    pub fn roster(&self) -> Vec<Device> {
        self.devices.iter().map(DeviceEntry::to_device).collect()
    }

    /// Network address of the tracked tag.
    pub fn tag_address(&self) -> Result<NetworkAddress> {
        self.devices
            .iter()
            .find(|d| d.role == DeviceRole::Tag)
            .map(|d| d.address)
            .ok_or_else(|| Error::ConfigInvalid("no tag in roster".to_string()))
    }

    pub fn motion_policy(&self) -> MotionPolicy {
        MotionPolicy {
            stationary_mm: self.tracking.stationary_threshold_mm,
            minor_movement_mm: self.tracking.minor_movement_threshold_mm,
            max_travel_per_read_mm: self.tracking.max_travel_per_read_mm,
            stationary_cap: self.tracking.stationary_cap,
            bay: BayExtent {
                x_min: self.bay.x_min_mm,
                x_max: self.bay.x_max_mm,
                y_min: self.bay.y_min_mm,
                y_max: self.bay.y_max_mm,
            },
            boundary_tolerance_mm: self.bay.boundary_tolerance_mm,
        }
    }

    pub fn module_settings(&self) -> ModuleSettings {
        ModuleSettings {
            dimension: DIM_2_5D,
            filter_type: FILTER_MOVING_AVERAGE,
            filter_strength: self.ranging.filter_strength,
            uwb_channel: self.ranging.uwb_channel,
            // 110 kbit/s with a 64 MHz pulse repetition frequency
            uwb_rates: 0x02 << 6,
            anchor_count: self.ranging.anchor_count,
        }
    }

    pub fn zone_plan(&self) -> Result<ZonePlan> {
        ZonePlan::from_anchor_roster(self.zones.split_y_mm, &self.anchors())
    }

    pub fn drain_policy(&self) -> DrainPolicy {
        DrainPolicy {
            attempts: self.ranging.drain_poll_attempts,
            poll_interval: Duration::from_millis(self.ranging.drain_poll_interval_ms),
        }
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            sample_period: Duration::from_millis(self.tracking.sample_period_ms),
            position_settle: Duration::from_millis(self.tracking.position_settle_ms),
            crane_id: self.crane.id,
        }
    }

    pub fn bus_timeout(&self) -> Duration {
        Duration::from_millis(self.hardware.bus_timeout_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::site_defaults()
    }
}
