//! Remote device registry and provisioning
//!
//! Everything here executes on a *remote* module through the relay protocol:
//! device-list maintenance, positioning configuration with flash persistence,
//! and the anchor-set reassignment used when the tag crosses a zone boundary.
//!
//! Reassignment is clear-then-add with no rollback: a rejection midway leaves
//! the remote registry partially populated. Clear-then-add is idempotent per
//! device, so the recovery path is simply to run the reassignment again.

use std::thread;
use std::time::Duration;

use log::{info, warn};

use super::constants::*;
use super::local::ModuleSettings;
use super::RangingModule;
use crate::core::{CalibrationSet, Device, NetworkAddress, RegisterBus};
use crate::error::{Error, Result};

/// Reply length for registry calls: two status bytes.
const STATUS_REPLY_LEN: usize = 2;

impl<B: RegisterBus> RangingModule<B> {
    /// Clear the device list on the remote module at `target`.
    ///
    /// The reply's second status byte must equal 1; anything else means the
    /// remote refused and the registry state is indeterminate.
    pub fn clear_remote_devices(&mut self, target: NetworkAddress) -> Result<()> {
        let mut reply = [0u8; STATUS_REPLY_LEN];
        self.remote_call_then_read(target, FN_DEVICES_CLEAR, &[], &mut reply)?;
        if reply[1] != 0x01 {
            return Err(Error::DeviceRejected("device-list clear"));
        }
        Ok(())
    }

    /// Add one device record to the remote module's list.
    pub fn add_remote_device(&mut self, target: NetworkAddress, device: &Device) -> Result<()> {
        let mut reply = [0u8; STATUS_REPLY_LEN];
        self.remote_call_then_read(target, FN_DEVICE_ADD, &device.to_record(), &mut reply)?;
        if reply[0] != 0x01 && reply[1] != 0x01 {
            return Err(Error::DeviceRejected("device add"));
        }
        Ok(())
    }

    /// Write one configuration byte to a remote register and check the
    /// acknowledgement status.
    fn write_remote_config(
        &mut self,
        target: NetworkAddress,
        register: u8,
        value: u8,
        what: &'static str,
    ) -> Result<()> {
        let mut reply = [0u8; STATUS_REPLY_LEN];
        self.remote_write_then_read(target, register, &[value], &mut reply)?;
        if reply[0] == 0x00 {
            return Err(Error::DeviceRejected(what));
        }
        Ok(())
    }

    /// Persist one writable register of the remote module to flash.
    pub fn flash_remote_register(&mut self, target: NetworkAddress, register: u8) -> Result<()> {
        let mut reply = [0u8; STATUS_REPLY_LEN];
        self.remote_call_then_read(
            target,
            FN_FLASH_SAVE,
            &[FLASH_SAVE_REGISTERS, register],
            &mut reply,
        )?;
        thread::sleep(Duration::from_millis(FLASH_SAVE_SETTLE_MS));
        Ok(())
    }

    /// Persist the remote module's device list to flash.
    pub fn save_remote_device_list(&mut self, target: NetworkAddress) -> Result<()> {
        let mut reply = [0u8; STATUS_REPLY_LEN];
        self.remote_call_then_read(target, FN_FLASH_SAVE, &[FLASH_SAVE_DEVICE_LIST], &mut reply)?;
        thread::sleep(Duration::from_millis(FLASH_SAVE_SETTLE_MS));
        Ok(())
    }

    /// Select the positioning algorithm on the remote module and persist it.
    pub fn set_remote_algorithm(
        &mut self,
        target: NetworkAddress,
        settings: &ModuleSettings,
    ) -> Result<()> {
        self.write_remote_config(target, REG_POS_ALG, settings.algorithm_byte(), "algorithm")?;
        self.flash_remote_register(target, REG_POS_ALG)
    }

    /// Disable the remote module's on-board sensors and persist the setting.
    pub fn set_remote_sensor_mode(&mut self, target: NetworkAddress) -> Result<()> {
        self.write_remote_config(target, REG_SENSORS_MODE, 0x00, "sensor mode")?;
        self.flash_remote_register(target, REG_SENSORS_MODE)
    }

    /// Configure the remote position filter and persist it.
    pub fn set_remote_filter_strength(
        &mut self,
        target: NetworkAddress,
        settings: &ModuleSettings,
    ) -> Result<()> {
        self.write_remote_config(target, REG_POS_FILTER, settings.filter_byte(), "filter")?;
        self.flash_remote_register(target, REG_POS_FILTER)
    }

    /// Set the remote per-fix anchor count and persist it.
    pub fn set_remote_anchor_count(
        &mut self,
        target: NetworkAddress,
        settings: &ModuleSettings,
    ) -> Result<()> {
        self.write_remote_config(
            target,
            REG_POS_NUM_ANCHORS,
            settings.anchor_count_byte(),
            "anchor count",
        )?;
        self.flash_remote_register(target, REG_POS_NUM_ANCHORS)
    }

    /// Run the remote module's built-in anchor auto-calibration and wait for
    /// it to finish (the module needs roughly 500 ms per measurement).
    pub fn calibrate_remote(
        &mut self,
        target: NetworkAddress,
        anchors: &CalibrationSet,
        dimension: u8,
        measurements: u8,
    ) -> Result<()> {
        let mut reply = [0u8; STATUS_REPLY_LEN];
        self.remote_call_then_read(
            target,
            FN_DEVICES_CALIBRATE,
            &anchors.to_request(dimension, measurements),
            &mut reply,
        )?;
        thread::sleep(Duration::from_millis(
            measurements as u64 * CALIBRATION_MS_PER_MEASUREMENT,
        ));
        Ok(())
    }

    /// Bring up a remote tag: empty device list, solver configuration and
    /// flash persistence so the settings survive a power cycle.
    pub fn init_remote_tag(
        &mut self,
        target: NetworkAddress,
        settings: &ModuleSettings,
    ) -> Result<()> {
        thread::sleep(Duration::from_millis(REMOTE_POWER_UP_DELAY_MS));

        self.clear_remote_devices(target)?;
        self.set_remote_algorithm(target, settings)?;
        self.set_remote_sensor_mode(target)?;
        self.set_remote_filter_strength(target, settings)?;

        info!("remote tag {:#06x} initialised", target);
        Ok(())
    }

    /// Replace the remote module's anchor set wholesale.
    ///
    /// The clear must succeed before any device is added. Adds then run in
    /// order, failing fast on the first rejection with no rollback; the
    /// caller recovers by retrying the whole reassignment.
    pub fn reassign_anchor_set(
        &mut self,
        target: NetworkAddress,
        anchors: &[Device; 6],
    ) -> Result<()> {
        self.clear_remote_devices(target)?;

        for (i, anchor) in anchors.iter().enumerate() {
            if let Err(e) = self.add_remote_device(target, anchor) {
                warn!(
                    "anchor reassignment aborted at device {} of 6 ({:#06x}): {}",
                    i + 1,
                    anchor.address,
                    e
                );
                return Err(e);
            }
        }

        Ok(())
    }
}
