//! Local-module register operations
//!
//! Direct bus access to the attached module: bring-up, device-list
//! maintenance, on-demand positioning and flash persistence. The remote
//! counterparts of these operations live in `provisioning.rs` and go through
//! the relay protocol instead.

use std::thread;
use std::time::Duration;

use log::debug;

use super::constants::*;
use super::RangingModule;
use crate::core::{Coordinate, Device, RegisterBus};
use crate::error::{Error, Result};

/// Positioning configuration applied to both the local and remote modules.
#[derive(Debug, Clone, Copy)]
pub struct ModuleSettings {
    /// Dimension encoding for the algorithm register (2-D or 2.5-D)
    pub dimension: u8,
    /// Position filter type
    pub filter_type: u8,
    /// Position filter strength (number of samples averaged)
    pub filter_strength: u8,
    /// UWB channel number
    pub uwb_channel: u8,
    /// Bitrate / PRF encoding for the UWB rates register
    pub uwb_rates: u8,
    /// Number of anchors used per fix
    pub anchor_count: u8,
}

impl ModuleSettings {
    /// Algorithm register byte: UWB-only solver with the configured dimension.
    pub fn algorithm_byte(&self) -> u8 {
        ALG_UWB_ONLY | (self.dimension << 4)
    }

    /// Filter register byte: type in the low nibble, strength in the high.
    pub fn filter_byte(&self) -> u8 {
        self.filter_type | (self.filter_strength << 4)
    }

    /// Anchor-count register byte with automatic anchor selection enabled.
    pub fn anchor_count_byte(&self) -> u8 {
        ANCHOR_SEL_AUTO | self.anchor_count
    }
}

impl<B: RegisterBus> RangingModule<B> {
    /// Verify the module identifies itself and its version registers read.
    pub fn check_status_registers(&mut self) -> Result<()> {
        let mut id = [0u8; 1];
        self.bus.read(REG_WHO_AM_I, &mut id)?;
        if id[0] != WHO_AM_I_VALUE {
            return Err(Error::InvalidPacket(format!(
                "module id {:#04x}, expected {:#04x}",
                id[0], WHO_AM_I_VALUE
            )));
        }

        let mut ver = [0u8; 1];
        self.bus.read(REG_FIRMWARE_VER, &mut ver)?;
        debug!("module firmware {:#04x}", ver[0]);
        self.bus.read(REG_HARDWARE_VER, &mut ver)?;
        debug!("module hardware {:#04x}", ver[0]);

        Ok(())
    }

    /// Bring up the local module: identity check, empty device list,
    /// interrupt routing, on-demand positioning, solver and radio settings.
    pub fn init_local_module(&mut self, settings: &ModuleSettings) -> Result<()> {
        thread::sleep(Duration::from_millis(MODULE_POWER_UP_DELAY_MS));

        self.check_status_registers()?;

        let mut ack = [0u8; 1];
        self.bus.call(FN_DEVICES_CLEAR, &[], &mut ack)?;

        // interrupt pin: pin 1, push-pull, latched, active high
        self.bus
            .write(REG_INT_CONFIG, &[0x01 | (1 << 4) | (1 << 5)])?;
        // raise on error, position ready and inbound data
        self.bus
            .write(REG_INT_MASK, &[INT_STATUS_ERR | INT_STATUS_POS | INT_STATUS_RX_DATA])?;

        // continuous positioning off, fixes are requested per cycle
        self.bus.write(REG_POS_INTERVAL, &[0x00, 0x00])?;

        self.bus.write(REG_POS_ALG, &[settings.algorithm_byte()])?;
        self.bus.write(REG_SENSORS_MODE, &[0x00])?;
        self.bus.write(REG_POS_FILTER, &[settings.filter_byte()])?;

        self.bus.write(REG_UWB_CHANNEL, &[settings.uwb_channel])?;
        self.bus.write(REG_UWB_RATES, &[settings.uwb_rates])?;

        Ok(())
    }

    /// Add a device record to the local module's list.
    pub fn add_local_device(&mut self, device: &Device) -> Result<()> {
        let mut ack = [0u8; 1];
        self.bus.call(FN_DEVICE_ADD, &device.to_record(), &mut ack)?;
        thread::sleep(Duration::from_millis(DEVICE_ADD_SETTLE_MS));
        Ok(())
    }

    /// Set the number of anchors the local module uses per fix.
    pub fn set_local_anchor_count(&mut self, settings: &ModuleSettings) -> Result<()> {
        self.bus
            .write(REG_POS_NUM_ANCHORS, &[settings.anchor_count_byte()])
    }

    /// Request a fix from the local module itself.
    pub fn request_local_positioning(&mut self) -> Result<()> {
        self.clear_interrupt_status()?;
        let mut ack = [0u8; 1];
        self.bus.call(FN_DO_POSITIONING, &[], &mut ack)?;
        Ok(())
    }

    /// Read the local position result registers (4-byte LE blocks).
    pub fn read_local_position(&mut self) -> Result<Coordinate> {
        let mut x = [0u8; 4];
        let mut y = [0u8; 4];
        let mut z = [0u8; 4];
        self.bus.read(REG_POS_X, &mut x)?;
        self.bus.read(REG_POS_Y, &mut y)?;
        self.bus.read(REG_POS_Z, &mut z)?;
        Ok(Coordinate::new(
            i32::from_le_bytes(x),
            i32::from_le_bytes(y),
            i32::from_le_bytes(z),
        ))
    }

    /// Persist one writable register of the local module to flash.
    pub fn flash_local_register(&mut self, register: u8) -> Result<()> {
        let mut ack = [0u8; 1];
        self.bus
            .call(FN_FLASH_SAVE, &[FLASH_SAVE_REGISTERS, register], &mut ack)?;
        thread::sleep(Duration::from_millis(FLASH_SAVE_SETTLE_MS));
        Ok(())
    }

    /// Persist the local module's device list to flash.
    pub fn save_local_device_list(&mut self) -> Result<()> {
        let mut ack = [0u8; 1];
        self.bus
            .call(FN_FLASH_SAVE, &[FLASH_SAVE_DEVICE_LIST], &mut ack)?;
        thread::sleep(Duration::from_millis(FLASH_SAVE_SETTLE_MS));
        Ok(())
    }

    /// Override one of the module's indicator LEDs.
    pub fn set_led(&mut self, led: u8, on: bool) -> Result<()> {
        let bit = 1u8 << (led.saturating_sub(1));
        let value = if on { (bit << 4) | bit } else { bit << 4 };
        let mut ack = [0u8; 1];
        self.bus.call(FN_LED_CTRL, &[value], &mut ack)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::mock::MockRangingBus;
    use crate::ranging::DrainPolicy;

    fn settings() -> ModuleSettings {
        ModuleSettings {
            dimension: DIM_2_5D,
            filter_type: FILTER_MOVING_AVERAGE,
            filter_strength: 10,
            uwb_channel: 5,
            uwb_rates: 0x02 << 6,
            anchor_count: 8,
        }
    }

    #[test]
    fn test_settings_register_bytes() {
        let s = settings();
        assert_eq!(s.algorithm_byte(), 0x10);
        assert_eq!(s.filter_byte(), 0xA4);
        assert_eq!(s.anchor_count_byte(), 0x88);
    }

    #[test]
    fn test_add_local_device_sends_record() {
        let mut module = RangingModule::new(MockRangingBus::new(), DrainPolicy::default());
        let dev = Device::anchor(0x1172, 100, 100, 5000);
        module.add_local_device(&dev).unwrap();

        assert_eq!(module.bus_mut().local_device_count(), 1);
    }

    #[test]
    fn test_read_local_position_parses_le_blocks() {
        let mut module = RangingModule::new(MockRangingBus::new(), DrainPolicy::default());
        module
            .bus_mut()
            .write(REG_POS_X, &(-750i32).to_le_bytes())
            .unwrap();
        module
            .bus_mut()
            .write(REG_POS_Y, &30500i32.to_le_bytes())
            .unwrap();

        let pos = module.read_local_position().unwrap();
        assert_eq!(pos.x, -750);
        assert_eq!(pos.y, 30500);
        assert_eq!(pos.z, 0);
    }
}
