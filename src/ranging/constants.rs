//! Register map and protocol constants for the ranging module

// Identification registers
pub const REG_WHO_AM_I: u8 = 0x00;
pub const REG_FIRMWARE_VER: u8 = 0x01;
pub const REG_HARDWARE_VER: u8 = 0x02;

/// Expected REG_WHO_AM_I value for a healthy module
pub const WHO_AM_I_VALUE: u8 = 0x43;

// Status and interrupt registers
pub const REG_INT_STATUS: u8 = 0x05; // read-to-clear latched interrupt flags
pub const REG_INT_MASK: u8 = 0x10;
pub const REG_INT_CONFIG: u8 = 0x11;

// Positioning configuration registers
pub const REG_POS_FILTER: u8 = 0x14;
pub const REG_POS_ALG: u8 = 0x16;
pub const REG_POS_NUM_ANCHORS: u8 = 0x17;
pub const REG_POS_INTERVAL: u8 = 0x18; // two bytes, 0 = on-demand only

// UWB radio configuration registers
pub const REG_UWB_CHANNEL: u8 = 0x1C;
pub const REG_UWB_RATES: u8 = 0x1D;

// Sensor configuration
pub const REG_SENSORS_MODE: u8 = 0x23;

// Position result blocks, 4 bytes little-endian each
pub const REG_POS_X: u8 = 0x30;
pub const REG_POS_Y: u8 = 0x34;
pub const REG_POS_Z: u8 = 0x38;

// Function registers
pub const FN_LED_CTRL: u8 = 0xB1;
pub const FN_TX_DATA: u8 = 0xB2; // stage outbound relay frame
pub const FN_TX_SEND: u8 = 0xB3; // dispatch staged frame over UWB
pub const FN_RX_DATA: u8 = 0xB4; // drain inbound relay reply
pub const FN_DO_POSITIONING: u8 = 0xB6;
pub const FN_FLASH_SAVE: u8 = 0xB9;
pub const FN_DEVICES_CALIBRATE: u8 = 0xC2;
pub const FN_DEVICES_CLEAR: u8 = 0xC3;
pub const FN_DEVICE_ADD: u8 = 0xC4;

// Interrupt status bits
pub const INT_STATUS_ERR: u8 = 0x01;
pub const INT_STATUS_POS: u8 = 0x02;
pub const INT_STATUS_RX_DATA: u8 = 0x08;

// Relay dispatch opcodes (third byte of the dispatch payload)
pub const RELAY_OP_READ: u8 = 0x02;
pub const RELAY_OP_WRITE: u8 = 0x04;
pub const RELAY_OP_CALL: u8 = 0x08;

// Positioning algorithm / dimension encoding (REG_POS_ALG: alg | dim << 4)
pub const ALG_UWB_ONLY: u8 = 0x00;
pub const DIM_2_5D: u8 = 0x01;
pub const DIM_2D: u8 = 0x02;

// Position filter encoding (REG_POS_FILTER: type | strength << 4)
pub const FILTER_MOVING_MEDIAN: u8 = 0x03;
pub const FILTER_MOVING_AVERAGE: u8 = 0x04;

// Anchor selection bit in REG_POS_NUM_ANCHORS
pub const ANCHOR_SEL_AUTO: u8 = 1 << 7;

// Flash-save request kinds (first payload byte of FN_FLASH_SAVE)
pub const FLASH_SAVE_REGISTERS: u8 = 0x01;
pub const FLASH_SAVE_DEVICE_LIST: u8 = 0x03;

// Position reply layout: one status byte, then the 4-byte LE value
pub const POS_REPLY_LEN: usize = 5;

// Timing constants
pub const MODULE_POWER_UP_DELAY_MS: u64 = 500;
pub const REMOTE_POWER_UP_DELAY_MS: u64 = 2500;
pub const DEVICE_ADD_SETTLE_MS: u64 = 150;
pub const FLASH_SAVE_SETTLE_MS: u64 = 300;
pub const CALIBRATION_MS_PER_MEASUREMENT: u64 = 500;
