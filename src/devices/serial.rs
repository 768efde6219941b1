//! serialport-backed register transport
//!
//! Carries register transactions to the bridge in front of the ranging
//! module over a point-to-point UART. Frame format:
//!
//! request:  `[0xD5 0x5D] [LEN] [OP] [REG] [PAYLOAD] [CRC_H] [CRC_L]`
//! response: `[0xD5 0x5D] [LEN] [DATA] [CRC_H] [CRC_L]`
//!
//! `LEN` counts every byte after itself. The checksum covers `OP..PAYLOAD`
//! on requests and `DATA` on responses. A write's response data is a single
//! status byte. Transient line noise is absorbed by a short internal retry;
//! callers see only the final result.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;

use crate::core::RegisterBus;
use crate::error::{Error, Result};

const SYNC_BYTE_1: u8 = 0xD5;
const SYNC_BYTE_2: u8 = 0x5D;

const OP_WRITE: u8 = 0x01;
const OP_READ: u8 = 0x02;
const OP_CALL: u8 = 0x03;

/// Largest payload in one bus transaction (a staged relay frame)
const MAX_BUS_PAYLOAD: usize = 48;

/// sync(2) + len(1) + op(1) + reg(1) + payload + crc(2)
const MAX_FRAME: usize = MAX_BUS_PAYLOAD + 7;

/// Attempts per transaction before the error is surfaced
const TRANSACT_ATTEMPTS: u32 = 3;

/// 16-bit frame checksum: big-endian word sum, XOR of an odd trailing byte.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u16 = 0;
    let mut i = 0;
    while i + 1 < data.len() {
        let word = ((data[i] as u16) << 8) | (data[i + 1] as u16);
        sum = sum.wrapping_add(word);
        i += 2;
    }
    if i < data.len() {
        sum ^= data[i] as u16;
    }
    sum
}

/// Encode a request into `buf`, returning the frame length.
fn encode_request(buf: &mut [u8; MAX_FRAME], op: u8, register: u8, payload: &[u8]) -> Result<usize> {
    if payload.len() > MAX_BUS_PAYLOAD {
        return Err(Error::InvalidParameter(format!(
            "bus payload {} exceeds {} bytes",
            payload.len(),
            MAX_BUS_PAYLOAD
        )));
    }
    buf[0] = SYNC_BYTE_1;
    buf[1] = SYNC_BYTE_2;
    buf[2] = (payload.len() + 4) as u8; // op + reg + payload + crc
    buf[3] = op;
    buf[4] = register;
    buf[5..5 + payload.len()].copy_from_slice(payload);

    let crc = checksum(&buf[3..5 + payload.len()]);
    buf[5 + payload.len()] = (crc >> 8) as u8;
    buf[6 + payload.len()] = (crc & 0xFF) as u8;

    Ok(payload.len() + 7)
}

fn map_read_err(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Error::Timeout,
        _ => Error::Io(e),
    }
}

/// Register bus over a serial line.
pub struct SerialRegisterBus {
    port: Box<dyn SerialPort>,
}

impl SerialRegisterBus {
    /// Open the serial line with a bounded per-read timeout.
    pub fn open(path: &str, baud: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud).timeout(timeout).open()?;
        Ok(Self { port })
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.port.read_exact(buf).map_err(map_read_err)
    }

    /// Read one response frame; `out` must match the expected data length.
    fn read_reply(&mut self, out: &mut [u8]) -> Result<()> {
        let mut header = [0u8; 3];
        self.read_exact(&mut header)?;
        if header[0] != SYNC_BYTE_1 || header[1] != SYNC_BYTE_2 {
            return Err(Error::InvalidPacket(format!(
                "bad sync {:#04x} {:#04x}",
                header[0], header[1]
            )));
        }

        let frame_len = header[2] as usize;
        if frame_len < 2 + out.len() {
            return Err(Error::InvalidPacket(format!(
                "reply length {} short of {} data bytes",
                frame_len,
                out.len()
            )));
        }

        let data_len = frame_len - 2;
        let mut body = [0u8; MAX_FRAME];
        if data_len > MAX_FRAME - 2 {
            return Err(Error::InvalidPacket(format!("oversized reply {}", data_len)));
        }
        self.read_exact(&mut body[..data_len + 2])?;

        let expected = checksum(&body[..data_len]);
        let actual = ((body[data_len] as u16) << 8) | (body[data_len + 1] as u16);
        if expected != actual {
            return Err(Error::ChecksumError { expected, actual });
        }

        out.copy_from_slice(&body[..out.len()]);
        Ok(())
    }

    fn transact_once(&mut self, op: u8, register: u8, payload: &[u8], reply: &mut [u8]) -> Result<()> {
        let mut frame = [0u8; MAX_FRAME];
        let len = encode_request(&mut frame, op, register, payload)?;
        self.port.write_all(&frame[..len]).map_err(map_read_err)?;
        self.read_reply(reply)
    }

    fn transact(&mut self, op: u8, register: u8, payload: &[u8], reply: &mut [u8]) -> Result<()> {
        let mut last = None;
        for attempt in 0..TRANSACT_ATTEMPTS {
            match self.transact_once(op, register, payload, reply) {
                Ok(()) => return Ok(()),
                // line noise and contention are worth one more try
                Err(e @ Error::Timeout) | Err(e @ Error::ChecksumError { .. }) => {
                    log::debug!("bus transaction attempt {} failed: {}", attempt + 1, e);
                    let _ = self.port.clear(serialport::ClearBuffer::Input);
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or(Error::Timeout))
    }
}

impl RegisterBus for SerialRegisterBus {
    fn write(&mut self, register: u8, data: &[u8]) -> Result<()> {
        let mut status = [0u8; 1];
        self.transact(OP_WRITE, register, data, &mut status)?;
        if status[0] == 0 {
            return Err(Error::InvalidPacket(format!(
                "register write {:#04x} refused",
                register
            )));
        }
        Ok(())
    }

    fn read(&mut self, register: u8, out: &mut [u8]) -> Result<()> {
        self.transact(OP_READ, register, &[out.len() as u8], out)
    }

    fn call(&mut self, register: u8, params: &[u8], reply: &mut [u8]) -> Result<()> {
        self.transact(OP_CALL, register, params, reply)
    }
}
