//! Radio telemetry framing
//!
//! Frame format expected by the gateway: a 4-byte header (marker byte,
//! payload length, two reserved bytes) followed by an ASCII payload.
//!
//! Payloads:
//! - full report: `i<id> m<mass> x<x> y<y>\r\n`
//! - stationary heartbeat: `i<id> k\r\n`

use std::io::Write;

use crate::core::Coordinate;
use crate::error::{Error, Result};

/// First byte of every radio frame
pub const FRAME_MARKER: u8 = 0xFD;

/// Reserved header bytes
pub const FRAME_RESERVED: [u8; 2] = [0xFF, 0xFF];

/// Header length: marker + length + reserved
pub const FRAME_HEADER_LEN: usize = 4;

/// Framer over any byte sink (radio UART in production, a buffer in tests).
pub struct RadioLink<W: Write> {
    out: W,
}

impl<W: Write> RadioLink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn send_frame(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > u8::MAX as usize {
            return Err(Error::InvalidParameter(format!(
                "telemetry payload {} exceeds one frame",
                payload.len()
            )));
        }
        let header = [
            FRAME_MARKER,
            payload.len() as u8,
            FRAME_RESERVED[0],
            FRAME_RESERVED[1],
        ];
        self.out.write_all(&header)?;
        self.out.write_all(payload)?;
        self.out.flush()?;
        Ok(())
    }

    /// Full telemetry: position, load-gauge reading and crane id.
    pub fn send_position(&mut self, position: &Coordinate, mass: u32, crane_id: u8) -> Result<()> {
        let payload = format!(
            "i{} m{} x{} y{}\r\n",
            crane_id, mass, position.x, position.y
        );
        self.send_frame(payload.as_bytes())
    }

    /// Lightweight heartbeat sent while the crane is stationary.
    pub fn send_heartbeat(&mut self, crane_id: u8) -> Result<()> {
        let payload = format!("i{} k\r\n", crane_id);
        self.send_frame(payload.as_bytes())
    }

    /// Arbitrary payload with the standard header (startup markers etc.).
    pub fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.send_frame(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_frame_layout() {
        let mut link = RadioLink::new(Vec::new());
        link.send_position(&Coordinate::new(1005, 30500, 0), 1200, 3)
            .unwrap();

        let frame = link.into_inner();
        let payload = b"i3 m1200 x1005 y30500\r\n";
        assert_eq!(frame[0], FRAME_MARKER);
        assert_eq!(frame[1] as usize, payload.len());
        assert_eq!(&frame[2..4], &FRAME_RESERVED);
        assert_eq!(&frame[4..], payload);
    }

    #[test]
    fn test_heartbeat_frame_carries_only_id() {
        let mut link = RadioLink::new(Vec::new());
        link.send_heartbeat(3).unwrap();

        let frame = link.into_inner();
        assert_eq!(&frame[4..], b"i3 k\r\n");
    }

    #[test]
    fn test_negative_position_is_formatted_signed() {
        let mut link = RadioLink::new(Vec::new());
        link.send_position(&Coordinate::new(-750, 40, 0), 0, 7).unwrap();

        let frame = link.into_inner();
        assert_eq!(&frame[4..], b"i7 m0 x-750 y40\r\n");
    }

    #[test]
    fn test_raw_frame_passthrough() {
        let mut link = RadioLink::new(Vec::new());
        link.send_raw(b"INIT OK\r\n").unwrap();

        let frame = link.into_inner();
        assert_eq!(frame[1] as usize, 9);
        assert_eq!(&frame[4..], b"INIT OK\r\n");
    }
}
