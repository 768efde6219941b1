//! Remote relay protocol
//!
//! The local module has no single primitive for "execute this register
//! operation on a remote device and hand back the result". That illusion is
//! built here from two independent bus transactions bracketing an opaque
//! wireless exchange:
//!
//! 1. **stage**: load the target register and payload into the local
//!    transmit buffer (`FN_TX_DATA`)
//! 2. **dispatch**: instruct the module to transmit the staged buffer to a
//!    network address (`FN_TX_SEND`)
//! 3. **drain**: once the remote reply lands, the module latches the
//!    data-received interrupt bit; poll for it, then read the receive
//!    buffer (`FN_RX_DATA`)
//!
//! Each stage/dispatch step returns a one-byte acknowledgement; zero means
//! the module refused the request and the whole operation aborts. Nothing is
//! retried at this layer.

use std::thread;

use super::constants::*;
use super::RangingModule;
use crate::core::{NetworkAddress, RegisterBus};
use crate::error::{Error, RelayStage, Result};

/// Maximum payload carried by one staged relay frame.
///
/// The largest frame in practice is a device-add record (15 bytes); 32 gives
/// headroom for any function the remote module exposes.
pub const MAX_RELAY_PAYLOAD: usize = 32;

/// Stage header: buffer offset byte + target register byte
const STAGE_HEADER: usize = 2;

/// Envelope for one remote register operation, built once and staged into
/// the local module's transmit buffer. Fixed-capacity: relay frames are
/// assembled on every control-loop cycle and must not allocate.
#[derive(Debug, Clone, Copy)]
pub struct RelayFrame {
    opcode: u8,
    data: [u8; STAGE_HEADER + MAX_RELAY_PAYLOAD],
    len: usize,
}

impl RelayFrame {
    fn build(opcode: u8, register: u8, payload: &[u8]) -> Result<Self> {
        if payload.len() > MAX_RELAY_PAYLOAD {
            return Err(Error::InvalidParameter(format!(
                "relay payload {} exceeds {} bytes",
                payload.len(),
                MAX_RELAY_PAYLOAD
            )));
        }
        let mut data = [0u8; STAGE_HEADER + MAX_RELAY_PAYLOAD];
        data[0] = 0x00; // offset into the remote register, always zero here
        data[1] = register;
        data[STAGE_HEADER..STAGE_HEADER + payload.len()].copy_from_slice(payload);
        Ok(Self {
            opcode,
            data,
            len: STAGE_HEADER + payload.len(),
        })
    }

    /// Frame requesting a write of `payload` to the remote `register`.
    pub fn write(register: u8, payload: &[u8]) -> Result<Self> {
        Self::build(RELAY_OP_WRITE, register, payload)
    }

    /// Frame requesting a read of `size` bytes from the remote `register`.
    pub fn read(register: u8, size: u8) -> Self {
        let mut data = [0u8; STAGE_HEADER + MAX_RELAY_PAYLOAD];
        data[1] = register;
        data[2] = size;
        Self {
            opcode: RELAY_OP_READ,
            data,
            len: STAGE_HEADER + 1,
        }
    }

    /// Frame invoking the remote function register with `params`.
    pub fn call(register: u8, params: &[u8]) -> Result<Self> {
        Self::build(RELAY_OP_CALL, register, params)
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn register(&self) -> u8 {
        self.data[1]
    }

    /// Bytes loaded into the transmit buffer by the stage step.
    pub fn stage_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Payload of the dispatch step: target address (LE) plus the opcode
    /// telling the remote device how to interpret the staged bytes.
    pub fn dispatch_bytes(&self, target: NetworkAddress) -> [u8; 3] {
        let addr = target.to_le_bytes();
        [addr[0], addr[1], self.opcode]
    }
}

impl<B: RegisterBus> RangingModule<B> {
    /// Read (and thereby clear) the latched interrupt-status register.
    pub(crate) fn clear_interrupt_status(&mut self) -> Result<u8> {
        let mut status = [0u8; 1];
        self.bus.read(REG_INT_STATUS, &mut status)?;
        Ok(status[0])
    }

    /// Run one stage + dispatch exchange for `frame`.
    ///
    /// The interrupt-status register is cleared first so a stale
    /// data-received bit cannot satisfy a later [`Self::drain_reply`].
    fn relay_exchange(&mut self, target: NetworkAddress, frame: &RelayFrame) -> Result<()> {
        self.clear_interrupt_status()?;

        let mut ack = [0u8; 1];
        self.bus.call(FN_TX_DATA, frame.stage_bytes(), &mut ack)?;
        if ack[0] == 0 {
            return Err(Error::RelayRejected {
                stage: RelayStage::Stage,
            });
        }

        let mut ack = [0u8; 1];
        self.bus
            .call(FN_TX_SEND, &frame.dispatch_bytes(target), &mut ack)?;
        if ack[0] == 0 {
            return Err(Error::RelayRejected {
                stage: RelayStage::Dispatch,
            });
        }

        Ok(())
    }

    /// Write `payload` to `register` on the remote device at `target`.
    pub fn remote_write(
        &mut self,
        target: NetworkAddress,
        register: u8,
        payload: &[u8],
    ) -> Result<()> {
        let frame = RelayFrame::write(register, payload)?;
        self.relay_exchange(target, &frame)
    }

    /// Request `size` bytes from `register` on the remote device. The data
    /// itself arrives later via [`Self::drain_reply`].
    pub fn remote_read(&mut self, target: NetworkAddress, register: u8, size: u8) -> Result<()> {
        let frame = RelayFrame::read(register, size);
        self.relay_exchange(target, &frame)
    }

    /// Invoke the function register at `register` on the remote device.
    pub fn remote_call(
        &mut self,
        target: NetworkAddress,
        register: u8,
        params: &[u8],
    ) -> Result<()> {
        let frame = RelayFrame::call(register, params)?;
        self.relay_exchange(target, &frame)
    }

    /// Wait for the remote reply and read `out.len()` bytes from the
    /// receive buffer.
    ///
    /// Polls the data-received interrupt bit under the configured
    /// [`super::DrainPolicy`]; a reply that never arrives surfaces as
    /// [`Error::Timeout`] rather than stalling the control loop.
    pub fn drain_reply(&mut self, out: &mut [u8]) -> Result<()> {
        let mut status = [0u8; 1];
        let mut ready = false;
        for _ in 0..self.drain.attempts {
            self.bus.read(REG_INT_STATUS, &mut status)?;
            if status[0] & INT_STATUS_RX_DATA != 0 {
                ready = true;
                break;
            }
            thread::sleep(self.drain.poll_interval);
        }
        if !ready {
            return Err(Error::Timeout);
        }

        self.bus.call(FN_RX_DATA, &[0x00], out)
    }

    /// Remote write, then drain the acknowledgement reply on success.
    pub fn remote_write_then_read(
        &mut self,
        target: NetworkAddress,
        register: u8,
        payload: &[u8],
        reply: &mut [u8],
    ) -> Result<()> {
        self.remote_write(target, register, payload)?;
        self.drain_reply(reply)
    }

    /// Remote read request, then drain the data reply on success.
    pub fn remote_read_then_read(
        &mut self,
        target: NetworkAddress,
        register: u8,
        size: u8,
        reply: &mut [u8],
    ) -> Result<()> {
        self.remote_read(target, register, size)?;
        self.drain_reply(reply)
    }

    /// Remote function call, then drain the result reply on success.
    pub fn remote_call_then_read(
        &mut self,
        target: NetworkAddress,
        register: u8,
        params: &[u8],
        reply: &mut [u8],
    ) -> Result<()> {
        self.remote_call(target, register, params)?;
        self.drain_reply(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::mock::{BusOp, MockRangingBus};
    use crate::ranging::DrainPolicy;
    use std::time::Duration;

    fn fast_drain() -> DrainPolicy {
        DrainPolicy {
            attempts: 3,
            poll_interval: Duration::from_millis(1),
        }
    }

    fn module() -> RangingModule<MockRangingBus> {
        RangingModule::new(MockRangingBus::new(), fast_drain())
    }

    #[test]
    fn test_write_frame_layout() {
        let frame = RelayFrame::write(0x16, &[0x11]).unwrap();
        assert_eq!(frame.stage_bytes(), &[0x00, 0x16, 0x11]);
        assert_eq!(frame.dispatch_bytes(0x6875), [0x75, 0x68, RELAY_OP_WRITE]);
    }

    #[test]
    fn test_read_frame_carries_size() {
        let frame = RelayFrame::read(REG_POS_X, 4);
        assert_eq!(frame.stage_bytes(), &[0x00, REG_POS_X, 4]);
        assert_eq!(frame.dispatch_bytes(0x0001)[2], RELAY_OP_READ);
    }

    #[test]
    fn test_call_frame_rejects_oversized_payload() {
        let big = [0u8; MAX_RELAY_PAYLOAD + 1];
        assert!(RelayFrame::call(FN_DEVICE_ADD, &big).is_err());
    }

    #[test]
    fn test_one_stage_one_dispatch_per_operation() {
        let mut module = module();
        module.remote_write(0x6875, 0x16, &[0x11]).unwrap();

        let calls: Vec<_> = module
            .bus_mut()
            .journal()
            .iter()
            .filter_map(|op| match op {
                BusOp::Call(reg) => Some(*reg),
                _ => None,
            })
            .collect();
        assert_eq!(calls, vec![FN_TX_DATA, FN_TX_SEND]);
    }

    #[test]
    fn test_stage_nack_aborts_before_dispatch() {
        let mut module = module();
        module.bus_mut().nack_next_stage();

        let err = module.remote_write(0x6875, 0x16, &[0x11]).unwrap_err();
        assert!(matches!(
            err,
            Error::RelayRejected {
                stage: RelayStage::Stage
            }
        ));

        // the dispatch function register was never touched
        let dispatched = module
            .bus_mut()
            .journal()
            .iter()
            .any(|op| matches!(op, BusOp::Call(reg) if *reg == FN_TX_SEND));
        assert!(!dispatched);
    }

    #[test]
    fn test_dispatch_nack_is_reported_as_dispatch() {
        let mut module = module();
        module.bus_mut().nack_next_dispatch();

        let err = module.remote_call(0x6875, FN_DEVICES_CLEAR, &[]).unwrap_err();
        assert!(matches!(
            err,
            Error::RelayRejected {
                stage: RelayStage::Dispatch
            }
        ));
    }

    #[test]
    fn test_remote_read_then_read_returns_register_bytes() {
        let mut module = module();
        module
            .bus_mut()
            .set_remote_register(REG_POS_X, &1234i32.to_le_bytes());

        let mut reply = [0u8; POS_REPLY_LEN];
        module
            .remote_read_then_read(0x6875, REG_POS_X, 4, &mut reply)
            .unwrap();

        assert_eq!(reply[0], 1); // status byte
        assert_eq!(i32::from_le_bytes(reply[1..5].try_into().unwrap()), 1234);
    }

    #[test]
    fn test_drain_without_reply_times_out() {
        let mut module = module();
        let mut reply = [0u8; 2];
        let err = module.drain_reply(&mut reply).unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[test]
    fn test_composite_skips_drain_on_dispatch_failure() {
        let mut module = module();
        module.bus_mut().nack_next_dispatch();

        let mut reply = [0u8; 2];
        let err = module
            .remote_call_then_read(0x6875, FN_DO_POSITIONING, &[], &mut reply)
            .unwrap_err();
        assert!(matches!(err, Error::RelayRejected { .. }));

        // no receive-buffer read was attempted
        let drained = module
            .bus_mut()
            .journal()
            .iter()
            .any(|op| matches!(op, BusOp::Call(reg) if *reg == FN_RX_DATA));
        assert!(!drained);
    }
}
