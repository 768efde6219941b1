//! In-memory ranging-module emulation
//!
//! Implements [`RegisterBus`] over a simulated local module plus one
//! simulated remote device reachable through the relay registers. Used by
//! the protocol and control-loop tests and by the `mock` hardware mode for
//! hardware-free demo runs.
//!
//! The emulation covers exactly the register semantics the drivers rely on:
//! read-to-clear interrupt status, stage/dispatch/drain relay plumbing, the
//! device-list functions, and on-demand positioning with scripted or
//! jittered fixes.

use std::collections::VecDeque;

use rand::Rng;

use crate::core::RegisterBus;
use crate::error::Result;
use crate::ranging::constants::*;

/// One bus transaction, recorded in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOp {
    Read(u8),
    Write(u8),
    Call(u8),
}

struct RemoteSim {
    regs: [u8; 256],
    devices: Vec<Vec<u8>>,
}

impl Default for RemoteSim {
    fn default() -> Self {
        RemoteSim {
            regs: [0u8; 256],
            devices: Vec::new(),
        }
    }
}

/// Simulated register bus to a local ranging module.
pub struct MockRangingBus {
    regs: [u8; 256],
    staged: Option<Vec<u8>>,
    reply_queue: VecDeque<Vec<u8>>,
    journal: Vec<BusOp>,
    local_devices: Vec<Vec<u8>>,
    remote: RemoteSim,
    position_script: VecDeque<(i32, i32)>,
    jitter_mm: i32,
    nack_stage: bool,
    nack_dispatch: bool,
    fail_remote_call: Option<u8>,
}

impl MockRangingBus {
    pub fn new() -> Self {
        Self {
            regs: [0u8; 256],
            staged: None,
            reply_queue: VecDeque::new(),
            journal: Vec::new(),
            local_devices: Vec::new(),
            remote: RemoteSim::default(),
            position_script: VecDeque::new(),
            jitter_mm: 0,
            nack_stage: false,
            nack_dispatch: false,
            fail_remote_call: None,
        }
    }

    /// Random-walk the simulated fix by up to `mm` per axis per positioning
    /// request (demo mode).
    pub fn with_jitter(mut self, mm: i32) -> Self {
        self.jitter_mm = mm;
        self
    }

    // ------------------------------------------------------------------
    // Test hooks
    // ------------------------------------------------------------------

    /// The next stage request is acknowledged with zero.
    pub fn nack_next_stage(&mut self) {
        self.nack_stage = true;
    }

    /// The next dispatch request is acknowledged with zero.
    pub fn nack_next_dispatch(&mut self) {
        self.nack_dispatch = true;
    }

    /// The next relayed call to `register` replies with rejection status
    /// bytes instead of success.
    pub fn fail_next_remote_call(&mut self, register: u8) {
        self.fail_remote_call = Some(register);
    }

    /// Seed the remote device's register file.
    pub fn set_remote_register(&mut self, register: u8, data: &[u8]) {
        let start = register as usize;
        self.remote.regs[start..start + data.len()].copy_from_slice(data);
    }

    /// Fix reported by the next positioning requests, in order. When the
    /// script runs dry the last scripted fix keeps repeating.
    pub fn script_positions<I: IntoIterator<Item = (i32, i32)>>(&mut self, fixes: I) {
        self.position_script.extend(fixes);
    }

    /// Set the current simulated fix directly.
    pub fn set_remote_position(&mut self, x: i32, y: i32) {
        self.write_remote_position(x, y);
    }

    pub fn remote_device_count(&self) -> usize {
        self.remote.devices.len()
    }

    pub fn remote_devices(&self) -> &[Vec<u8>] {
        &self.remote.devices
    }

    pub fn local_device_count(&self) -> usize {
        self.local_devices.len()
    }

    pub fn journal(&self) -> &[BusOp] {
        &self.journal
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn write_remote_position(&mut self, x: i32, y: i32) {
        let xs = x.to_le_bytes();
        let ys = y.to_le_bytes();
        let xi = REG_POS_X as usize;
        let yi = REG_POS_Y as usize;
        self.remote.regs[xi..xi + 4].copy_from_slice(&xs);
        self.remote.regs[yi..yi + 4].copy_from_slice(&ys);
    }

    fn current_remote_position(&self) -> (i32, i32) {
        let xi = REG_POS_X as usize;
        let yi = REG_POS_Y as usize;
        let x = i32::from_le_bytes(self.remote.regs[xi..xi + 4].try_into().unwrap());
        let y = i32::from_le_bytes(self.remote.regs[yi..yi + 4].try_into().unwrap());
        (x, y)
    }

    fn next_fix(&mut self) -> (i32, i32) {
        let (mut x, mut y) = match self.position_script.pop_front() {
            Some(fix) => fix,
            None => self.current_remote_position(),
        };
        if self.jitter_mm > 0 {
            let mut rng = rand::thread_rng();
            x += rng.gen_range(-self.jitter_mm..=self.jitter_mm);
            y += rng.gen_range(-self.jitter_mm..=self.jitter_mm);
        }
        (x, y)
    }

    fn queue_reply(&mut self, reply: Vec<u8>) {
        self.reply_queue.push_back(reply);
        self.regs[REG_INT_STATUS as usize] |= INT_STATUS_RX_DATA;
    }

    /// Execute the staged frame on the simulated remote device.
    fn execute_dispatch(&mut self, dispatch: &[u8]) {
        let opcode = dispatch.get(2).copied().unwrap_or(0);
        let staged = match self.staged.take() {
            Some(frame) if frame.len() >= 2 => frame,
            _ => {
                self.queue_reply(vec![0, 0]);
                return;
            }
        };
        let register = staged[1];
        let payload = &staged[2..];

        if self.fail_remote_call == Some(register) && opcode == RELAY_OP_CALL {
            self.fail_remote_call = None;
            self.queue_reply(vec![0, 0]);
            return;
        }

        match opcode {
            RELAY_OP_READ => {
                let size = payload.first().copied().unwrap_or(0) as usize;
                let start = register as usize;
                let mut reply = Vec::with_capacity(1 + size);
                reply.push(1);
                reply.extend_from_slice(&self.remote.regs[start..start + size]);
                self.queue_reply(reply);
            }
            RELAY_OP_WRITE => {
                let start = register as usize;
                self.remote.regs[start..start + payload.len()].copy_from_slice(payload);
                self.queue_reply(vec![1, 1]);
            }
            RELAY_OP_CALL => match register {
                FN_DEVICES_CLEAR => {
                    self.remote.devices.clear();
                    self.queue_reply(vec![1, 1]);
                }
                FN_DEVICE_ADD => {
                    self.remote.devices.push(payload.to_vec());
                    self.queue_reply(vec![1, 1]);
                }
                FN_DO_POSITIONING => {
                    let (x, y) = self.next_fix();
                    self.write_remote_position(x, y);
                    self.queue_reply(vec![1, 0]);
                }
                _ => {
                    // flash save, calibrate and the rest acknowledge blindly
                    self.queue_reply(vec![1, 1]);
                }
            },
            _ => self.queue_reply(vec![0, 0]),
        }
    }

    fn run_local_function(&mut self, register: u8, params: &[u8], reply: &mut [u8]) {
        reply.fill(0);
        match register {
            FN_TX_DATA => {
                if self.nack_stage {
                    self.nack_stage = false;
                    return; // zero acknowledgement
                }
                self.staged = Some(params.to_vec());
                reply[0] = 1;
            }
            FN_TX_SEND => {
                if self.nack_dispatch {
                    self.nack_dispatch = false;
                    return;
                }
                self.execute_dispatch(params);
                reply[0] = 1;
            }
            FN_RX_DATA => {
                if let Some(pending) = self.reply_queue.pop_front() {
                    let n = pending.len().min(reply.len());
                    reply[..n].copy_from_slice(&pending[..n]);
                }
            }
            FN_DEVICES_CLEAR => {
                self.local_devices.clear();
                reply[0] = 1;
            }
            FN_DEVICE_ADD => {
                self.local_devices.push(params.to_vec());
                reply[0] = 1;
            }
            FN_DO_POSITIONING => {
                let (x, y) = self.next_fix();
                // local fixes land in the local register file
                let xi = REG_POS_X as usize;
                let yi = REG_POS_Y as usize;
                self.regs[xi..xi + 4].copy_from_slice(&x.to_le_bytes());
                self.regs[yi..yi + 4].copy_from_slice(&y.to_le_bytes());
                reply[0] = 1;
            }
            _ => {
                reply[0] = 1;
            }
        }
    }
}

impl Default for MockRangingBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBus for MockRangingBus {
    fn write(&mut self, register: u8, data: &[u8]) -> Result<()> {
        self.journal.push(BusOp::Write(register));
        let start = register as usize;
        self.regs[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&mut self, register: u8, out: &mut [u8]) -> Result<()> {
        self.journal.push(BusOp::Read(register));
        let start = register as usize;
        out.copy_from_slice(&self.regs[start..start + out.len()]);
        if register == REG_INT_STATUS {
            // latched flags clear on read
            self.regs[REG_INT_STATUS as usize] = 0;
        }
        Ok(())
    }

    fn call(&mut self, register: u8, params: &[u8], reply: &mut [u8]) -> Result<()> {
        self.journal.push(BusOp::Call(register));
        let params = params.to_vec();
        self.run_local_function(register, &params, reply);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_status_clears_on_read() {
        let mut bus = MockRangingBus::new();
        bus.regs[REG_INT_STATUS as usize] = INT_STATUS_RX_DATA | INT_STATUS_ERR;

        let mut first = [0u8; 1];
        bus.read(REG_INT_STATUS, &mut first).unwrap();
        assert_eq!(first[0], INT_STATUS_RX_DATA | INT_STATUS_ERR);

        let mut second = [0u8; 1];
        bus.read(REG_INT_STATUS, &mut second).unwrap();
        assert_eq!(second[0], 0);
    }

    #[test]
    fn test_scripted_fix_repeats_after_script_dries_up() {
        let mut bus = MockRangingBus::new();
        bus.script_positions([(10, 20)]);

        assert_eq!(bus.next_fix(), (10, 20));
        bus.write_remote_position(10, 20);
        // script empty: last written fix repeats
        assert_eq!(bus.next_fix(), (10, 20));
    }
}
