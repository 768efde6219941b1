//! Ranging module driver: local register operations, the remote relay
//! protocol, and device provisioning.

pub mod constants;
pub mod local;
pub mod provisioning;
pub mod relay;

use std::time::Duration;

use crate::core::RegisterBus;

pub use relay::{RelayFrame, MAX_RELAY_PAYLOAD};

/// Bound on the inbound-reply poll in [`RangingModule::drain_reply`].
///
/// The wireless exchange completes asynchronously; the module latches a
/// data-received bit that this driver polls. The budget converts a reply
/// that never arrives into [`crate::error::Error::Timeout`] instead of a hang.
#[derive(Debug, Clone, Copy)]
pub struct DrainPolicy {
    pub attempts: u32,
    pub poll_interval: Duration,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            attempts: 100,
            poll_interval: Duration::from_millis(2),
        }
    }
}

/// Driver for the locally attached ranging module.
///
/// Owns the register bus exclusively; every exchange (stage, dispatch,
/// drain) fully completes before the next begins, so relay operations are
/// strictly sequential and never pipelined.
pub struct RangingModule<B: RegisterBus> {
    bus: B,
    drain: DrainPolicy,
}

impl<B: RegisterBus> RangingModule<B> {
    pub fn new(bus: B, drain: DrainPolicy) -> Self {
        Self { bus, drain }
    }

    /// Direct access to the underlying bus (tests and diagnostics).
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_bus(self) -> B {
        self.bus
    }
}
