//! Positioning control loop
//!
//! Drives the sampling cadence against the remote tag, applies the
//! accept/reject policy from `state.rs`, swaps the active anchor set on zone
//! crossings and decides what to telemeter. Runs on a dedicated thread until
//! the shutdown flag flips (see `main.rs`).
//!
//! Cycle order: sample, motion classification, plausibility reject,
//! boundary reject, zone reassignment, telemetry, commit. A failed sample
//! leaves the tracking state untouched and simply retries next cycle.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::core::{Coordinate, NetworkAddress, RegisterBus};
use crate::error::Result;
use crate::ranging::constants::{FN_DO_POSITIONING, INT_STATUS_ERR, POS_REPLY_LEN, REG_POS_X, REG_POS_Y};
use crate::ranging::RangingModule;
use crate::sensors::LoadSensor;
use crate::telemetry::RadioLink;
use crate::tracking::state::{CycleOutcome, MotionPolicy, TrackingState};
use crate::tracking::zones::{Zone, ZonePlan};

/// Idle sleep between cadence checks
const IDLE_POLL: Duration = Duration::from_millis(5);

/// Scalar loop parameters (see the `[tracking]` and `[crane]` config sections).
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    /// Minimum wall-clock time between cycles
    pub sample_period: Duration,
    /// Wait after the positioning command before reading the result registers
    pub position_settle: Duration,
    /// Crane id carried in every telemetry frame
    pub crane_id: u8,
}

/// What one cycle did, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleReport {
    /// Relay failure while sampling; state untouched
    SampleFailed,
    RejectedImplausible,
    RejectedOutOfBounds,
    /// Sample accepted and full telemetry sent
    Reported,
    /// Sample accepted but the crane is stationary; heartbeat sent
    Heartbeat,
}

/// The periodic tracking loop over one remote tag.
pub struct ControlLoop<B: RegisterBus, S: LoadSensor, W: Write> {
    module: RangingModule<B>,
    sensor: S,
    radio: RadioLink<W>,
    policy: MotionPolicy,
    plan: ZonePlan,
    tag: NetworkAddress,
    settings: LoopSettings,
    irq_pending: Arc<AtomicBool>,
}

impl<B: RegisterBus, S: LoadSensor, W: Write> ControlLoop<B, S, W> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        module: RangingModule<B>,
        sensor: S,
        radio: RadioLink<W>,
        policy: MotionPolicy,
        plan: ZonePlan,
        tag: NetworkAddress,
        settings: LoopSettings,
        irq_pending: Arc<AtomicBool>,
    ) -> Self {
        Self {
            module,
            sensor,
            radio,
            policy,
            plan,
            tag,
            settings,
            irq_pending,
        }
    }

    pub fn module_mut(&mut self) -> &mut RangingModule<B> {
        &mut self.module
    }

    pub fn radio(&self) -> &RadioLink<W> {
        &self.radio
    }

    /// One full positioning exchange with the remote tag.
    ///
    /// Triggers the remote solver, waits for it to settle, then fetches the
    /// X and Y result blocks. Each reply is a status byte followed by the
    /// 4-byte LE value. Z is not refreshed by this path.
    fn sample_position(&mut self) -> Result<Coordinate> {
        let mut ack = [0u8; 2];
        self.module
            .remote_call_then_read(self.tag, FN_DO_POSITIONING, &[], &mut ack)?;

        thread::sleep(self.settings.position_settle);

        let mut reply = [0u8; POS_REPLY_LEN];
        self.module
            .remote_read_then_read(self.tag, REG_POS_X, 4, &mut reply)?;
        let x = i32::from_le_bytes(reply[1..5].try_into().expect("fixed reply size"));

        self.module
            .remote_read_then_read(self.tag, REG_POS_Y, 4, &mut reply)?;
        let y = i32::from_le_bytes(reply[1..5].try_into().expect("fixed reply size"));

        Ok(Coordinate::new(x, y, 0))
    }

    fn read_mass(&mut self) -> u32 {
        self.sensor.read_raw().unwrap_or_else(|e| {
            warn!("load sensor read failed: {}", e);
            0
        })
    }

    /// Swap the active anchor set when the sample crossed the zone split.
    ///
    /// The zone flag flips even if the reassignment itself fails, matching
    /// the commissioned behavior; the next crossing retries the swap.
    fn maybe_reassign_zone(&mut self, state: &mut TrackingState, y: i32) {
        match (self.plan.zone_for(y), state.upper_zone_active()) {
            (Zone::Upper, false) => {
                info!("tag crossed into upper zone at y={}", y);
                if let Err(e) = self
                    .module
                    .reassign_anchor_set(self.tag, self.plan.anchors(Zone::Upper))
                {
                    warn!("upper-zone anchor reassignment failed: {}", e);
                }
                state.set_upper_zone_active(true);
            }
            (Zone::Lower, true) => {
                info!("tag crossed into lower zone at y={}", y);
                if let Err(e) = self
                    .module
                    .reassign_anchor_set(self.tag, self.plan.anchors(Zone::Lower))
                {
                    warn!("lower-zone anchor reassignment failed: {}", e);
                }
                state.set_upper_zone_active(false);
            }
            _ => {}
        }
    }

    /// Run one sampling cycle against the tracking state.
    pub fn run_cycle(&mut self, state: &mut TrackingState) -> CycleReport {
        let mass = self.read_mass();

        let sample = match self.sample_position() {
            Ok(sample) => sample,
            Err(e) => {
                warn!("positioning failed: {}", e);
                return CycleReport::SampleFailed;
            }
        };

        match state.evaluate(sample, &self.policy) {
            CycleOutcome::RejectedImplausible => {
                debug!(
                    "implausible jump rejected: sample=({}, {}), failed_reads={}",
                    sample.x,
                    sample.y,
                    state.failed_reads()
                );
                CycleReport::RejectedImplausible
            }
            CycleOutcome::RejectedOutOfBounds => {
                debug!(
                    "out-of-bounds fix rejected: sample=({}, {})",
                    sample.x, sample.y
                );
                CycleReport::RejectedOutOfBounds
            }
            CycleOutcome::Accepted => {
                self.maybe_reassign_zone(state, sample.y);

                let report = if state.stationary_capped(&self.policy) {
                    if let Err(e) = self.radio.send_heartbeat(self.settings.crane_id) {
                        warn!("heartbeat telemetry failed: {}", e);
                    }
                    CycleReport::Heartbeat
                } else {
                    if let Err(e) = self.radio.send_position(&sample, mass, self.settings.crane_id)
                    {
                        warn!("position telemetry failed: {}", e);
                    }
                    CycleReport::Reported
                };

                state.commit(sample);
                report
            }
        }
    }

    /// Obtain the first fix, telemeter it and build the tracking state.
    /// Retries at the sampling cadence; returns `None` if shutdown is
    /// requested before a fix lands.
    pub fn seed(&mut self, shutdown: &AtomicBool) -> Option<TrackingState> {
        while !shutdown.load(Ordering::Relaxed) {
            match self.sample_position() {
                Ok(fix) => {
                    let mass = self.read_mass();
                    if let Err(e) = self.radio.send_position(&fix, mass, self.settings.crane_id) {
                        warn!("startup telemetry failed: {}", e);
                    }
                    info!("first fix at ({}, {})", fix.x, fix.y);
                    return Some(TrackingState::seed(fix));
                }
                Err(e) => {
                    warn!("startup positioning failed: {}", e);
                    thread::sleep(self.settings.sample_period);
                }
            }
        }
        None
    }

    /// Check and clear a pending hardware interrupt.
    ///
    /// Reading the status register clears the module's latch. The error bit
    /// is only logged; nothing acts on it yet.
    fn service_interrupt(&mut self) {
        if !self.irq_pending.swap(false, Ordering::Relaxed) {
            return;
        }
        match self.module.clear_interrupt_status() {
            Ok(status) if status & INT_STATUS_ERR != 0 => {
                debug!("module error interrupt: status={:#04x}", status);
            }
            Ok(_) => {}
            Err(e) => warn!("interrupt status read failed: {}", e),
        }
    }

    /// Run until `shutdown` flips.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        let Some(mut state) = self.seed(shutdown) else {
            return;
        };
        let mut last_tick = Instant::now();

        while !shutdown.load(Ordering::Relaxed) {
            self.service_interrupt();

            if last_tick.elapsed() < self.settings.sample_period {
                thread::sleep(IDLE_POLL);
                continue;
            }

            let report = self.run_cycle(&mut state);
            debug!(
                "cycle: {:?}, last=({}, {}), stationary={}, failed={}",
                report,
                state.last_accepted().x,
                state.last_accepted().y,
                state.stationary_reads(),
                state.failed_reads()
            );

            last_tick = Instant::now();
        }

        info!("control loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::mock::{BusOp, MockRangingBus};
    use crate::ranging::constants::FN_TX_SEND;
    use crate::ranging::DrainPolicy;
    use crate::sensors::FixedLoadSensor;
    use crate::tracking::state::BayExtent;

    fn policy() -> MotionPolicy {
        MotionPolicy {
            stationary_mm: 350,
            minor_movement_mm: 400,
            max_travel_per_read_mm: 2000,
            stationary_cap: 200,
            bay: BayExtent {
                x_min: 0,
                x_max: 21860,
                y_min: 0,
                y_max: 45600,
            },
            boundary_tolerance_mm: 1500,
        }
    }

    fn roster() -> Vec<crate::core::Device> {
        use crate::core::Device;
        vec![
            Device::anchor(0x1172, 100, 100, 5000),
            Device::anchor(0x1114, 21860, 0, 5000),
            Device::anchor(0x1103, 0, 15200, 5000),
            Device::anchor(0x1131, 21860, 15200, 5000),
            Device::anchor(0x6830, 0, 30400, 5000),
            Device::anchor(0x1152, 21860, 30400, 5000),
            Device::anchor(0x6846, 0, 45600, 5000),
            Device::anchor(0x6842, 21860, 45600, 5000),
        ]
    }

    fn make_loop(
        bus: MockRangingBus,
        policy: MotionPolicy,
    ) -> ControlLoop<MockRangingBus, FixedLoadSensor, Vec<u8>> {
        let module = RangingModule::new(
            bus,
            DrainPolicy {
                attempts: 3,
                poll_interval: Duration::from_millis(1),
            },
        );
        let plan = ZonePlan::from_anchor_roster(30400, &roster()).unwrap();
        ControlLoop::new(
            module,
            FixedLoadSensor::new(1200),
            RadioLink::new(Vec::new()),
            policy,
            plan,
            0x6875,
            LoopSettings {
                sample_period: Duration::from_millis(1),
                position_settle: Duration::from_millis(0),
                crane_id: 3,
            },
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn seed_at(loop_: &mut ControlLoop<MockRangingBus, FixedLoadSensor, Vec<u8>>, x: i32, y: i32) -> TrackingState {
        loop_.module_mut().bus_mut().set_remote_position(x, y);
        let shutdown = AtomicBool::new(false);
        loop_.seed(&shutdown).unwrap()
    }

    #[test]
    fn test_stationary_cycle_commits_and_reports() {
        let mut loop_ = make_loop(MockRangingBus::new(), policy());
        let mut state = seed_at(&mut loop_, 1000, 1000);

        loop_.module_mut().bus_mut().script_positions([(1005, 1005)]);
        let report = loop_.run_cycle(&mut state);

        assert_eq!(report, CycleReport::Reported);
        assert_eq!(state.stationary_reads(), 1);
        assert_eq!(state.failed_reads(), 1);
        assert_eq!(state.last_accepted(), Coordinate::new(1005, 1005, 0));

        // frame payload carries id, mass and position
        let frames = loop_.radio().get_ref();
        let text = String::from_utf8_lossy(frames);
        assert!(text.contains("i3 m1200 x1005 y1005"));
    }

    #[test]
    fn test_sample_failure_leaves_state_untouched() {
        let mut loop_ = make_loop(MockRangingBus::new(), policy());
        let mut state = seed_at(&mut loop_, 1000, 1000);
        let before = state.clone();

        loop_.module_mut().bus_mut().nack_next_stage();
        let report = loop_.run_cycle(&mut state);

        assert_eq!(report, CycleReport::SampleFailed);
        assert_eq!(state.last_accepted(), before.last_accepted());
        assert_eq!(state.failed_reads(), before.failed_reads());
        assert_eq!(state.stationary_reads(), before.stationary_reads());
    }

    #[test]
    fn test_implausible_jump_skips_telemetry() {
        let mut loop_ = make_loop(MockRangingBus::new(), policy());
        let mut state = seed_at(&mut loop_, 1000, 1000);
        let frames_before = loop_.radio().get_ref().len();

        loop_.module_mut().bus_mut().script_positions([(3500, 1000)]);
        let report = loop_.run_cycle(&mut state);

        assert_eq!(report, CycleReport::RejectedImplausible);
        assert_eq!(state.failed_reads(), 2);
        assert_eq!(state.last_accepted(), Coordinate::new(1000, 1000, 0));
        assert_eq!(loop_.radio().get_ref().len(), frames_before);
        assert_eq!(state.history().len(), 1);
    }

    #[test]
    fn test_heartbeat_once_stationary_cap_reached() {
        let mut p = policy();
        p.stationary_cap = 2;
        let mut loop_ = make_loop(MockRangingBus::new(), p);
        let mut state = seed_at(&mut loop_, 1000, 1000);

        // two stationary cycles reach the cap; the second already reports
        // a heartbeat because the counter hits the cap before telemetry
        assert_eq!(loop_.run_cycle(&mut state), CycleReport::Reported);
        let report = loop_.run_cycle(&mut state);
        assert_eq!(report, CycleReport::Heartbeat);

        let text = String::from_utf8_lossy(loop_.radio().get_ref()).to_string();
        assert!(text.contains("i3 k\r\n"));
    }

    #[test]
    fn test_zone_crossing_reassigns_exactly_once() {
        let mut loop_ = make_loop(MockRangingBus::new(), policy());
        let mut state = seed_at(&mut loop_, 1000, 30000);
        assert!(!state.upper_zone_active());

        loop_.module_mut().bus_mut().script_positions([(1005, 30500)]);
        let report = loop_.run_cycle(&mut state);
        assert_eq!(report, CycleReport::Reported);
        assert!(state.upper_zone_active());

        // the remote registry now holds the six upper-zone anchors
        {
            let bus = loop_.module_mut().bus_mut();
            assert_eq!(bus.remote_device_count(), 6);
            assert_eq!(
                bus.remote_devices()[0][..2],
                0x1103u16.to_le_bytes()
            );
            bus.clear_journal();
        }

        // staying in the upper zone triggers no further reassignment:
        // the only dispatches are the three sampling exchanges
        loop_.module_mut().bus_mut().script_positions([(1005, 30600)]);
        loop_.run_cycle(&mut state);
        let dispatches = loop_
            .module_mut()
            .bus_mut()
            .journal()
            .iter()
            .filter(|op| matches!(op, BusOp::Call(FN_TX_SEND)))
            .count();
        assert_eq!(dispatches, 3);
    }

    #[test]
    fn test_zone_crossing_back_restores_lower_set() {
        let mut loop_ = make_loop(MockRangingBus::new(), policy());
        let mut state = seed_at(&mut loop_, 1000, 30000);

        loop_.module_mut().bus_mut().script_positions([(1000, 31000)]);
        loop_.run_cycle(&mut state);
        assert!(state.upper_zone_active());

        loop_.module_mut().bus_mut().script_positions([(1000, 29500)]);
        loop_.run_cycle(&mut state);
        assert!(!state.upper_zone_active());

        let bus = loop_.module_mut().bus_mut();
        assert_eq!(bus.remote_device_count(), 6);
        assert_eq!(bus.remote_devices()[0][..2], 0x1172u16.to_le_bytes());
    }

    #[test]
    fn test_seed_sends_startup_telemetry() {
        let mut loop_ = make_loop(MockRangingBus::new(), policy());
        let state = seed_at(&mut loop_, 1000, 1000);

        assert_eq!(state.last_accepted(), Coordinate::new(1000, 1000, 0));
        assert_eq!(state.history().len(), 1);
        let text = String::from_utf8_lossy(loop_.radio().get_ref()).to_string();
        assert!(text.contains("x1000 y1000"));
    }
}
