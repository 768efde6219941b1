//! Tracking state and sample acceptance policy
//!
//! One `TrackingState` instance carries everything the control loop knows
//! between cycles: the last accepted fix, the stationary and failed-read
//! counters, the active anchor zone and a short position history. The
//! accept/reject policy lives here as pure state transitions so it can be
//! tested without a bus.

use crate::core::Coordinate;

/// Depth of the recent-position ring
pub const HISTORY_CAPACITY: usize = 10;

/// Fixed-capacity record of recent accepted fixes, most recent at index 0.
#[derive(Debug, Clone)]
pub struct PositionHistory {
    entries: [Coordinate; HISTORY_CAPACITY],
    len: usize,
}

impl PositionHistory {
    pub fn new() -> Self {
        Self {
            entries: [Coordinate::default(); HISTORY_CAPACITY],
            len: 0,
        }
    }

    /// Insert at the front, discarding the oldest entry when full.
    pub fn push(&mut self, position: Coordinate) {
        let keep = self.len.min(HISTORY_CAPACITY - 1);
        for i in (0..keep).rev() {
            self.entries[i + 1] = self.entries[i];
        }
        self.entries[0] = position;
        self.len = (self.len + 1).min(HISTORY_CAPACITY);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<Coordinate> {
        (index < self.len).then(|| self.entries[index])
    }

    pub fn as_slice(&self) -> &[Coordinate] {
        &self.entries[..self.len]
    }
}

impl Default for PositionHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Rectangular bay extent in millimeters.
#[derive(Debug, Clone, Copy)]
pub struct BayExtent {
    pub x_min: i32,
    pub x_max: i32,
    pub y_min: i32,
    pub y_max: i32,
}

impl BayExtent {
    /// Whether a fix lies inside the bay expanded by `tolerance` on every side.
    pub fn contains(&self, position: Coordinate, tolerance: i32) -> bool {
        position.x <= self.x_max + tolerance
            && position.x >= self.x_min - tolerance
            && position.y <= self.y_max + tolerance
            && position.y >= self.y_min - tolerance
    }
}

/// Sample acceptance thresholds. All values come from configuration; see
/// the `[tracking]` and `[bay]` sections.
#[derive(Debug, Clone, Copy)]
pub struct MotionPolicy {
    /// Below this per-axis delta the tag counts as stationary
    pub stationary_mm: i32,
    /// Deltas between the stationary threshold and this bound still count
    /// as stationary (band kept from the commissioned system)
    pub minor_movement_mm: i32,
    /// Largest credible per-axis travel per elapsed read interval
    pub max_travel_per_read_mm: i32,
    /// Consecutive stationary reads before telemetry drops to heartbeats
    pub stationary_cap: u8,
    /// Bay rectangle
    pub bay: BayExtent,
    /// Slack added around the bay before a fix counts as out of bounds
    pub boundary_tolerance_mm: i32,
}

/// Outcome of evaluating one position sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Accepted,
    /// Jump larger than the travel budget; `last_accepted` untouched
    RejectedImplausible,
    /// Fix outside the expanded bay; `last_accepted` updated regardless
    RejectedOutOfBounds,
}

/// Persistent control-loop state, created from the first successful fix.
#[derive(Debug, Clone)]
pub struct TrackingState {
    last_accepted: Coordinate,
    stationary_reads: u8,
    failed_reads: u32,
    upper_zone_active: bool,
    history: PositionHistory,
}

impl TrackingState {
    /// Seed from the first fix obtained at startup.
    pub fn seed(first_fix: Coordinate) -> Self {
        let mut history = PositionHistory::new();
        history.push(first_fix);
        Self {
            last_accepted: first_fix,
            stationary_reads: 0,
            failed_reads: 1,
            upper_zone_active: false,
            history,
        }
    }

    pub fn last_accepted(&self) -> Coordinate {
        self.last_accepted
    }

    pub fn stationary_reads(&self) -> u8 {
        self.stationary_reads
    }

    pub fn failed_reads(&self) -> u32 {
        self.failed_reads
    }

    pub fn history(&self) -> &PositionHistory {
        &self.history
    }

    pub fn upper_zone_active(&self) -> bool {
        self.upper_zone_active
    }

    pub fn set_upper_zone_active(&mut self, active: bool) {
        self.upper_zone_active = active;
    }

    fn bump_stationary(&mut self, cap: u8) {
        if self.stationary_reads < cap {
            self.stationary_reads += 1;
        }
    }

    /// Classify a fresh sample against the policy.
    ///
    /// The stationary counter is updated by the motion classification before
    /// the plausibility and boundary checks run, so a later rejection keeps
    /// the classification's effect. This ordering matches the commissioned
    /// behavior and the two rejection branches deliberately differ in
    /// whether `last_accepted` moves.
    pub fn evaluate(&mut self, sample: Coordinate, policy: &MotionPolicy) -> CycleOutcome {
        let dx = (sample.x - self.last_accepted.x).abs();
        let dy = (sample.y - self.last_accepted.y).abs();

        if dx < policy.stationary_mm && dy < policy.stationary_mm {
            self.bump_stationary(policy.stationary_cap);
        } else if dx < policy.minor_movement_mm && dy < policy.minor_movement_mm {
            // moved past the stationary threshold but not far enough to
            // count as real movement
            self.bump_stationary(policy.stationary_cap);
        } else {
            self.stationary_reads = 0;
        }

        let budget = policy.max_travel_per_read_mm as i64 * self.failed_reads as i64;
        if dx as i64 > budget || dy as i64 > budget {
            self.failed_reads += 1;
            return CycleOutcome::RejectedImplausible;
        }

        if !policy.bay.contains(sample, policy.boundary_tolerance_mm) {
            self.failed_reads += 1;
            self.last_accepted = sample;
            return CycleOutcome::RejectedOutOfBounds;
        }

        CycleOutcome::Accepted
    }

    /// Record an accepted sample: update the last fix and history and reset
    /// the failed-read counter to its baseline.
    pub fn commit(&mut self, sample: Coordinate) {
        self.last_accepted = sample;
        self.history.push(sample);
        self.failed_reads = 1;
    }

    /// Whether the stationary counter has reached the heartbeat threshold.
    pub fn stationary_capped(&self, policy: &MotionPolicy) -> bool {
        self.stationary_reads >= policy.stationary_cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_history_ring_evicts_oldest() {
        let mut history = PositionHistory::new();
        for i in 0..11 {
            history.push(Coordinate::new(i, 0, 0));
        }

        assert_eq!(history.len(), HISTORY_CAPACITY);
        // most recent first, the very first sample is gone
        assert_eq!(history.get(0).unwrap().x, 10);
        assert_eq!(history.get(9).unwrap().x, 1);
        assert!(history.get(10).is_none());
    }

    #[test]
    fn test_zero_delta_is_stationary() {
        let mut state = TrackingState::seed(Coordinate::new(1000, 1000, 0));
        let outcome = state.evaluate(Coordinate::new(1000, 1000, 0), &policy());
        assert_eq!(outcome, CycleOutcome::Accepted);
        assert_eq!(state.stationary_reads(), 1);
    }

    #[test]
    fn test_clear_movement_resets_stationary_counter() {
        let mut state = TrackingState::seed(Coordinate::new(1000, 1000, 0));
        // build up a stationary streak
        for _ in 0..5 {
            state.evaluate(Coordinate::new(1000, 1000, 0), &policy());
        }
        assert_eq!(state.stationary_reads(), 5);

        let outcome = state.evaluate(Coordinate::new(1500, 1000, 0), &policy());
        assert_eq!(outcome, CycleOutcome::Accepted);
        assert_eq!(state.stationary_reads(), 0);
    }

    #[test]
    fn test_minor_movement_band_still_counts_as_stationary() {
        let mut state = TrackingState::seed(Coordinate::new(1000, 1000, 0));
        // 375 is past the stationary threshold but inside the minor band
        let outcome = state.evaluate(Coordinate::new(1375, 1000, 0), &policy());
        assert_eq!(outcome, CycleOutcome::Accepted);
        assert_eq!(state.stationary_reads(), 1);
    }

    #[test]
    fn test_stationary_counter_saturates_at_cap() {
        let mut p = policy();
        p.stationary_cap = 3;
        let mut state = TrackingState::seed(Coordinate::new(1000, 1000, 0));
        for _ in 0..10 {
            state.evaluate(Coordinate::new(1000, 1000, 0), &p);
        }
        assert_eq!(state.stationary_reads(), 3);
        assert!(state.stationary_capped(&p));
    }

    #[test]
    fn test_implausible_jump_rejected_without_moving_last_accepted() {
        let mut state = TrackingState::seed(Coordinate::new(1000, 1000, 0));
        assert_eq!(state.failed_reads(), 1);

        let outcome = state.evaluate(Coordinate::new(3500, 1000, 0), &policy());
        assert_eq!(outcome, CycleOutcome::RejectedImplausible);
        assert_eq!(state.failed_reads(), 2);
        assert_eq!(state.last_accepted(), Coordinate::new(1000, 1000, 0));
    }

    #[test]
    fn test_travel_budget_scales_with_failed_reads() {
        let mut state = TrackingState::seed(Coordinate::new(1000, 1000, 0));
        // first failure doubles the budget
        state.evaluate(Coordinate::new(3500, 1000, 0), &policy());
        assert_eq!(state.failed_reads(), 2);

        // 2500 mm is within 2 x 2000 mm, so the same jump now passes
        let outcome = state.evaluate(Coordinate::new(3500, 1000, 0), &policy());
        assert_eq!(outcome, CycleOutcome::Accepted);
    }

    #[test]
    fn test_out_of_bounds_rejected_but_last_accepted_updated() {
        let mut state = TrackingState::seed(Coordinate::new(22000, 1000, 0));
        let rejected = Coordinate::new(21860 + 1500 + 1, 1000, 0);

        let outcome = state.evaluate(rejected, &policy());
        assert_eq!(outcome, CycleOutcome::RejectedOutOfBounds);
        assert_eq!(state.failed_reads(), 2);
        // asymmetry with the implausible branch is intentional
        assert_eq!(state.last_accepted(), rejected);
    }

    #[test]
    fn test_boundary_tolerance_is_inclusive() {
        let mut state = TrackingState::seed(Coordinate::new(22000, 1000, 0));
        let edge = Coordinate::new(21860 + 1500, 1000, 0);
        assert_eq!(state.evaluate(edge, &policy()), CycleOutcome::Accepted);
    }

    #[test]
    fn test_commit_resets_failed_reads_and_records_history() {
        let mut state = TrackingState::seed(Coordinate::new(1000, 1000, 0));
        state.evaluate(Coordinate::new(3500, 1000, 0), &policy());
        assert_eq!(state.failed_reads(), 2);

        let sample = Coordinate::new(1005, 1005, 0);
        assert_eq!(state.evaluate(sample, &policy()), CycleOutcome::Accepted);
        state.commit(sample);

        assert_eq!(state.failed_reads(), 1);
        assert_eq!(state.last_accepted(), sample);
        assert_eq!(state.history().get(0), Some(sample));
        assert_eq!(state.history().len(), 2);
    }
}
