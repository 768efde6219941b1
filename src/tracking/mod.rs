//! Tracking state, zone plan and the positioning control loop

pub mod runner;
pub mod state;
pub mod zones;

pub use runner::{ControlLoop, CycleReport, LoopSettings};
pub use state::{BayExtent, CycleOutcome, MotionPolicy, PositionHistory, TrackingState};
pub use zones::{Zone, ZonePlan};
