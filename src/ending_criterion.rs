use crate::simulator::Termination;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Decides when a run stops before reaching its end time.
///
/// Criteria are consulted between events (or integration steps), never in
/// the middle of one.
pub trait EndingCriterion: Send {
    /// Why the run should stop, if it should.
    fn should_end(&self) -> Option<Termination>;
    fn initialize(&mut self, start_time: f64);
    /// Called after every event or accepted integration step.
    fn update(&mut self, time: f64);
}

mod event_count;
pub use event_count::*;

mod cancellation;
pub use cancellation::*;

/// The first reason any of `criteria` gives for stopping.
pub fn should_end(criteria: &[Box<dyn EndingCriterion>]) -> Option<Termination> {
    criteria.iter().find_map(|criterion| criterion.should_end())
}
