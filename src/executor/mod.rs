//! # Execution
//!
//! The two nested control loops that turn plans into API calls:
//!
//! - [`ExecutionManager`] runs one plan action-by-action with cooldown-aware
//!   dispatch, subgoal injection, and selective replanning.
//! - [`MissionExecutor`] is the outer loop: select a goal, plan, execute,
//!   assess progress, and go again until the mission objective is satisfied
//!   or the iteration budget runs out.
//!
//! Both poll a shared [`CancelToken`] at loop heads and after suspension
//! points; cancellation unwinds without rollback — partial progress stays.

mod cooldown;
mod execution;
mod mission;

pub use cooldown::CooldownManager;
pub use execution::{ExecutionManager, ExecutionOutcome};
pub use mission::{MissionExecutor, MissionParameters};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between the mission loops and
/// whatever owns the mission (signal handler, supervisor task).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
