//! Temporal state of polls.
//!
//! The state is derived on demand from the stored flags and the current time:
//! there is no scheduler closing polls in the background. A poll whose end
//! time is exactly now is already ended.

use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use parking_lot::Mutex;
use snafu::ensure;

use crate::config::*;
use crate::error::*;

/// The source of the current time.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> ManualClock {
        ManualClock { now: Mutex::new(at) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

pub fn is_active_at(poll: &Poll, now: DateTime<Utc>) -> bool {
    poll.is_active && poll.ends_at.map_or(true, |ends_at| now < ends_at)
}

pub fn outcome_at(poll: &Poll, now: DateTime<Utc>) -> Outcome {
    if is_active_at(poll, now) {
        Outcome::Active
    } else if matches!(poll.ends_at, Some(ends_at) if ends_at <= now) {
        Outcome::Expired
    } else {
        Outcome::Completed
    }
}

/// Applies a flag update to a poll, refusing any change that would bring an
/// ended poll back to life.
pub fn apply_flags_at(poll: &Poll, update: &FlagUpdate, now: DateTime<Utc>) -> PollResult<Poll> {
    let mut next = poll.clone();
    if !is_active_at(poll, now) {
        ensure!(
            update.is_active != Some(true),
            ValidationSnafu {
                reason: format!("poll {} has ended and cannot be reopened", poll.id),
            }
        );
        ensure!(
            update.ends_at.is_none(),
            ValidationSnafu {
                reason: format!("poll {} has ended and cannot be rescheduled", poll.id),
            }
        );
    }
    if let Some(is_active) = update.is_active {
        next.is_active = is_active;
    }
    if let Some(ends_at) = update.ends_at {
        next.ends_at = Some(ends_at);
    }
    debug!(
        "apply_flags_at: poll {}: {:?} -> {:?}",
        poll.id,
        outcome_at(poll, now),
        outcome_at(&next, now)
    );
    Ok(next)
}

/// Evaluates lifecycle rules against a shared clock.
#[derive(Debug, Clone)]
pub struct LifecycleManager {
    clock: Arc<dyn Clock>,
}

impl LifecycleManager {
    pub fn new(clock: Arc<dyn Clock>) -> LifecycleManager {
        LifecycleManager { clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_active(&self, poll: &Poll) -> bool {
        is_active_at(poll, self.now())
    }

    pub fn state(&self, poll: &Poll) -> LifecycleState {
        self.outcome(poll).state()
    }

    pub fn outcome(&self, poll: &Poll) -> Outcome {
        outcome_at(poll, self.now())
    }

    pub fn check_flags(&self, poll: &Poll, update: &FlagUpdate) -> PollResult<Poll> {
        apply_flags_at(poll, update, self.now())
    }
}
