//! Brute-force protection for passcode entry.
//!
//! State machine:
//!
//! ```text
//! Unlocked(n) --failure, n+1 < max--> Unlocked(n+1)
//! Unlocked(n) --failure, n+1 = max--> LockedOut(now + duration)
//! LockedOut   --now >= until--------> Unlocked(0)
//! any         --reset---------------> Unlocked(0)
//! ```
//!
//! Every transition is persisted before it becomes visible, so killing the
//! process never clears a lockout or a failure count.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::lockout_store::{LockoutState, LockoutStore};
use mediavault_common::{Clock, Error, Result};

/// Longest lockout a policy may configure.
const MAX_LOCKOUT_SECS: u64 = 365 * 24 * 60 * 60;

/// How many failures are tolerated and for how long they lock entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutPolicy {
    /// Consecutive failures that trigger a lockout.
    pub max_attempts: u32,
    /// Length of a lockout in seconds.
    pub lockout_duration_secs: u64,
}

impl LockoutPolicy {
    /// Validate the policy.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidInput(
                "Lockout max_attempts must be at least 1".to_string(),
            ));
        }
        if self.lockout_duration_secs == 0 || self.lockout_duration_secs > MAX_LOCKOUT_SECS {
            return Err(Error::InvalidInput(format!(
                "Lockout duration must be between 1 and {} seconds",
                MAX_LOCKOUT_SECS
            )));
        }
        Ok(())
    }

    /// Lockout length as a signed duration.
    pub fn lockout_duration(&self) -> Duration {
        Duration::seconds(self.lockout_duration_secs.min(MAX_LOCKOUT_SECS) as i64)
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_duration_secs: 300,
        }
    }
}

/// Snapshot of the guard for display and decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockoutStatus {
    /// Passcode entry is allowed.
    Unlocked {
        failed_attempts: u32,
        remaining_attempts: u32,
    },
    /// Passcode entry is refused until `until`.
    LockedOut {
        until: DateTime<Utc>,
        remaining: std::time::Duration,
    },
}

impl LockoutStatus {
    /// Whether this is a lockout.
    pub fn is_locked_out(&self) -> bool {
        matches!(self, Self::LockedOut { .. })
    }
}

/// Counts failed passcode attempts and enforces the lockout.
///
/// One guard per installation; all operations are serialized internally.
pub struct LockoutGuard {
    policy: LockoutPolicy,
    store: Arc<dyn LockoutStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<LockoutState>,
}

impl LockoutGuard {
    /// Restore the guard from `store`.
    ///
    /// Missing state starts unlocked with zero failures. State that exists
    /// but cannot be parsed starts a full lockout.
    ///
    /// # Errors
    /// - `InvalidInput` if the policy is invalid
    /// - `FileReadError` if the store cannot be read at all
    pub fn load(
        policy: LockoutPolicy,
        store: Arc<dyn LockoutStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        policy.validate()?;

        let state = match store.load() {
            Ok(Some(state)) => state,
            Ok(None) => LockoutState::default(),
            Err(Error::Serialization(reason)) => {
                warn!(%reason, "Lockout state unreadable, starting full lockout");
                let state = LockoutState {
                    failed_attempts: policy.max_attempts,
                    lockout_until: Some(clock.now() + policy.lockout_duration()),
                };
                if let Err(e) = store.save(&state) {
                    warn!(error = %e, "Failed to persist lockout state");
                }
                state
            }
            Err(e) => return Err(e),
        };

        debug!(
            failed_attempts = state.failed_attempts,
            locked = state.lockout_until.is_some(),
            "Lockout guard loaded"
        );

        Ok(Self {
            policy,
            store,
            clock,
            state: Mutex::new(state),
        })
    }

    /// The active policy.
    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    fn lock_state(&self) -> MutexGuard<'_, LockoutState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply time-driven transitions (expiry, clamping) and return the
    /// effective state.
    ///
    /// The in-memory state is updated only once the transition is
    /// persisted. If persisting fails the effective state is still
    /// returned, so an expired lockout is never enforced past its deadline.
    fn refresh(&self, state: &mut LockoutState, now: DateTime<Utc>) -> LockoutState {
        let Some(until) = state.lockout_until else {
            return state.clone();
        };

        let latest = now + self.policy.lockout_duration();
        let next = if now >= until {
            info!("Lockout expired");
            LockoutState::default()
        } else if until > latest {
            // Clock moved backwards; never wait longer than one lockout.
            warn!(%until, clamped = %latest, "Lockout deadline clamped");
            LockoutState {
                failed_attempts: state.failed_attempts,
                lockout_until: Some(latest),
            }
        } else {
            return state.clone();
        };

        match self.store.save(&next) {
            Ok(()) => *state = next.clone(),
            Err(e) => warn!(error = %e, "Failed to persist lockout transition"),
        }
        next
    }

    fn status_of(&self, state: &LockoutState, now: DateTime<Utc>) -> LockoutStatus {
        match state.lockout_until {
            Some(until) if now < until => LockoutStatus::LockedOut {
                until,
                remaining: (until - now).to_std().unwrap_or_default(),
            },
            _ => LockoutStatus::Unlocked {
                failed_attempts: state.failed_attempts,
                remaining_attempts: self
                    .policy
                    .max_attempts
                    .saturating_sub(state.failed_attempts),
            },
        }
    }

    /// Current status, applying expiry first.
    pub fn status(&self) -> LockoutStatus {
        let now = self.clock.now();
        let mut state = self.lock_state();
        let effective = self.refresh(&mut state, now);
        self.status_of(&effective, now)
    }

    /// Whether passcode entry is currently refused.
    pub fn is_locked_out(&self) -> bool {
        self.status().is_locked_out()
    }

    /// Time until the lockout ends; zero when not locked out.
    pub fn remaining_lockout_time(&self) -> std::time::Duration {
        match self.status() {
            LockoutStatus::LockedOut { remaining, .. } => remaining,
            LockoutStatus::Unlocked { .. } => std::time::Duration::ZERO,
        }
    }

    /// Consecutive failures counted so far.
    pub fn failed_attempts(&self) -> u32 {
        let now = self.clock.now();
        let mut state = self.lock_state();
        self.refresh(&mut state, now).failed_attempts
    }

    /// Attempts left before a lockout; zero while locked out.
    pub fn remaining_attempts(&self) -> u32 {
        match self.status() {
            LockoutStatus::Unlocked {
                remaining_attempts, ..
            } => remaining_attempts,
            LockoutStatus::LockedOut { .. } => 0,
        }
    }

    /// Count a failed passcode attempt.
    ///
    /// Attempts made while locked out are not counted and do not extend
    /// the lockout.
    ///
    /// # Returns
    /// The status after the attempt.
    ///
    /// # Errors
    /// - Store errors if the new state cannot be persisted; the in-memory
    ///   state is left unchanged in that case
    pub fn record_failed_attempt(&self) -> Result<LockoutStatus> {
        let now = self.clock.now();
        let mut state = self.lock_state();
        let effective = self.refresh(&mut state, now);

        if effective.lockout_until.is_some() {
            debug!("Failed attempt during lockout ignored");
            return Ok(self.status_of(&effective, now));
        }

        let failed_attempts = effective.failed_attempts.saturating_add(1);
        let next = if failed_attempts >= self.policy.max_attempts {
            LockoutState {
                failed_attempts,
                lockout_until: Some(now + self.policy.lockout_duration()),
            }
        } else {
            LockoutState {
                failed_attempts,
                lockout_until: None,
            }
        };

        self.store.save(&next)?;
        *state = next;

        let status = self.status_of(&state, now);
        match &status {
            LockoutStatus::LockedOut { until, .. } => {
                warn!(failed_attempts, %until, "Passcode entry locked out");
            }
            LockoutStatus::Unlocked {
                remaining_attempts, ..
            } => {
                debug!(failed_attempts, remaining_attempts, "Failed attempt recorded");
            }
        }
        Ok(status)
    }

    /// Clear the failure count and any lockout.
    ///
    /// Called after a successful authentication.
    ///
    /// # Errors
    /// - Store errors; the in-memory state is left unchanged
    pub fn reset_failed_attempts(&self) -> Result<()> {
        let mut state = self.lock_state();
        if *state == LockoutState::default() {
            return Ok(());
        }

        let next = LockoutState::default();
        self.store.save(&next)?;
        *state = next;
        info!("Failed attempts reset");
        Ok(())
    }
}
