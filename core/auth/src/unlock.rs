//! Fused unlock flow.
//!
//! `PasscodeAuthenticator` and `LockoutGuard` are independent primitives.
//! Callers that sequence them by hand can race: two threads may both pass
//! the lockout check before either records its failure. The coordinator
//! runs check, verify and record as one serialized step.

use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::lockout::{LockoutGuard, LockoutStatus};
use crate::outcome::{AuthOutcome, BiometricAuthenticator, FailureReason};
use crate::passcode::PasscodeAuthenticator;
use mediavault_common::Result;
use mediavault_keystore::OwnerGate;

/// Runs unlock attempts against the passcode and lockout primitives and
/// opens the owner gate on success.
pub struct UnlockCoordinator {
    passcodes: Arc<PasscodeAuthenticator>,
    lockout: Arc<LockoutGuard>,
    gate: Arc<OwnerGate>,
    serial: Mutex<()>,
}

impl UnlockCoordinator {
    /// Create a coordinator over the given primitives and gate.
    pub fn new(
        passcodes: Arc<PasscodeAuthenticator>,
        lockout: Arc<LockoutGuard>,
        gate: Arc<OwnerGate>,
    ) -> Self {
        Self {
            passcodes,
            lockout,
            gate,
            serial: Mutex::new(()),
        }
    }

    /// Get the passcode authenticator.
    pub fn passcodes(&self) -> &Arc<PasscodeAuthenticator> {
        &self.passcodes
    }

    /// Get the lockout guard.
    pub fn lockout(&self) -> &Arc<LockoutGuard> {
        &self.lockout
    }

    /// Get the owner gate.
    pub fn gate(&self) -> &Arc<OwnerGate> {
        &self.gate
    }

    fn locked_out(&self) -> Option<AuthOutcome> {
        match self.lockout.status() {
            LockoutStatus::LockedOut { remaining, .. } => {
                debug!(remaining_secs = remaining.as_secs(), "Unlock refused during lockout");
                Some(AuthOutcome::Failed(FailureReason::LockedOut { remaining }))
            }
            LockoutStatus::Unlocked { .. } => None,
        }
    }

    fn authenticated(&self) -> Result<AuthOutcome> {
        self.lockout.reset_failed_attempts()?;
        self.gate.open();
        Ok(AuthOutcome::Authenticated)
    }

    /// Try to unlock with a passcode.
    ///
    /// # Postconditions
    /// - While locked out the passcode is not checked and nothing is counted
    /// - A mismatch is recorded before this returns
    /// - A match resets the failure count and opens the owner gate
    ///
    /// # Errors
    /// - Key store or lockout store failures
    pub fn unlock_with_passcode(&self, candidate: &str) -> Result<AuthOutcome> {
        let _serial = self.serial.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(outcome) = self.locked_out() {
            return Ok(outcome);
        }
        if !self.passcodes.has_passcode()? {
            return Ok(AuthOutcome::Failed(FailureReason::PasscodeNotSet));
        }

        if self.passcodes.verify_passcode(candidate)? {
            info!("Unlocked with passcode");
            return self.authenticated();
        }

        let reason = match self.lockout.record_failed_attempt()? {
            LockoutStatus::LockedOut { remaining, .. } => FailureReason::LockedOut { remaining },
            LockoutStatus::Unlocked {
                remaining_attempts, ..
            } => FailureReason::IncorrectPasscode { remaining_attempts },
        };
        Ok(AuthOutcome::Failed(reason))
    }

    /// Try to unlock with the platform biometric prompt.
    ///
    /// Refused while passcode entry is locked out. Biometric rejections are
    /// not counted against the passcode lockout; the platform rate-limits
    /// its own prompt.
    pub fn unlock_with_biometrics(
        &self,
        biometrics: &dyn BiometricAuthenticator,
        reason: &str,
    ) -> Result<AuthOutcome> {
        let _serial = self.serial.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(outcome) = self.locked_out() {
            return Ok(outcome);
        }
        if !biometrics.is_available() {
            return Ok(AuthOutcome::Failed(FailureReason::BiometricUnavailable));
        }

        match biometrics.authenticate(reason) {
            AuthOutcome::Authenticated => {
                info!("Unlocked with biometrics");
                self.authenticated()
            }
            failed => {
                debug!(?failed, "Biometric unlock failed");
                Ok(failed)
            }
        }
    }

    /// Close the owner gate.
    pub fn lock(&self) {
        self.gate.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockout::LockoutPolicy;
    use crate::lockout_store::MemoryLockoutStore;
    use crate::passcode::PasscodePolicy;
    use mediavault_common::ManualClock;
    use mediavault_crypto::KdfParams;
    use mediavault_keystore::MemoryKeyStore;
    use std::time::Duration;

    struct FakeBiometrics {
        available: bool,
        outcome: AuthOutcome,
    }

    impl BiometricAuthenticator for FakeBiometrics {
        fn is_available(&self) -> bool {
            self.available
        }

        fn authenticate(&self, _reason: &str) -> AuthOutcome {
            self.outcome.clone()
        }
    }

    fn coordinator() -> (Arc<ManualClock>, UnlockCoordinator) {
        let clock = Arc::new(ManualClock::default());
        let kdf = KdfParams {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        };
        let passcodes = PasscodeAuthenticator::new(
            Arc::new(MemoryKeyStore::new()),
            PasscodePolicy::default(),
            kdf,
        )
        .unwrap();
        let lockout = LockoutGuard::load(
            LockoutPolicy::default(),
            Arc::new(MemoryLockoutStore::new()),
            clock.clone(),
        )
        .unwrap();
        let gate = OwnerGate::new(chrono::Duration::seconds(300), clock.clone());

        let coordinator =
            UnlockCoordinator::new(Arc::new(passcodes), Arc::new(lockout), Arc::new(gate));
        (clock, coordinator)
    }

    #[test]
    fn test_unlock_with_correct_passcode() {
        let (_, unlock) = coordinator();
        unlock.passcodes().set_passcode("123456").unwrap();

        let outcome = unlock.unlock_with_passcode("123456").unwrap();
        assert_eq!(outcome, AuthOutcome::Authenticated);
        assert!(unlock.gate().is_open());
    }

    #[test]
    fn test_unlock_without_passcode() {
        let (_, unlock) = coordinator();

        let outcome = unlock.unlock_with_passcode("123456").unwrap();
        assert_eq!(outcome, AuthOutcome::Failed(FailureReason::PasscodeNotSet));
        assert_eq!(unlock.lockout().failed_attempts(), 0);
    }

    #[test]
    fn test_wrong_passcode_counts_down_then_locks() {
        let (_, unlock) = coordinator();
        unlock.passcodes().set_passcode("123456").unwrap();

        for remaining_attempts in (1..5).rev() {
            assert_eq!(
                unlock.unlock_with_passcode("000000").unwrap(),
                AuthOutcome::Failed(FailureReason::IncorrectPasscode { remaining_attempts })
            );
        }
        assert_eq!(
            unlock.unlock_with_passcode("000000").unwrap(),
            AuthOutcome::Failed(FailureReason::LockedOut {
                remaining: Duration::from_secs(300)
            })
        );

        // The right passcode is not even checked while locked out.
        let outcome = unlock.unlock_with_passcode("123456").unwrap();
        assert!(matches!(
            outcome,
            AuthOutcome::Failed(FailureReason::LockedOut { .. })
        ));
        assert!(!unlock.gate().is_open());
        assert_eq!(unlock.lockout().failed_attempts(), 5);
    }

    #[test]
    fn test_unlock_after_lockout_expires() {
        let (clock, unlock) = coordinator();
        unlock.passcodes().set_passcode("1234").unwrap();
        for _ in 0..5 {
            unlock.unlock_with_passcode("9999").unwrap();
        }

        clock.advance(chrono::Duration::seconds(301));
        assert_eq!(
            unlock.unlock_with_passcode("1234").unwrap(),
            AuthOutcome::Authenticated
        );
    }

    #[test]
    fn test_success_resets_failures() {
        let (_, unlock) = coordinator();
        unlock.passcodes().set_passcode("1234").unwrap();
        unlock.unlock_with_passcode("0000").unwrap();
        unlock.unlock_with_passcode("0000").unwrap();

        unlock.unlock_with_passcode("1234").unwrap();
        assert_eq!(unlock.lockout().failed_attempts(), 0);
    }

    #[test]
    fn test_concurrent_wrong_attempts_never_exceed_max() {
        let (_, unlock) = coordinator();
        unlock.passcodes().set_passcode("1234").unwrap();

        std::thread::scope(|scope| {
            for _ in 0..10 {
                scope.spawn(|| unlock.unlock_with_passcode("0000").unwrap());
            }
        });

        assert!(unlock.lockout().is_locked_out());
        assert_eq!(unlock.lockout().failed_attempts(), 5);
    }

    #[test]
    fn test_biometric_unlock() {
        let (_, unlock) = coordinator();
        let biometrics = FakeBiometrics {
            available: true,
            outcome: AuthOutcome::Authenticated,
        };

        let outcome = unlock.unlock_with_biometrics(&biometrics, "Open vault").unwrap();
        assert!(outcome.is_authenticated());
        assert!(unlock.gate().is_open());

        unlock.lock();
        assert!(!unlock.gate().is_open());
    }

    #[test]
    fn test_biometric_unavailable_and_rejected() {
        let (_, unlock) = coordinator();

        let unavailable = FakeBiometrics {
            available: false,
            outcome: AuthOutcome::Authenticated,
        };
        assert_eq!(
            unlock.unlock_with_biometrics(&unavailable, "Open vault").unwrap(),
            AuthOutcome::Failed(FailureReason::BiometricUnavailable)
        );

        let rejected = FakeBiometrics {
            available: true,
            outcome: AuthOutcome::Failed(FailureReason::BiometricRejected),
        };
        assert_eq!(
            unlock.unlock_with_biometrics(&rejected, "Open vault").unwrap(),
            AuthOutcome::Failed(FailureReason::BiometricRejected)
        );
        assert_eq!(unlock.lockout().failed_attempts(), 0);
        assert!(!unlock.gate().is_open());
    }

    #[test]
    fn test_biometric_refused_while_locked_out() {
        let (_, unlock) = coordinator();
        unlock.passcodes().set_passcode("1234").unwrap();
        for _ in 0..5 {
            unlock.unlock_with_passcode("0000").unwrap();
        }

        let biometrics = FakeBiometrics {
            available: true,
            outcome: AuthOutcome::Authenticated,
        };
        let outcome = unlock.unlock_with_biometrics(&biometrics, "Open vault").unwrap();
        assert!(matches!(
            outcome,
            AuthOutcome::Failed(FailureReason::LockedOut { .. })
        ));
    }
}
