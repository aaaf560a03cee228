//! Authentication results and the biometric seam.

use std::fmt;
use std::time::Duration;

/// Why an authentication attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Wrong passcode; `remaining_attempts` before a lockout.
    IncorrectPasscode { remaining_attempts: u32 },
    /// Passcode entry is locked out for `remaining`.
    LockedOut { remaining: Duration },
    /// No passcode has been configured.
    PasscodeNotSet,
    /// The platform rejected the biometric.
    BiometricRejected,
    /// No biometric hardware or enrollment.
    BiometricUnavailable,
    /// The user dismissed the prompt.
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncorrectPasscode { remaining_attempts } => write!(
                f,
                "Incorrect passcode ({} attempts remaining)",
                remaining_attempts
            ),
            Self::LockedOut { remaining } => {
                let secs = remaining.as_secs();
                write!(f, "Too many attempts, try again in {}m {:02}s", secs / 60, secs % 60)
            }
            Self::PasscodeNotSet => f.write_str("No passcode is set"),
            Self::BiometricRejected => f.write_str("Biometric not recognized"),
            Self::BiometricUnavailable => f.write_str("Biometric authentication unavailable"),
            Self::Cancelled => f.write_str("Authentication cancelled"),
        }
    }
}

/// Result of an unlock attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated,
    Failed(FailureReason),
}

impl AuthOutcome {
    /// Whether the owner was authenticated.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }
}

/// Platform biometric prompt.
///
/// Implementations report only whether the owner was recognized; they
/// never hand out biometric data.
pub trait BiometricAuthenticator: Send + Sync {
    /// Whether biometrics can be used right now.
    fn is_available(&self) -> bool;

    /// Prompt the owner, showing `reason`.
    fn authenticate(&self, reason: &str) -> AuthOutcome;
}
