//! Owner authentication for MediaVault.
//!
//! - `PasscodeAuthenticator`: salted Argon2id passcode verifier in the key store
//! - `LockoutGuard`: persisted failed-attempt counter with timed lockout
//! - `UnlockCoordinator`: serialized check, verify and record; opens the
//!   owner gate on success

pub mod lockout;
pub mod lockout_store;
pub mod outcome;
pub mod passcode;
pub mod record;
pub mod unlock;

pub use lockout::{LockoutGuard, LockoutPolicy, LockoutStatus};
pub use lockout_store::{FileLockoutStore, LockoutState, LockoutStore, MemoryLockoutStore};
pub use outcome::{AuthOutcome, BiometricAuthenticator, FailureReason};
pub use passcode::{PasscodeAuthenticator, PasscodePolicy, PASSCODE_RECORD_ID};
pub use record::PasscodeRecord;
pub use unlock::UnlockCoordinator;
