//! Categorized error type for the command dispatch boundary.
//!
//! Internals use `anyhow::Result` for ergonomic `?`-propagation; this type
//! exists only at the seam between a component and the subcommand driver,
//! where a diagnostic has to be classified into an exit code.

use std::fmt;

#[derive(Debug)]
pub enum CoreError {
    /// Bad arguments, unknown target, caller not permitted, missing wrapper
    /// signature. No privileged side effect has occurred.
    Invocation(String),
    /// A privileged syscall failed during mount/chroot/exec/identity
    /// propagation. Side effects already performed are left in place.
    Runtime(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Invocation(msg) => write!(f, "{}", msg),
            CoreError::Runtime(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CoreError {}

/// Exit code for `CoreError::Invocation`.
pub const INVOCATION_EXIT_CODE: i32 = 1;
/// Exit code for `CoreError::Runtime`.
pub const RUNTIME_EXIT_CODE: i32 = 2;

impl CoreError {
    pub fn invocation<S: Into<String>>(msg: S) -> Self {
        CoreError::Invocation(msg.into())
    }

    pub fn runtime<S: Into<String>>(msg: S) -> Self {
        CoreError::Runtime(msg.into())
    }

    /// Process exit code this error maps to. Distinct from the exit status
    /// of a user command executed under `run`/`login`, which passes through
    /// unchanged.
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::Invocation(_) => INVOCATION_EXIT_CODE,
            CoreError::Runtime(_) => RUNTIME_EXIT_CODE,
        }
    }
}

/// Builds an `anyhow::Error` that `main`'s classifier will map to
/// [`INVOCATION_EXIT_CODE`] instead of its default runtime classification.
pub fn invocation_err<S: Into<String>>(msg: S) -> anyhow::Error {
    anyhow::Error::new(CoreError::invocation(msg.into()))
}

/// A condition that can only mean a programming bug (nested privilege
/// re-raise, a check-then-act inconsistency). There is no safe way to
/// continue, so the process is terminated immediately rather than
/// returning a `CoreError` that a caller might try to recover from.
pub fn fatal(msg: &str) -> ! {
    log::error!("fatal: {msg}");
    std::process::abort()
}
