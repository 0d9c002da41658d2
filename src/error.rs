//! Error taxonomy for the prompted command driver.
//!
//! The teacher crate (`agentsh`) returns `Result<T, String>` from almost every
//! fallible operation. That collapses too much for a driver that dialects and
//! callers need to pattern-match on (a `NonZeroExitCode` needs its code; a
//! `SilenceTimeout` needs to be distinguishable from a `CommandTimeout` so a
//! caller can retry one and not the other). The rest of the retrieved pack
//! reaches for `thiserror` for exactly this job, so this crate does too.

use thiserror::Error;

/// Everything that can go wrong driving a session, including the spec's named
/// exception sentinels (§6).
#[derive(Debug, Error)]
pub enum Error {
    /// A transport-level failure (connect refused, PTY unavailable, I/O lost
    /// mid-stream). Carries the transport's own error message since the core
    /// treats transports as an external collaborator and does
    /// not know their concrete error types.
    #[error("transport error: {0}")]
    Transport(String),

    /// Thrown by `run()` setup when the PTY could not be requested.
    #[error("failed to request a pseudo-terminal")]
    FailedToRequestPty,

    /// Thrown by `run()` setup when the remote shell would not start.
    #[error("failed to start shell")]
    FailedToStartShell,

    /// Thrown by `run()` setup when the initial prompt was never observed.
    #[error("failed to set prompt")]
    FailedToSetPrompt,

    /// An option failed validation in the constructor.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// `exec` (or another public operation) was called before `run` reached
    /// the running state, or after the session was torn down mid-script.
    #[error("session is not running")]
    NotRunning,

    /// `run` was called on a session that is already running.
    #[error("session is already running")]
    AlreadyRunning,

    /// A public operation was called on a session that already finished
    /// (normally or with an error). Sessions are single-use.
    #[error("session has already completed")]
    SessionCompleted,

    /// The combined buffer grew without ever producing a prompt match; the
    /// driver gave up rather than buffer forever.
    #[error("prompt pattern never matched before giving up")]
    PromptTooLong,

    /// `exec`'s absolute `command_timeout` elapsed before the prompt matched.
    #[error("command timed out")]
    CommandTimeout,

    /// Three nudges elapsed with no new output from the remote shell.
    #[error("silence timeout: no output for the configured silence window")]
    SilenceTimeout,

    /// `exec` observed a non-zero exit code while `on_non_zero_exit_code` was
    /// configured to `raise`.
    #[error("command exited with non-zero status {0}")]
    NonZeroExitCode(i32),

    /// Silent unwind sentinel: user script code raises this to request an
    /// immediate, quiet teardown. `run` swallows it rather than propagating
    /// it to the caller as a failure.
    #[error("quit requested")]
    QuitNow,

    /// Dialect-defined sentinel (the device dialect's nested-interpreter
    /// recovery path): raised by user code, caught by an `on_exception`
    /// hook which swaps `quit` to a reboot command and reports the
    /// exception as handled.
    #[error("restart requested")]
    RestartNow,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
