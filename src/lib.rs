//! An interactive shell automation engine: drives a remote line-oriented
//! shell over SSH+PTY or serial, turning raw byte streams into a synchronous
//! `exec(command) -> (output, exit_code)` interface with timeouts,
//! cancellation, nested prompt scoping, and hook points dialects can extend.
//!
//! This crate never installs a `tracing` subscriber; callers wire up their
//! own (`tracing_subscriber`, `tracing-journald`, whatever fits their
//! binary) from their own entry point.

pub mod assembler;
pub mod buffer;
pub mod dialects;
pub mod error;
pub mod hooks;
pub mod options;
pub mod prompt;
pub mod queue;
pub mod session;
pub mod state;
pub mod transport;
pub mod wait;

pub use error::{Error, Result};
pub use hooks::{HookFn, HookName, HookOutcome, HookRegistry};
pub use options::{
    OnNonZeroExitCode, SerialParity, SessionOptions, SessionOptionsBuilder, SshShellMode,
    TransportOptions, UnbufferedInput,
};
pub use session::{
    DefaultExitCodeProbe, DefaultSetup, ExecOptions, ExitCodeProbe, PromptToken, Session, SetupHook,
    UndefinedExitCodeProbe,
};
pub use state::ExitCode;
