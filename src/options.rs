//! Session option set: validated once, then frozen.
//!
//! The teacher keeps per-feature config structs (`ProcessConfig`,
//! `RunCommandParams`, ...) as plain `Debug, Clone` structs with `Option`
//! fields and documented defaults; this module follows the same shape for
//! the single, larger option set the spec describes. `change_quit` is the
//! one designed mutation path: rather than mutate a field in place, it hands
//! back a new, independently-frozen `Arc<SessionOptions>`.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

/// What `exec` should do when a command completes with a non-zero exit code
/// and `retrieve_exit_code` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnNonZeroExitCode {
    #[default]
    Ignore,
    Raise,
}

/// How the input queue chunks outbound bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnbufferedInput {
    /// Queue whole chunks as given.
    #[default]
    None,
    /// Split into single-character chunks.
    Char,
    /// Split into single-character chunks, and withhold the next character
    /// until the assembler has observed the previous one echoed back.
    Echo,
}

/// Transport-specific fields.
#[derive(Debug, Clone)]
pub enum TransportOptions {
    Ssh {
        host: String,
        port: u16,
        user: String,
        password: Option<String>,
        /// `:shell` (login shell), `:none` (PTY only, no command), `:no_pty`
        /// (neither PTY nor shell request — raw `exec`), or an explicit
        /// executable path.
        shell: SshShellMode,
        connect_timeout: Duration,
    },
    Serial {
        path: String,
        speed: u32,
        data_bits: u8,
        parity: SerialParity,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SshShellMode {
    LoginShell,
    PtyOnly,
    NoPty,
    Exec(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerialParity {
    #[default]
    None,
    Even,
    Odd,
}

/// Builder for [`SessionOptions`]: every field optional with a documented
/// default, validated in one place.
#[derive(Debug, Clone)]
pub struct SessionOptionsBuilder {
    prompt: String,
    line_ending: String,
    retrieve_exit_code: bool,
    on_non_zero_exit_code: OnNonZeroExitCode,
    silence_timeout: Duration,
    command_timeout: Duration,
    unbuffered_input: UnbufferedInput,
    quit: String,
    transport: Option<TransportOptions>,
}

impl Default for SessionOptionsBuilder {
    fn default() -> Self {
        Self {
            prompt: "~~#".to_string(),
            line_ending: "\n".to_string(),
            retrieve_exit_code: false,
            on_non_zero_exit_code: OnNonZeroExitCode::Ignore,
            silence_timeout: Duration::ZERO,
            command_timeout: Duration::ZERO,
            unbuffered_input: UnbufferedInput::None,
            quit: "exit".to_string(),
            transport: None,
        }
    }
}

impl SessionOptionsBuilder {
    #[must_use]
    pub fn new(transport: TransportOptions) -> Self {
        Self {
            transport: Some(transport),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn line_ending(mut self, line_ending: impl Into<String>) -> Self {
        self.line_ending = line_ending.into();
        self
    }

    #[must_use]
    pub fn retrieve_exit_code(mut self, retrieve: bool) -> Self {
        self.retrieve_exit_code = retrieve;
        self
    }

    #[must_use]
    pub fn on_non_zero_exit_code(mut self, policy: OnNonZeroExitCode) -> Self {
        self.on_non_zero_exit_code = policy;
        self
    }

    #[must_use]
    pub fn silence_timeout(mut self, secs: u64) -> Self {
        self.silence_timeout = Duration::from_secs(secs);
        self
    }

    #[must_use]
    pub fn command_timeout(mut self, secs: u64) -> Self {
        self.command_timeout = Duration::from_secs(secs);
        self
    }

    #[must_use]
    pub fn unbuffered_input(mut self, mode: UnbufferedInput) -> Self {
        self.unbuffered_input = mode;
        self
    }

    #[must_use]
    pub fn quit(mut self, quit: impl Into<String>) -> Self {
        self.quit = quit.into();
        self
    }

    /// Validate and freeze: recognised keys, bad/missing
    /// required fields surface immediately.
    pub fn build(self) -> Result<SessionOptions> {
        let transport = self
            .transport
            .ok_or_else(|| Error::InvalidOption("a transport configuration is required".into()))?;

        match &transport {
            TransportOptions::Ssh { user, connect_timeout, .. } => {
                if user.trim().is_empty() {
                    return Err(Error::InvalidOption("ssh: `user` must not be empty".into()));
                }
                if *connect_timeout == Duration::ZERO {
                    return Err(Error::InvalidOption(
                        "ssh: `connect_timeout` must be greater than zero".into(),
                    ));
                }
            }
            TransportOptions::Serial { path, speed, .. } => {
                if path.trim().is_empty() {
                    return Err(Error::InvalidOption("serial: `path` must not be empty".into()));
                }
                if *speed == 0 {
                    return Err(Error::InvalidOption("serial: `speed` must be greater than zero".into()));
                }
            }
        }

        let sanitized_prompt = crate::prompt::sanitize_prompt(&self.prompt);

        Ok(SessionOptions {
            inner: Arc::new(FrozenOptions {
                prompt: sanitized_prompt,
                line_ending: self.line_ending,
                retrieve_exit_code: self.retrieve_exit_code,
                on_non_zero_exit_code: self.on_non_zero_exit_code,
                silence_timeout: self.silence_timeout,
                command_timeout: self.command_timeout,
                unbuffered_input: self.unbuffered_input,
                quit: self.quit,
                transport,
            }),
        })
    }
}

/// The immutable option map, reachable only through an `Arc`: the only way to change a field after
/// validation is [`SessionOptions::change_quit`], which swaps the `Arc` for a
/// new one rather than mutating in place.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    inner: Arc<FrozenOptions>,
}

#[derive(Debug)]
struct FrozenOptions {
    prompt: String,
    line_ending: String,
    retrieve_exit_code: bool,
    on_non_zero_exit_code: OnNonZeroExitCode,
    silence_timeout: Duration,
    command_timeout: Duration,
    unbuffered_input: UnbufferedInput,
    quit: String,
    transport: TransportOptions,
}

impl SessionOptions {
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.inner.prompt
    }

    #[must_use]
    pub fn line_ending(&self) -> &str {
        &self.inner.line_ending
    }

    #[must_use]
    pub fn retrieve_exit_code(&self) -> bool {
        self.inner.retrieve_exit_code
    }

    #[must_use]
    pub fn on_non_zero_exit_code(&self) -> OnNonZeroExitCode {
        self.inner.on_non_zero_exit_code
    }

    #[must_use]
    pub fn silence_timeout(&self) -> Duration {
        self.inner.silence_timeout
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        self.inner.command_timeout
    }

    #[must_use]
    pub fn unbuffered_input(&self) -> UnbufferedInput {
        self.inner.unbuffered_input
    }

    #[must_use]
    pub fn quit(&self) -> &str {
        &self.inner.quit
    }

    #[must_use]
    pub fn transport(&self) -> &TransportOptions {
        &self.inner.transport
    }

    /// Atomically replace the quit command with a new immutable option map.
    /// Used by the device dialect's `RestartNow` recovery path to swap
    /// `quit` for a reboot command without mutating shared state in place.
    #[must_use]
    pub fn change_quit(&self, new_quit: impl Into<String>) -> Self {
        let mut next = FrozenOptions {
            prompt: self.inner.prompt.clone(),
            line_ending: self.inner.line_ending.clone(),
            retrieve_exit_code: self.inner.retrieve_exit_code,
            on_non_zero_exit_code: self.inner.on_non_zero_exit_code,
            silence_timeout: self.inner.silence_timeout,
            command_timeout: self.inner.command_timeout,
            unbuffered_input: self.inner.unbuffered_input,
            quit: self.inner.quit.clone(),
            transport: self.inner.transport.clone(),
        };
        next.quit = new_quit.into();
        Self { inner: Arc::new(next) }
    }
}
