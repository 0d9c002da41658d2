//! Shared runtime state: everything the reactor strand mutates
//! as bytes arrive and the worker strand mutates as it calls `exec`, held
//! behind the session's single mutex.

use std::time::Instant;

use crate::buffer::BufferStack;
use crate::options::{SessionOptions, UnbufferedInput};
use crate::prompt::PromptMatcher;
use crate::queue::InputQueue;

/// Which stream a chunk of inbound bytes arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// `last_exit_code`: either unset, a parsed integer, or one of
/// the two sentinels a dialect or a timeout can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitCode {
    #[default]
    None,
    Code(i32),
    /// The dialect in use cannot retrieve exit codes.
    Undefined,
    /// `exec`'s wait timed out before the exit-code query completed.
    Timeout,
}

/// A user-installed output monitor: sees every chunk of
/// text before it's queued, and may return text of its own to send back.
pub type MonitorFn = Box<dyn FnMut(&str, StreamKind) -> Option<String> + Send>;

/// Everything the reactor and worker strands share, guarded by one
/// `tokio::sync::Mutex` at the `Session` level (this struct itself holds no
/// lock).
pub struct SessionState {
    pub buffers: BufferStack,
    pub prompt: PromptMatcher,
    pub queue: InputQueue,
    pub last_output_time: Instant,
    pub waiting_for_echo_of: Option<Vec<u8>>,
    pub last_exit_code: ExitCode,
    pub unbuffered_input: UnbufferedInput,
    pub line_ending: String,
    pub monitor: Option<MonitorFn>,
}

impl SessionState {
    #[must_use]
    pub fn new(options: &SessionOptions) -> Self {
        Self {
            buffers: BufferStack::new(),
            prompt: PromptMatcher::from_raw(options.prompt()),
            queue: InputQueue::new(),
            last_output_time: Instant::now(),
            waiting_for_echo_of: None,
            last_exit_code: ExitCode::None,
            unbuffered_input: options.unbuffered_input(),
            line_ending: options.line_ending().to_string(),
            monitor: None,
        }
    }

    /// Install a monitor, replacing any previous one. Passing `None` installs
    /// the inert default.
    pub fn set_monitor(&mut self, monitor: Option<MonitorFn>) {
        self.monitor = monitor;
    }

    /// Queue `command` followed by the session's line ending, split
    /// according to the active unbuffered-input mode.
    pub fn queue_line(&mut self, command: &str) {
        let mut bytes = command.as_bytes().to_vec();
        bytes.extend_from_slice(self.line_ending.as_bytes());
        self.queue.queue(&bytes, self.unbuffered_input);
    }
}
