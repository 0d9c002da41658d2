//! Transport adapter: the capability set the core consumes.
//!
//! Two concrete transports exist -- SSH with a PTY (`ssh.rs`) and serial
//! (`serial.rs`) -- plus an in-process loopback (`loopback.rs`, test-only)
//! standing in for a real endpoint in integration tests. A local child
//! process can be driven directly over `tokio::process::Child`'s async
//! stdin/stdout pipes, but neither `ssh2` nor `serialport` exposes anything
//! similar, so both concrete transports here hand the blocking
//! session/port to a dedicated background thread and bridge it into
//! async-land with channels -- a reader task feeding a channel, with an OS
//! thread standing in for the blocking half.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

pub mod loopback;
pub mod serial;
pub mod ssh;

/// Callback the transport invokes with each inbound chunk on a stream.
/// `FnMut` because the output assembler closure it wraps mutates session
/// state; `Send` because it may be called from the reactor task.
pub type ByteCallback = Box<dyn FnMut(&[u8]) + Send>;

/// A cheap, `Clone`-free handle the reactor strand uses to write outbound
/// bytes. Kept separate from [`Transport`] so a boxed transport trait object
/// stays usable even while the reactor is mid-`pump`: writes go through a
/// channel to whichever thread or task actually owns the blocking resource,
/// so `write` never needs `&mut self` on the transport.
pub trait TransportWriter: Send + Sync {
    /// Write `bytes`, best effort, without blocking the caller.
    fn write(&self, bytes: &[u8]) -> Result<()>;
}

/// Capability set the core requires of a transport. The
/// spec's `io_step(body)` -- "run one step of the event pump, then invoke
/// `body`; repeat while `body` returns true" -- is split here into `pump`
/// (the transport's half) driven by an explicit loop in `wait.rs` (the
/// `body` half), because a single generic method taking a closure that
/// itself calls back into the transport isn't object-safe.
#[async_trait]
pub trait Transport: Send {
    /// Establish the channel; block until ready or fail with a connect error.
    async fn connect(&mut self) -> Result<()>;

    /// Begin an orderly close.
    async fn disconnect(&mut self) -> Result<()>;

    /// Is the channel still open?
    fn active(&self) -> bool;

    /// A cheap handle the reactor uses to write outbound bytes.
    fn writer(&self) -> Arc<dyn TransportWriter>;

    /// Install the single stdout sink, replacing any previous one.
    fn register_stdout(&mut self, callback: ByteCallback);

    /// Install the single stderr sink, replacing any previous one. Ignored
    /// by transports with no separate stderr stream (serial, loopback).
    fn register_stderr(&mut self, callback: ByteCallback);

    /// Run one bounded step of the transport's internal event pump,
    /// delivering any bytes that arrived to the registered callbacks. Must
    /// return within a few milliseconds even when idle so the reactor loop
    /// (`wait.rs`) can keep checking timeouts and draining the input queue.
    async fn pump(&mut self) -> Result<()>;
}
