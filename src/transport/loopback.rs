//! In-process loopback transport: stands in for a real SSH/serial endpoint
//! so both this crate's own tests and a downstream caller's can script a
//! fake remote shell without a network or a local `bash` -- the role a real
//! spawned `bash` plays in session tests driven against an actual shell,
//! minus the process spawn. Kept as an ordinary public module (not behind
//! `#[cfg(test)]`) so integration tests in `tests/` can link against it the
//! same way they link against every other public item.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::transport::{ByteCallback, Transport, TransportWriter};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

pub struct LoopbackWriter {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

impl TransportWriter for LoopbackWriter {
    fn write(&self, bytes: &[u8]) -> Result<()> {
        self.outbound
            .send(bytes.to_vec())
            .map_err(|_| crate::error::Error::Transport("loopback peer is gone".into()))
    }
}

/// An in-process stand-in for a remote shell. Build with [`LoopbackTransport::pair`],
/// which also returns the far end of the duplex pipe a test drives directly
/// to script canned responses (echo a command, then write a prompt).
pub struct LoopbackTransport {
    active: Arc<AtomicBool>,
    read_half: Option<ReadHalf<DuplexStream>>,
    write_half: Option<WriteHalf<DuplexStream>>,
    outbound_rx: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    writer: Arc<LoopbackWriter>,
    write_task: Option<tokio::task::JoinHandle<()>>,
    stdout_cb: Option<ByteCallback>,
}

impl LoopbackTransport {
    /// Build a connected pair: `(transport, peer)`. The peer is a raw
    /// `DuplexStream` the test reads/writes directly to play the part of
    /// the remote shell.
    #[must_use]
    pub fn pair() -> (Self, DuplexStream) {
        let (local, peer) = tokio::io::duplex(64 * 1024);
        let (read_half, write_half) = tokio::io::split(local);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let transport = Self {
            active: Arc::new(AtomicBool::new(false)),
            read_half: Some(read_half),
            write_half: Some(write_half),
            outbound_rx: Some(outbound_rx),
            writer: Arc::new(LoopbackWriter { outbound: outbound_tx }),
            write_task: None,
            stdout_cb: None,
        };
        (transport, peer)
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(&mut self) -> Result<()> {
        let mut write_half = self.write_half.take().expect("connect() called twice");
        let mut outbound_rx = self.outbound_rx.take().expect("connect() called twice");

        self.write_task = Some(tokio::spawn(async move {
            while let Some(bytes) = outbound_rx.recv().await {
                if write_half.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        }));
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.active.store(false, Ordering::SeqCst);
        if let Some(task) = self.write_task.take() {
            task.abort();
        }
        Ok(())
    }

    fn active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn writer(&self) -> Arc<dyn TransportWriter> {
        Arc::clone(&self.writer)
    }

    fn register_stdout(&mut self, callback: ByteCallback) {
        self.stdout_cb = Some(callback);
    }

    fn register_stderr(&mut self, _callback: ByteCallback) {}

    async fn pump(&mut self) -> Result<()> {
        let Some(read_half) = self.read_half.as_mut() else {
            return Ok(());
        };
        let mut buf = [0_u8; 4096];
        match tokio::time::timeout(POLL_INTERVAL, read_half.read(&mut buf)).await {
            Ok(Ok(0)) => self.active.store(false, Ordering::SeqCst),
            Ok(Ok(n)) => {
                if let Some(cb) = self.stdout_cb.as_mut() {
                    cb(&buf[..n]);
                }
            }
            Ok(Err(_)) => self.active.store(false, Ordering::SeqCst),
            Err(_) => {}
        }
        Ok(())
    }
}
