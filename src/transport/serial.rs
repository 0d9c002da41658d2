//! Serial transport: a raw byte stream over a local
//! serial port, 8-N-1 by default, no stderr.
//!
//! `serialport::SerialPort` is a blocking `Read + Write` trait object, so
//! (as with `ssh.rs`) the whole port lives on one dedicated background
//! thread that alternates between draining outbound writes and polling for
//! inbound bytes with its own short read timeout.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::options::SerialParity;
use crate::state::StreamKind;
use crate::transport::{ByteCallback, Transport, TransportWriter};

const READ_TIMEOUT: Duration = Duration::from_millis(5);
const READ_CHUNK: usize = 4096;

pub struct SerialWriter {
    outbound: std_mpsc::Sender<Vec<u8>>,
}

impl TransportWriter for SerialWriter {
    fn write(&self, bytes: &[u8]) -> Result<()> {
        self.outbound
            .send(bytes.to_vec())
            .map_err(|_| Error::Transport("serial port thread is gone".into()))
    }
}

pub struct SerialTransport {
    path: String,
    speed: u32,
    data_bits: u8,
    parity: SerialParity,

    active: Arc<AtomicBool>,
    inbound_rx: Option<tokio_mpsc::UnboundedReceiver<Vec<u8>>>,
    writer: Option<Arc<SerialWriter>>,
    worker: Option<std::thread::JoinHandle<()>>,
    stdout_cb: Option<ByteCallback>,
}

impl SerialTransport {
    #[must_use]
    pub fn new(path: impl Into<String>, speed: u32, data_bits: u8, parity: SerialParity) -> Self {
        Self {
            path: path.into(),
            speed,
            data_bits,
            parity,
            active: Arc::new(AtomicBool::new(false)),
            inbound_rx: None,
            writer: None,
            worker: None,
            stdout_cb: None,
        }
    }
}

fn data_bits_of(bits: u8) -> serialport::DataBits {
    match bits {
        5 => serialport::DataBits::Five,
        6 => serialport::DataBits::Six,
        7 => serialport::DataBits::Seven,
        _ => serialport::DataBits::Eight,
    }
}

fn parity_of(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

fn port_thread(
    mut port: Box<dyn serialport::SerialPort>,
    inbound_tx: tokio_mpsc::UnboundedSender<Vec<u8>>,
    outbound_rx: std_mpsc::Receiver<Vec<u8>>,
    active: Arc<AtomicBool>,
) {
    active.store(true, Ordering::SeqCst);
    let mut buf = [0_u8; READ_CHUNK];

    while active.load(Ordering::SeqCst) {
        while let Ok(bytes) = outbound_rx.try_recv() {
            if let Err(e) = port.write_all(&bytes) {
                debug!(error = %e, "serial write failed");
            }
        }

        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                if inbound_tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                debug!(error = %e, "serial port closed");
                break;
            }
        }
    }
    active.store(false, Ordering::SeqCst);
}

#[async_trait]
impl Transport for SerialTransport {
    async fn connect(&mut self) -> Result<()> {
        let path = self.path.clone();
        let speed = self.speed;
        let data_bits = data_bits_of(self.data_bits);
        let parity = parity_of(self.parity);

        let port = tokio::task::spawn_blocking(move || {
            serialport::new(path, speed)
                .data_bits(data_bits)
                .parity(parity)
                .stop_bits(serialport::StopBits::One)
                .timeout(READ_TIMEOUT)
                .open()
        })
        .await
        .map_err(|e| Error::Transport(e.to_string()))?
        .map_err(|e| Error::Transport(e.to_string()))?;

        let (inbound_tx, inbound_rx) = tokio_mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = std_mpsc::channel();
        let active = Arc::clone(&self.active);

        let worker = std::thread::spawn(move || {
            port_thread(port, inbound_tx, outbound_rx, active);
        });

        self.worker = Some(worker);
        self.inbound_rx = Some(inbound_rx);
        self.writer = Some(Arc::new(SerialWriter { outbound: outbound_tx }));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.active.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = tokio::task::spawn_blocking(move || worker.join()).await;
        }
        Ok(())
    }

    fn active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn writer(&self) -> Arc<dyn TransportWriter> {
        self.writer.clone().expect("writer() called before connect()")
    }

    fn register_stdout(&mut self, callback: ByteCallback) {
        self.stdout_cb = Some(callback);
    }

    /// Serial carries no separate stderr stream; ignored.
    fn register_stderr(&mut self, _callback: ByteCallback) {}

    async fn pump(&mut self) -> Result<()> {
        let Some(rx) = self.inbound_rx.as_mut() else {
            return Ok(());
        };
        match tokio::time::timeout(READ_TIMEOUT, rx.recv()).await {
            Ok(Some(data)) => {
                if let Some(cb) = self.stdout_cb.as_mut() {
                    cb(&data);
                }
            }
            Ok(None) => self.active.store(false, Ordering::SeqCst),
            Err(_) => {}
        }
        Ok(())
    }
}
