//! SSH transport: a PTY-backed shell (or a single
//! exec'd command) over an `ssh2` session.
//!
//! `ssh2`'s `Session`/`Channel` are blocking and not meant to be driven from
//! more than one thread at a time, so the whole session lives on one
//! dedicated background thread -- the same "hand the blocking resource to
//! its own thread, bridge with a channel" shape `dumitru-stama-Bark`'s
//! `persistent_shell.rs` uses for its `portable_pty` reader, generalized to
//! also carry outbound writes the other direction.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::options::SshShellMode;
use crate::state::StreamKind;
use crate::transport::{ByteCallback, Transport, TransportWriter};

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const READ_CHUNK: usize = 4096;

pub struct SshWriter {
    outbound: std_mpsc::Sender<Vec<u8>>,
}

impl TransportWriter for SshWriter {
    fn write(&self, bytes: &[u8]) -> Result<()> {
        self.outbound
            .send(bytes.to_vec())
            .map_err(|_| Error::Transport("ssh session thread is gone".into()))
    }
}

pub struct SshTransport {
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    shell: SshShellMode,
    connect_timeout: Duration,

    active: Arc<AtomicBool>,
    inbound_rx: Option<tokio_mpsc::UnboundedReceiver<(StreamKind, Vec<u8>)>>,
    writer: Option<Arc<SshWriter>>,
    worker: Option<std::thread::JoinHandle<()>>,
    stdout_cb: Option<ByteCallback>,
    stderr_cb: Option<ByteCallback>,
}

impl SshTransport {
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: Option<String>,
        shell: SshShellMode,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password,
            shell,
            connect_timeout,
            active: Arc::new(AtomicBool::new(false)),
            inbound_rx: None,
            writer: None,
            worker: None,
            stdout_cb: None,
            stderr_cb: None,
        }
    }
}

fn open_channel(
    session: &ssh2::Session,
    shell: &SshShellMode,
) -> std::result::Result<ssh2::Channel, Error> {
    let mut channel = session.channel_session().map_err(|e| Error::Transport(e.to_string()))?;

    if !matches!(shell, SshShellMode::NoPty) {
        channel.request_pty("xterm", None, None).map_err(|_| Error::FailedToRequestPty)?;
    }

    match shell {
        SshShellMode::LoginShell => {
            channel.shell().map_err(|_| Error::FailedToStartShell)?;
        }
        SshShellMode::Exec(command) => {
            channel.exec(command).map_err(|_| Error::FailedToStartShell)?;
        }
        SshShellMode::PtyOnly | SshShellMode::NoPty => {
            // Neither `shell` nor `exec` is requested: the caller (typically
            // a dialect) drives the raw channel itself.
        }
    }

    channel.handle_extended_data(ssh2::ExtendedData::SeparateStreams).ok();
    Ok(channel)
}

fn session_thread(
    tcp: TcpStream,
    user: String,
    password: Option<String>,
    shell: SshShellMode,
    inbound_tx: tokio_mpsc::UnboundedSender<(StreamKind, Vec<u8>)>,
    outbound_rx: std_mpsc::Receiver<Vec<u8>>,
    active: Arc<AtomicBool>,
    ready_tx: std_mpsc::Sender<std::result::Result<(), Error>>,
) {
    let mut session = match ssh2::Session::new() {
        Ok(session) => session,
        Err(e) => {
            let _ = ready_tx.send(Err(Error::Transport(e.to_string())));
            return;
        }
    };
    session.set_tcp_stream(tcp);

    if let Err(e) = session.handshake() {
        let _ = ready_tx.send(Err(Error::Transport(e.to_string())));
        return;
    }

    let auth_result = match &password {
        Some(password) => session.userauth_password(&user, password),
        None => session.userauth_agent(&user),
    };
    if let Err(e) = auth_result {
        let _ = ready_tx.send(Err(Error::Transport(e.to_string())));
        return;
    }

    let mut channel = match open_channel(&session, &shell) {
        Ok(channel) => channel,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    session.set_blocking(false);
    active.store(true, Ordering::SeqCst);
    let _ = ready_tx.send(Ok(()));

    let has_stderr = !matches!(shell, SshShellMode::NoPty | SshShellMode::PtyOnly);
    let mut buf = [0_u8; READ_CHUNK];

    while active.load(Ordering::SeqCst) {
        while let Ok(bytes) = outbound_rx.try_recv() {
            if let Err(e) = channel.write_all(&bytes) {
                warn!(error = %e, "ssh write failed");
            }
        }

        match channel.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                if inbound_tx.send((StreamKind::Stdout, buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => {
                debug!(error = %e, "ssh stdout stream closed");
                break;
            }
        }

        if has_stderr {
            let mut stderr = channel.stream(1);
            match stderr.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    let _ = inbound_tx.send((StreamKind::Stderr, buf[..n].to_vec()));
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(_) => {}
            }
        }

        if channel.eof() {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    active.store(false, Ordering::SeqCst);
    let _ = channel.close();
}

#[async_trait]
impl Transport for SshTransport {
    async fn connect(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let connect_timeout = self.connect_timeout;
        let tcp = tokio::task::spawn_blocking(move || -> std::result::Result<TcpStream, Error> {
            let stream = TcpStream::connect(&addr).map_err(|e| Error::Transport(e.to_string()))?;
            stream.set_read_timeout(Some(connect_timeout)).ok();
            Ok(stream)
        })
        .await
        .map_err(|e| Error::Transport(e.to_string()))??;

        let (inbound_tx, inbound_rx) = tokio_mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();

        let active = Arc::clone(&self.active);
        let user = self.user.clone();
        let password = self.password.clone();
        let shell = self.shell.clone();

        let worker = std::thread::spawn(move || {
            session_thread(tcp, user, password, shell, inbound_tx, outbound_rx, active, ready_tx);
        });

        tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| Error::Transport(e.to_string()))?
            .map_err(|_| Error::Transport("ssh session thread exited before signalling ready".into()))??;

        self.worker = Some(worker);
        self.inbound_rx = Some(inbound_rx);
        self.writer = Some(Arc::new(SshWriter { outbound: outbound_tx }));
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

    fn register_stderr(&mut self, callback: ByteCallback) {
        self.stderr_cb = Some(callback);
    }

    async fn pump(&mut self) -> Result<()> {
        let Some(rx) = self.inbound_rx.as_mut() else {
            return Ok(());
        };
        match tokio::time::timeout(POLL_INTERVAL, rx.recv()).await {
            Ok(Some((StreamKind::Stdout, data))) => {
                if let Some(cb) = self.stdout_cb.as_mut() {
                    cb(&data);
                }
            }
            Ok(Some((StreamKind::Stderr, data))) => {
                if let Some(cb) = self.stderr_cb.as_mut() {
                    cb(&data);
                }
            }
            Ok(None) => self.active.store(false, Ordering::SeqCst),
            Err(_) => {}
        }
        Ok(())
    }
}
