//! The command driver and session lifecycle.
//!
//! `Session` is the public entry point: a cheap `Clone` wrapper (`Arc`
//! around shared state) with async methods that lock a mutex for the
//! duration of a short critical section and never hold it across a
//! transport `.await`. Unlike a server juggling a table of many sessions
//! each driving their own local `bash`, this crate is single-session:
//! `Session::run` spawns exactly two tasks, a reactor (pumps the transport,
//! drains the input queue) and a worker (runs the caller's script).

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex as StdMutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::{Mutex as TokioMutex, Notify};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::hooks::{HookFn, HookName, HookRegistry};
use crate::options::{OnNonZeroExitCode, SessionOptions};
use crate::prompt::PromptMatcher;
use crate::state::{ExitCode, MonitorFn, SessionState, StreamKind};
use crate::transport::Transport;
use crate::wait::{wait_for_prompt, WaitContext};

/// Per-call overrides accepted by [`Session::exec`].
/// Any field left `None`/default falls back to the session's own option.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub retrieve_exit_code: Option<bool>,
    pub on_non_zero_exit_code: Option<OnNonZeroExitCode>,
    pub silence_timeout: Option<Duration>,
    pub command_timeout: Option<Duration>,
    /// Default `true`: raise `CommandTimeout`/`SilenceTimeout` instead of
    /// returning the raw capture.
    pub timeout_error: Option<bool>,
    /// Default `true`: slice and return the command's output. When `false`,
    /// `exec` still waits for the prompt but returns an empty string.
    pub get_output: Option<bool>,
    /// Default `true`: the shell is expected to echo the command line back,
    /// and `exec` discards everything up to and including that echo before
    /// returning output. Dialects whose shell doesn't echo set this `false`.
    pub command_is_echoed: Option<bool>,
}

impl ExecOptions {
    fn timeout_error(&self) -> bool {
        self.timeout_error.unwrap_or(true)
    }

    fn get_output(&self) -> bool {
        self.get_output.unwrap_or(true)
    }

    fn command_is_echoed(&self) -> bool {
        self.command_is_echoed.unwrap_or(true)
    }
}

/// Dialect hook for exit-code retrieval.
/// The default implementation queues `echo $?` in a pushed buffer scope and
/// parses the integer back out; dialects that cannot retrieve an exit code
/// (the device dialect's nested PHP shell) install one that always answers
/// [`ExitCode::Undefined`].
#[async_trait]
pub trait ExitCodeProbe: Send + Sync {
    async fn get_exit_code(&self, session: &Session) -> Result<ExitCode>;
}

/// Default exit-code probe: `echo $?` in a scratch buffer scope.
pub struct DefaultExitCodeProbe {
    pub query: String,
}

impl Default for DefaultExitCodeProbe {
    fn default() -> Self {
        Self { query: "echo $?".to_string() }
    }
}

#[async_trait]
impl ExitCodeProbe for DefaultExitCodeProbe {
    async fn get_exit_code(&self, session: &Session) -> Result<ExitCode> {
        {
            let mut state = session.inner.state.lock().unwrap();
            state.buffers.push();
            state.set_monitor(None);
            state.queue_line(&self.query);
        }
        session.inner.notify.notify_waiters();

        let ctx = session.wait_ctx();
        let matched = wait_for_prompt(&ctx, Duration::ZERO, Duration::from_secs(1), false).await?;

        let code = if matched {
            let (before, prompt_literal) = session.snapshot_before_prompt();
            let output = extract_command_output(&before, &self.query, &prompt_literal, true);
            output.trim().parse::<i32>().map_or(ExitCode::Undefined, ExitCode::Code)
        } else {
            ExitCode::Timeout
        };

        session.inner.state.lock().unwrap().buffers.pop_discard();
        Ok(code)
    }
}

/// Exit-code probe for dialects that cannot retrieve one at all.
pub struct UndefinedExitCodeProbe;

#[async_trait]
impl ExitCodeProbe for UndefinedExitCodeProbe {
    async fn get_exit_code(&self, _session: &Session) -> Result<ExitCode> {
        Ok(ExitCode::Undefined)
    }
}

/// How `run`'s setup phase decides the session is ready for commands
///. The default simply waits for the configured
/// prompt; the device dialect replaces this with menu navigation.
#[async_trait]
pub trait SetupHook: Send + Sync {
    async fn setup(&self, session: &Session) -> Result<()>;
}

/// Default setup: `wait_for_prompt(30, 30, raise)`, mapping a timeout into
/// `FailedToSetPrompt`.
pub struct DefaultSetup;

#[async_trait]
impl SetupHook for DefaultSetup {
    async fn setup(&self, session: &Session) -> Result<()> {
        let ctx = session.wait_ctx();
        match wait_for_prompt(&ctx, Duration::from_secs(30), Duration::from_secs(30), true).await {
            Ok(_) => Ok(()),
            Err(Error::CommandTimeout | Error::SilenceTimeout) => Err(Error::FailedToSetPrompt),
            Err(e) => Err(e),
        }
    }
}

/// An opaque save of the previously active prompt, returned by
/// [`Session::push_temporary_prompt`]/[`push_temporary_prompt_pattern`] and
/// consumed by [`Session::pop_temporary_prompt`].
pub struct PromptToken(PromptMatcher);

struct Inner {
    options: RwLock<SessionOptions>,
    state: StdMutex<SessionState>,
    notify: Notify,
    transport: TokioMutex<Box<dyn Transport>>,
    hooks: RwLock<HookRegistry>,
    exit_code_probe: RwLock<std::sync::Arc<dyn ExitCodeProbe>>,
    setup_hook: RwLock<std::sync::Arc<dyn SetupHook>>,
    running: AtomicBool,
    completed: AtomicBool,
    ignore_io_error: AtomicBool,
    reactor_stop: AtomicBool,
    run_lock: TokioMutex<()>,
    io_error: StdMutex<Option<Error>>,
}

/// An active interaction with one remote shell. Cheap to
/// `Clone` -- every clone shares the same underlying state through an `Arc`,
/// the shape dialects and the reactor/worker tasks need since both hold a
/// handle to the same session concurrently.
#[derive(Clone)]
pub struct Session {
    inner: std::sync::Arc<Inner>,
}

impl Session {
    /// Build a new, unconnected session around `transport`. `options` must
    /// already be validated.
    #[must_use]
    pub fn new(options: SessionOptions, transport: Box<dyn Transport>) -> Self {
        let state = SessionState::new(&options);
        Self {
            inner: std::sync::Arc::new(Inner {
                options: RwLock::new(options),
                state: StdMutex::new(state),
                notify: Notify::new(),
                transport: TokioMutex::new(transport),
                hooks: RwLock::new(HookRegistry::new()),
                exit_code_probe: RwLock::new(std::sync::Arc::new(DefaultExitCodeProbe::default())),
                setup_hook: RwLock::new(std::sync::Arc::new(DefaultSetup)),
                running: AtomicBool::new(false),
                completed: AtomicBool::new(false),
                ignore_io_error: AtomicBool::new(false),
                reactor_stop: AtomicBool::new(false),
                run_lock: TokioMutex::new(()),
                io_error: StdMutex::new(None),
            }),
        }
    }

    /// Replace the hook registry wholesale. Dialects compose their own hooks
    /// onto the core's before calling this.
    pub fn set_hooks(&self, hooks: HookRegistry) {
        *self.inner.hooks.write().unwrap() = hooks;
    }

    /// Append one callback to `name`'s chain without disturbing what's
    /// already registered.
    pub fn register_hook(&self, name: HookName, hook: HookFn) {
        self.inner.hooks.write().unwrap().register(name, hook);
    }

    /// Install a non-default exit-code probe (the device dialect's nested
    /// interpreter installs [`UndefinedExitCodeProbe`] here).
    pub fn set_exit_code_probe(&self, probe: std::sync::Arc<dyn ExitCodeProbe>) {
        *self.inner.exit_code_probe.write().unwrap() = probe;
    }

    /// Install a non-default setup hook (the device dialect installs its
    /// menu-navigation implementation here).
    pub fn set_setup_hook(&self, hook: std::sync::Arc<dyn SetupHook>) {
        *self.inner.setup_hook.write().unwrap() = hook;
    }

    #[must_use]
    pub fn options(&self) -> SessionOptions {
        self.inner.options.read().unwrap().clone()
    }

    /// Atomically replace the quit command. Used by the device dialect's `RestartNow` recovery.
    pub fn change_quit(&self, new_quit: impl Into<String>) {
        let mut options = self.inner.options.write().unwrap();
        *options = options.change_quit(new_quit);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn stdout(&self) -> String {
        self.inner.state.lock().unwrap().buffers.current().stdout.clone()
    }

    #[must_use]
    pub fn stderr(&self) -> String {
        self.inner.state.lock().unwrap().buffers.current().stderr.clone()
    }

    #[must_use]
    pub fn combined_output(&self) -> String {
        self.inner.state.lock().unwrap().buffers.current().combined.clone()
    }

    #[must_use]
    pub fn last_exit_code(&self) -> ExitCode {
        self.inner.state.lock().unwrap().last_exit_code
    }

    fn set_last_exit_code(&self, code: ExitCode) {
        self.inner.state.lock().unwrap().last_exit_code = code;
    }

    /// Permanently swap the active prompt (used after a device's `PS1=`
    /// assignment settles onto its final form). Unlike
    /// [`Self::push_temporary_prompt`], there is nothing to restore.
    pub fn set_prompt_literal(&self, literal: impl Into<String>) {
        self.inner.state.lock().unwrap().prompt.set_literal(literal);
    }

    /// Save the active prompt and install a new literal one, returning a
    /// token that restores it.
    #[must_use]
    pub fn push_temporary_prompt(&self, literal: impl Into<String>) -> PromptToken {
        let previous = self.inner.state.lock().unwrap().prompt.set_literal(literal);
        PromptToken(previous)
    }

    /// As [`Self::push_temporary_prompt`], but with a caller-supplied regex
    /// instead of a literal (a device's version-stamped banner, say).
    #[must_use]
    pub fn push_temporary_prompt_pattern(&self, literal: impl Into<String>, pattern: Regex) -> PromptToken {
        let previous = self.inner.state.lock().unwrap().prompt.set_pattern(literal, pattern);
        PromptToken(previous)
    }

    /// Restore a prompt previously saved by `push_temporary_prompt*`.
    pub fn pop_temporary_prompt(&self, token: PromptToken) {
        self.inner.state.lock().unwrap().prompt = token.0;
    }

    /// Run `body` with `literal` as the active prompt, restoring the
    /// previous one afterwards regardless of whether `body` succeeded.
    /// (Does not run the restore if the surrounding task is cancelled --
    /// see DESIGN.md.)
    pub async fn with_temporary_prompt<F, Fut, T>(&self, literal: impl Into<String>, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let token = self.push_temporary_prompt(literal);
        let result = body().await;
        self.pop_temporary_prompt(token);
        result
    }

    fn wait_ctx(&self) -> WaitContext<'_> {
        WaitContext { state: &self.inner.state, notify: &self.inner.notify }
    }

    /// Block until the active prompt appears, without queuing anything
    /// first. Dialects use this for navigation steps that don't fit
    /// `exec`'s "queue a command, then wait" shape (reading an already
    /// on-screen menu, say).
    pub async fn wait_for_active_prompt(
        &self,
        silence_timeout: Duration,
        command_timeout: Duration,
        raise_on_timeout: bool,
    ) -> Result<bool> {
        let ctx = self.wait_ctx();
        wait_for_prompt(&ctx, silence_timeout, command_timeout, raise_on_timeout).await
    }

    /// Open a scratch capture scope. Pair with
    /// [`Self::pop_capture_merge`] or [`Self::pop_capture_discard`].
    pub fn push_capture(&self) {
        self.inner.state.lock().unwrap().buffers.push();
    }

    /// Close a capture scope, folding it into the buffers beneath it.
    pub fn pop_capture_merge(&self) {
        self.inner.state.lock().unwrap().buffers.pop_merge();
    }

    /// Close a capture scope, discarding everything captured since the
    /// matching [`Self::push_capture`].
    pub fn pop_capture_discard(&self) {
        self.inner.state.lock().unwrap().buffers.pop_discard();
    }

    /// Queue a line (with the session's configured line ending) without
    /// going through `exec`'s echo-stripping/exit-code machinery. Used by
    /// dialect navigation steps that send a raw selection (a menu digit)
    /// rather than a shell command.
    pub fn queue_raw(&self, text: &str) {
        self.inner.state.lock().unwrap().queue_line(text);
        self.inner.notify.notify_waiters();
    }

    fn ensure_running(&self) -> Result<()> {
        if self.inner.completed.load(Ordering::SeqCst) {
            Err(Error::SessionCompleted)
        } else if !self.inner.running.load(Ordering::SeqCst) {
            Err(Error::NotRunning)
        } else {
            Ok(())
        }
    }

    /// The combined buffer up to (not including) the active prompt match,
    /// alongside the prompt's current literal text.
    fn snapshot_before_prompt(&self) -> (String, String) {
        let state = self.inner.state.lock().unwrap();
        let combined = &state.buffers.current().combined;
        let before = match state.prompt.find_in(combined) {
            Some((start, _)) => combined[..start].to_string(),
            None => combined.clone(),
        };
        (before, state.prompt.literal().to_string())
    }

    fn run_hooks(&self, name: HookName, session: &Session, error: Option<&Error>) -> Result<bool> {
        self.inner.hooks.read().unwrap().run(name, session, error)
    }

    /// The command driver. Queues `command`, waits for the
    /// prompt, slices the command's own output out of the transcript, and
    /// optionally retrieves its exit code.
    pub async fn exec(&self, command: &str, opts: ExecOptions, monitor: Option<MonitorFn>) -> Result<String> {
        self.ensure_running()?;

        let options = self.options();
        let silence_timeout = opts.silence_timeout.unwrap_or_else(|| options.silence_timeout());
        let command_timeout = opts.command_timeout.unwrap_or_else(|| options.command_timeout());
        let retrieve_exit_code = opts.retrieve_exit_code.unwrap_or_else(|| options.retrieve_exit_code());
        let on_non_zero = opts.on_non_zero_exit_code.unwrap_or_else(|| options.on_non_zero_exit_code());

        debug!(command, "exec: queuing command");

        {
            let mut state = self.inner.state.lock().unwrap();
            state.buffers.push();
            state.set_monitor(monitor);
            state.queue_line(command);
        }
        self.inner.notify.notify_waiters();

        let ctx = self.wait_ctx();
        let wait_result = wait_for_prompt(&ctx, silence_timeout, command_timeout, opts.timeout_error()).await;

        let outcome: Result<String> = match wait_result {
            Ok(true) => {
                self.finish_exec_after_match(command, &opts, retrieve_exit_code, on_non_zero).await
            }
            Ok(false) => {
                self.set_last_exit_code(ExitCode::Timeout);
                let combined = self.inner.state.lock().unwrap().buffers.current().combined.clone();
                Ok(combined)
            }
            Err(e) => Err(e),
        };

        // In every path, pop_merge so captured history is restored with
        // the command's transcript appended.
        self.inner.state.lock().unwrap().buffers.pop_merge();

        match &outcome {
            Ok(_) => info!(command, exit_code = ?self.last_exit_code(), "exec: complete"),
            Err(e) => warn!(command, error = %e, "exec: failed"),
        }
        outcome
    }

    async fn finish_exec_after_match(
        &self,
        command: &str,
        opts: &ExecOptions,
        retrieve_exit_code: bool,
        on_non_zero: OnNonZeroExitCode,
    ) -> Result<String> {
        let output = if opts.get_output() {
            let (before, prompt_literal) = self.snapshot_before_prompt();
            extract_command_output(&before, command, &prompt_literal, opts.command_is_echoed())
        } else {
            String::new()
        };

        if retrieve_exit_code {
            let probe = self.inner.exit_code_probe.read().unwrap().clone();
            let code = probe.get_exit_code(self).await?;
            self.set_last_exit_code(code);

            if on_non_zero == OnNonZeroExitCode::Raise {
                if let ExitCode::Code(c) = code {
                    if c != 0 {
                        return Err(Error::NonZeroExitCode(c));
                    }
                }
            }
        } else {
            self.set_last_exit_code(ExitCode::None);
        }

        Ok(output)
    }

    /// Force `retrieve_exit_code=true` and return the parsed integer
    ///.
    pub async fn exec_for_code(&self, command: &str, mut opts: ExecOptions) -> Result<i32> {
        opts.retrieve_exit_code = Some(true);
        self.exec(command, opts, None).await?;
        match self.last_exit_code() {
            ExitCode::Code(code) => Ok(code),
            ExitCode::Timeout => Err(Error::CommandTimeout),
            ExitCode::Undefined => {
                Err(Error::InvalidOption("the active dialect cannot retrieve exit codes".into()))
            }
            ExitCode::None => Err(Error::InvalidOption("exit code was not retrieved".into())),
        }
    }

    /// Force `retrieve_exit_code=false` and return the output string
    ///.
    pub async fn exec_ignore_code(&self, command: &str, mut opts: ExecOptions) -> Result<String> {
        opts.retrieve_exit_code = Some(false);
        self.exec(command, opts, None).await
    }

    /// Teardown: send the quit command with a
    /// 1-second grace and `timeout_error=false`, with I/O errors suppressed
    /// since a close is expected as soon as the shell exits.
    async fn teardown(&self) {
        let quit = self.inner.options.read().unwrap().quit().to_string();
        self.inner.ignore_io_error.store(true, Ordering::SeqCst);

        let opts = ExecOptions {
            command_timeout: Some(Duration::from_secs(1)),
            timeout_error: Some(false),
            retrieve_exit_code: Some(false),
            get_output: Some(false),
            command_is_echoed: Some(true),
            ..Default::default()
        };
        if let Err(e) = self.exec(&quit, opts, None).await {
            debug!(error = %e, "teardown: quit command did not complete cleanly");
        }

        self.inner.ignore_io_error.store(false, Ordering::SeqCst);
    }

    /// Install the core's transport→assembler wiring. Must run once, before
    /// `connect()`, since `register_stdout`/`register_stderr` replace
    /// whatever sink was there.
    async fn wire_assembler(&self) {
        let stdout_session = self.clone();
        let stderr_session = self.clone();
        let mut transport = self.inner.transport.lock().await;
        transport.register_stdout(Box::new(move |data| {
            stdout_session.deliver(StreamKind::Stdout, data);
        }));
        transport.register_stderr(Box::new(move |data| {
            stderr_session.deliver(StreamKind::Stderr, data);
        }));
    }

    fn deliver(&self, kind: StreamKind, data: &[u8]) {
        let mut state = self.inner.state.lock().unwrap();
        crate::assembler::on_bytes(&mut state, kind, data);
        drop(state);
        self.inner.notify.notify_waiters();
    }

    /// The reactor strand: the sole writer to the transport and
    /// the sole consumer of the input queue. Runs until told to stop or the
    /// transport goes inactive.
    async fn reactor_loop(self) {
        loop {
            if self.inner.reactor_stop.load(Ordering::SeqCst) {
                break;
            }

            let chunk = {
                let mut state = self.inner.state.lock().unwrap();
                let echo_gated = matches!(state.unbuffered_input, crate::options::UnbufferedInput::Echo)
                    && state.waiting_for_echo_of.is_some();
                if echo_gated {
                    None
                } else {
                    let chunk = state.queue.dequeue();
                    if let Some(bytes) = &chunk {
                        if matches!(state.unbuffered_input, crate::options::UnbufferedInput::Echo) {
                            state.waiting_for_echo_of = Some(bytes.clone());
                        }
                    }
                    chunk
                }
            };

            if let Some(bytes) = chunk {
                let writer = self.inner.transport.lock().await.writer();
                if let Err(e) = writer.write(&bytes) {
                    self.record_io_error(e);
                    break;
                }
            }

            let pump_result = self.inner.transport.lock().await.pump().await;
            if let Err(e) = pump_result {
                self.record_io_error(e);
                break;
            }

            self.inner.notify.notify_waiters();

            if !self.inner.transport.lock().await.active() {
                break;
            }
        }
    }

    fn record_io_error(&self, error: Error) {
        if self.inner.ignore_io_error.load(Ordering::SeqCst) {
            debug!(error = %error, "reactor: transport I/O error ignored during teardown");
        } else {
            warn!(error = %error, "reactor: transport I/O error");
            *self.inner.io_error.lock().unwrap() = Some(error);
        }
    }

    /// The worker strand: setup, the user's
    /// script, teardown, all bracketed by the `*_init`/`*_term` hooks, with
    /// `on_exception` given the last word on whether an error is suppressed.
    async fn worker_loop<F, Fut>(self, script: F) -> Option<Error>
    where
        F: FnOnce(Session) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if let Err(e) = self.run_hooks(HookName::BeforeInit, &self, None) {
            let _ = self.run_hooks(HookName::AfterTerm, &self, Some(&e));
            return Some(e);
        }

        let script_session = self.clone();
        let result: Result<()> = async {
            let setup_hook = self.inner.setup_hook.read().unwrap().clone();
            setup_hook.setup(&self).await?;
            self.run_hooks(HookName::AfterInit, &self, None)?;
            script(script_session).await
        }
        .await;

        let term_error = result.as_ref().err();
        if let Err(e) = self.run_hooks(HookName::BeforeTerm, &self, term_error) {
            warn!(error = %e, "before_term hook failed");
        }
        self.teardown().await;
        if let Err(e) = self.run_hooks(HookName::AfterTerm, &self, term_error) {
            warn!(error = %e, "after_term hook failed");
        }

        match result {
            Ok(()) => None,
            Err(Error::QuitNow) => None,
            Err(e) => match self.run_hooks(HookName::OnException, &self, Some(&e)) {
                Ok(true) => None,
                Ok(false) => Some(e),
                Err(hook_err) => {
                    warn!(error = %hook_err, "on_exception hook itself failed");
                    Some(e)
                }
            },
        }
    }

    /// Session lifecycle: connect, run `script` on a worker
    /// task while a reactor task pumps the transport, teardown, disconnect.
    pub async fn run<F, Fut>(&self, script: F) -> Result<()>
    where
        F: FnOnce(Session) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let _run_guard = self
            .inner
            .run_lock
            .try_lock()
            .map_err(|_| Error::AlreadyRunning)?;
        if self.inner.running.load(Ordering::SeqCst) || self.inner.completed.load(Ordering::SeqCst) {
            return Err(Error::AlreadyRunning);
        }

        if let Err(e) = self.run_hooks(HookName::OnBeforeRun, self, None) {
            warn!(error = %e, "on_before_run hook failed");
        }

        self.wire_assembler().await;
        self.inner.transport.lock().await.connect().await?;
        info!("session connected");

        {
            let mut state = self.inner.state.lock().unwrap();
            state.set_monitor(Some(Box::new(|chunk: &str, kind: StreamKind| -> Option<String> {
                debug!(chunk, ?kind, "output");
                None
            })));
        }

        self.inner.running.store(true, Ordering::SeqCst);
        self.inner.reactor_stop.store(false, Ordering::SeqCst);

        let reactor_handle = tokio::spawn(self.clone().reactor_loop());
        let worker_handle = tokio::spawn(self.clone().worker_loop(script));

        let worker_error = worker_handle
            .await
            .map_err(|e| Error::Transport(format!("worker task panicked: {e}")))?;

        self.inner.reactor_stop.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
        let _ = reactor_handle.await;

        let _ = self.inner.transport.lock().await.disconnect().await;
        info!("session disconnected");

        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.completed.store(true, Ordering::SeqCst);

        if let Err(e) = self.run_hooks(HookName::OnAfterRun, self, worker_error.as_ref()) {
            warn!(error = %e, "on_after_run hook failed");
        }

        let io_error = self.inner.io_error.lock().unwrap().take();
        match worker_error.or(io_error) {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

/// Scan the captured transcript line by line, discard
/// lines until one matches the expected echo pattern
/// `^(prompt\s*)?<escaped command>\s*$`, then return everything after it.
/// If `command_is_echoed` is false, there is no echo to strip. If no line
/// matches, log a warning but still return what was found.
fn extract_command_output(
    captured: &str,
    command: &str,
    prompt_literal: &str,
    command_is_echoed: bool,
) -> String {
    if !command_is_echoed {
        return captured.to_string();
    }

    let pattern = Regex::new(&format!(
        r"^(?:{}\s*)?{}\s*$",
        regex::escape(prompt_literal),
        regex::escape(command)
    ))
    .expect("echo pattern must compile: both halves are regex::escape'd");

    let lines: Vec<&str> = captured.split('\n').collect();
    for (i, line) in lines.iter().enumerate() {
        if pattern.is_match(line.trim_end_matches('\r')) {
            return lines[i + 1..].join("\n");
        }
    }

    warn!(command, "exec: command echo not found in captured output; returning raw capture");
    captured.to_string()
}
