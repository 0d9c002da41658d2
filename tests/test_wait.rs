//! The wait loop's timeout/nudge state machine, exercised directly against
//! a bare `SessionState` rather than a full session.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use shelldrive::error::Error;
use shelldrive::options::{SessionOptionsBuilder, SshShellMode, TransportOptions};
use shelldrive::state::SessionState;
use shelldrive::wait::{wait_for_prompt, WaitContext};
use tokio::sync::Notify;

fn fixture_state(prompt: &str) -> SessionState {
    let opts = SessionOptionsBuilder::new(TransportOptions::Ssh {
        host: "localhost".into(),
        port: 22,
        user: "root".into(),
        password: None,
        shell: SshShellMode::LoginShell,
        connect_timeout: Duration::from_secs(5),
    })
    .prompt(prompt)
    .build()
    .unwrap();
    SessionState::new(&opts)
}

#[tokio::test]
async fn returns_immediately_when_prompt_already_present() {
    let state = Mutex::new(fixture_state("box#"));
    state.lock().unwrap().buffers.current_mut().combined.push_str("hi\nbox#");
    let notify = Notify::new();
    let ctx = WaitContext { state: &state, notify: &notify };

    let matched = wait_for_prompt(&ctx, Duration::ZERO, Duration::ZERO, true).await.unwrap();
    assert!(matched);
}

#[tokio::test]
async fn command_timeout_raises_when_configured_to() {
    let state = Mutex::new(fixture_state("box#"));
    let notify = Notify::new();
    let ctx = WaitContext { state: &state, notify: &notify };

    let err = wait_for_prompt(&ctx, Duration::ZERO, Duration::from_millis(30), true).await.unwrap_err();
    assert!(matches!(err, Error::CommandTimeout));
}

#[tokio::test]
async fn command_timeout_returns_false_when_not_raising() {
    let state = Mutex::new(fixture_state("box#"));
    let notify = Notify::new();
    let ctx = WaitContext { state: &state, notify: &notify };

    let matched = wait_for_prompt(&ctx, Duration::ZERO, Duration::from_millis(30), false).await.unwrap();
    assert!(!matched);
}

#[tokio::test]
async fn silence_timeout_raises_after_three_silent_nudges() {
    let state = Mutex::new(fixture_state("box#"));
    let notify = Notify::new();
    let ctx = WaitContext { state: &state, notify: &notify };

    // No one ever answers a nudge, so the three-nudge budget burns down and
    // the wait gives up with SilenceTimeout well before the much longer
    // command_timeout would fire on its own.
    let err = wait_for_prompt(&ctx, Duration::from_millis(30), Duration::from_secs(5), true)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SilenceTimeout));

    let queued = state.lock().unwrap().queue.len();
    assert_eq!(queued, 3, "exactly three nudge newlines should have been queued");
}

#[tokio::test]
async fn silence_timeout_returns_false_when_not_raising() {
    let state = Mutex::new(fixture_state("box#"));
    let notify = Notify::new();
    let ctx = WaitContext { state: &state, notify: &notify };

    let matched = wait_for_prompt(&ctx, Duration::from_millis(30), Duration::from_secs(5), false).await.unwrap();
    assert!(!matched);
}

#[tokio::test]
async fn fresh_output_resets_the_nudge_counter() {
    let state = Arc::new(Mutex::new(fixture_state("box#")));
    let notify = Arc::new(Notify::new());

    // Keep answering nudges with fresh (non-prompt) output at a cadence much
    // shorter than the nudge interval, so the nudge counter keeps resetting
    // to zero and the wait only stops once the (much longer) command
    // timeout fires, instead of SilenceTimeout after three stale nudges.
    let writer_state = Arc::clone(&state);
    let writer_notify = Arc::clone(&notify);
    tokio::spawn(async move {
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(15)).await;
            let mut state = writer_state.lock().unwrap();
            state.buffers.current_mut().combined.push_str("still working\n");
            state.last_output_time = std::time::Instant::now();
            drop(state);
            writer_notify.notify_waiters();
        }
    });

    let ctx = WaitContext { state: &state, notify: &notify };
    let err = wait_for_prompt(&ctx, Duration::from_millis(100), Duration::from_millis(300), true)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CommandTimeout));
}

#[tokio::test]
async fn resolves_once_background_writer_delivers_prompt() {
    let state = Arc::new(Mutex::new(fixture_state("box#")));
    let notify = Arc::new(Notify::new());

    let writer_state = Arc::clone(&state);
    let writer_notify = Arc::clone(&notify);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        writer_state.lock().unwrap().buffers.current_mut().combined.push_str("out\nbox#");
        writer_notify.notify_waiters();
    });

    let ctx = WaitContext { state: &state, notify: &notify };
    let matched = wait_for_prompt(&ctx, Duration::ZERO, Duration::from_secs(2), true).await.unwrap();
    assert!(matched);
}
