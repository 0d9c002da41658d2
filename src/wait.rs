//! The wait loop: blocks the calling (worker) strand until
//! the active prompt appears in the combined buffer, or until a silence or
//! command timeout gives up.
//!
//! The reactor task (`session.rs`) is the one actually pumping the
//! transport and draining the input queue; this function only *observes*
//! the shared state it mutates and wakes on its `Notify` -- the worker
//! strand's `exec` blocks by virtue of the reactor delivering prompt
//! matches. Nudges are queued here (the worker is
//! allowed to produce into the input queue) but written to the transport by
//! the reactor on its next pass, preserving "only the reactor writes".
//!
//! State is guarded by a plain `std::sync::Mutex`, not `tokio::sync::Mutex`:
//! every critical section here is a string append or FIFO push with no
//! `.await` inside it, and the transport's byte-arrival
//! callback (`session.rs`) is itself a synchronous `FnMut`, so an
//! async-aware lock would only add overhead without buying anything.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::state::SessionState;

/// Borrowed handle to the shared pieces `wait_for_prompt` needs, without
/// requiring the whole `Session`/`SessionInner` type to be visible here.
pub struct WaitContext<'a> {
    pub state: &'a Mutex<SessionState>,
    pub notify: &'a Notify,
}

const POLL_CAP: Duration = Duration::from_millis(50);
const MAX_NUDGES: u8 = 3;

fn next_wake(nudge_deadline: Option<Instant>, command_deadline: Option<Instant>, now: Instant) -> Duration {
    let mut wait = POLL_CAP;
    for deadline in [nudge_deadline, command_deadline].into_iter().flatten() {
        let remaining = deadline.saturating_duration_since(now);
        wait = wait.min(remaining.max(Duration::from_millis(1)));
    }
    wait
}

/// `silence_timeout`/`command_timeout` of `Duration::ZERO`
/// disable that check, matching the option set's "0 = none" convention.
/// Returns `Ok(true)` on a normal prompt match, `Ok(false)` when a timeout
/// was reached with `raise_on_timeout=false`, or `Err` when it was reached
/// with `raise_on_timeout=true`.
pub async fn wait_for_prompt(
    ctx: &WaitContext<'_>,
    silence_timeout: Duration,
    command_timeout: Duration,
    raise_on_timeout: bool,
) -> Result<bool> {
    let nudge_interval = (!silence_timeout.is_zero()).then(|| silence_timeout / 3);
    let command_deadline = (!command_timeout.is_zero()).then(|| Instant::now() + command_timeout);

    let mut nudge_count: u8 = 0;
    let mut last_seen_output = ctx.state.lock().unwrap().last_output_time;
    let mut next_nudge_at = nudge_interval.map(|interval| last_seen_output + interval);

    loop {
        {
            let state = ctx.state.lock().unwrap();
            if state.prompt.matches_tail(&state.buffers.current().combined) {
                drop(state);
                return Ok(finish_after_match(ctx));
            }
        }

        let now = Instant::now();

        if let Some(interval) = nudge_interval {
            let current_output_time = ctx.state.lock().unwrap().last_output_time;
            if current_output_time != last_seen_output {
                last_seen_output = current_output_time;
                nudge_count = 0;
                next_nudge_at = Some(last_seen_output + interval);
            }

            if next_nudge_at.is_some_and(|at| now >= at) {
                if nudge_count >= MAX_NUDGES {
                    return if raise_on_timeout { Err(Error::SilenceTimeout) } else { Ok(false) };
                }
                nudge_count += 1;
                let mut state = ctx.state.lock().unwrap();
                state.queue_line("");
                state.last_output_time = Instant::now();
                last_seen_output = state.last_output_time;
                next_nudge_at = Some(last_seen_output + interval);
            }
        }

        if let Some(deadline) = command_deadline {
            if now >= deadline {
                return if raise_on_timeout { Err(Error::CommandTimeout) } else { Ok(false) };
            }
        }

        let wait = next_wake(next_nudge_at, command_deadline, now);
        let _ = tokio::time::timeout(wait, ctx.notify.notified()).await;
    }
}

/// Locate the prompt, insert a newline before it if
/// one isn't already there, and ensure `stdout` ends with a newline.
fn finish_after_match(ctx: &WaitContext<'_>) -> bool {
    let mut state = ctx.state.lock().unwrap();

    if let Some((start, _end)) = state.prompt.find_in(&state.buffers.current().combined) {
        let needs_newline = start > 0 && !state.buffers.current().combined[..start].ends_with('\n');
        if needs_newline {
            state.buffers.current_mut().combined.insert(start, '\n');
        }
    }

    let buffers = state.buffers.current_mut();
    if !buffers.stdout.is_empty() && !buffers.stdout.ends_with('\n') {
        buffers.stdout.push('\n');
    }
    true
}
