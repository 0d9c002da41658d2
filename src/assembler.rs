//! Output assembler: turns raw inbound bytes into normalised
//! text appended to the three logical buffers, using a CSI/control-sequence
//! stripping pass similar to a plain ANSI-stripping helper that just throws
//! escape codes away outright -- except this one keeps a behaviour such a
//! helper wouldn't need: a CSI cursor-movement command becomes a newline
//! rather than vanishing, since a prompt matcher downstream needs the line
//! break that movement implied.

use std::sync::LazyLock;

use regex::Regex;

use crate::state::{SessionState, StreamKind};

/// CSI sequences whose final byte is a cursor-movement command (`A` up,
/// `B` down, `C` forward, `D` back, `H`/`f` cursor position).
static CSI_CURSOR_MOVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[ABCDHf]").expect("invalid cursor-movement regex"));

/// Every other CSI sequence (colour/style SGR, erase-line, scroll region, …).
static CSI_OTHER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?<=>!]*[a-zA-Z~]").expect("invalid CSI regex"));

/// Character-set designation sequences, e.g. `ESC ( B`.
static CHARSET_SEQ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b[()#][0-9A-Za-z]").expect("invalid charset regex"));

/// OSC sequences terminated by BEL or ST (`ESC \`).
static OSC_SEQ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)").expect("invalid OSC regex"));

/// Any other lone escape (single-character escape, or a stray `ESC \`
/// string terminator not already consumed above).
static LONE_ESCAPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b.?").expect("invalid escape regex"));

/// Strip terminal control artefacts per spec.md §4.2 step 1.
fn strip_control_sequences(input: &str) -> String {
    let stage = CSI_CURSOR_MOVE.replace_all(input, "\n");
    let stage = CSI_OTHER.replace_all(&stage, "");
    let stage = CHARSET_SEQ.replace_all(&stage, "");
    let stage = OSC_SEQ.replace_all(&stage, "");
    let stage = LONE_ESCAPE.replace_all(&stage, "");

    let mut out = String::with_capacity(stage.len());
    for c in stage.chars() {
        match c {
            '\n' | '\r' => out.push(c),
            '\t' => out.push(' '),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

/// Reduce newline variants per spec.md §4.2 step 2: `CRLF -> LF`, a lone
/// space-then-CR (some shells pad the cursor back one column before a
/// redraw) vanishes entirely, and any remaining bare `CR` vanishes too.
fn normalize_newlines(input: &str) -> String {
    input.replace("\r\n", "\n").replace(" \r", "").replace('\r', "")
}

fn contains_subsequence(haystack: &str, needle: &[u8]) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.as_bytes().windows(needle.len()).any(|window| window == needle)
}

/// Process one chunk of inbound bytes from `kind`, updating `state` in
/// place. Mirrors spec.md §4.2's five steps exactly.
pub fn on_bytes(state: &mut SessionState, kind: StreamKind, data: &[u8]) {
    let raw = String::from_utf8_lossy(data);
    let stripped = strip_control_sequences(&raw);
    let normalized = normalize_newlines(&stripped);

    // Step 3: rightmost prompt occurrence. The matcher's pattern is always
    // end-anchored (prompt.rs), so "rightmost occurrence in the chunk" and
    // "matches the chunk's tail" are the same question.
    let prefix: &str = match state.prompt.find_in(&normalized) {
        Some((start, _end)) => &normalized[..start],
        None => &normalized[..],
    };

    match kind {
        StreamKind::Stdout => state.buffers.current_mut().stdout.push_str(prefix),
        StreamKind::Stderr => state.buffers.current_mut().stderr.push_str(&normalized),
    }
    state.buffers.current_mut().combined.push_str(&normalized);

    // Step 4.
    state.last_output_time = std::time::Instant::now();
    if let Some(waiting) = state.waiting_for_echo_of.clone() {
        if contains_subsequence(&normalized, &waiting) {
            state.waiting_for_echo_of = None;
        }
    }

    // Step 5.
    if let Some(mut monitor) = state.monitor.take() {
        let reply = monitor(prefix, kind);
        state.monitor = Some(monitor);
        if let Some(reply) = reply {
            if !reply.is_empty() {
                state.queue_line(&reply);
            }
        }
    }
}
