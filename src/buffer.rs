//! Output buffers and the buffer stack.
//!
//! Three logical buffers travel together everywhere they're used: `stdout`,
//! `stderr`, and `combined`. The stack exists so internal driver operations
//! (exit-code probing, a dialect's temporary sub-prompt) can capture their
//! own transcript without polluting the one visible to the caller, then
//! either fold their capture back in (`pop_merge`) or throw it away
//! (`pop_discard`).

/// A snapshot of the three output streams at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputBuffers {
    pub stdout: String,
    pub stderr: String,
    pub combined: String,
}

/// LIFO of [`OutputBuffers`], plus the buffers currently being written to.
#[derive(Debug, Clone, Default)]
pub struct BufferStack {
    current: OutputBuffers,
    stack: Vec<OutputBuffers>,
}

impl BufferStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> &OutputBuffers {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut OutputBuffers {
        &mut self.current
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Save the current triple and reset the active buffers to empty.
    pub fn push(&mut self) {
        self.stack.push(std::mem::take(&mut self.current));
    }

    /// Concatenate the popped, historical buffers *in front of* the current
    /// ones (history-then-current), then make that the active triple.
    ///
    /// # Panics
    /// Panics if the stack is empty -- every `push` must be matched by
    /// exactly one `pop_merge`/`pop_discard`.
    pub fn pop_merge(&mut self) {
        let mut history = self.stack.pop().expect("pop_merge with empty buffer stack");
        history.stdout.push_str(&self.current.stdout);
        history.stderr.push_str(&self.current.stderr);
        history.combined.push_str(&self.current.combined);
        self.current = history;
    }

    /// Replace the active buffers with the popped historical ones, discarding
    /// whatever was captured since the matching `push`.
    ///
    /// # Panics
    /// Panics if the stack is empty.
    pub fn pop_discard(&mut self) {
        self.current = self.stack.pop().expect("pop_discard with empty buffer stack");
    }
}
