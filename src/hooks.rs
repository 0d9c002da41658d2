//! Hook registry.
//!
//! The Ruby original relies on class-level mutable maps and mixin modules
//! inherited along a class chain. There is no class hierarchy in Rust, so
//! this models the same contract -- "a per-class ordered list of callbacks
//! keyed by hook name, inherited along the class chain" -- as a plain struct
//! holding one `Vec` per hook name that a dialect composes into at
//! construction time: dialects register themselves by composition, not
//! inheritance. A session's final hook list is just the parent chain's
//! list concatenated with its own, built once before `run`.

use crate::session::Session;

/// The fixed set of hook points a session can fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookName {
    OnDebug,
    OnBeforeRun,
    OnAfterRun,
    OnInit,
    OnException,
    BeforeInit,
    AfterInit,
    BeforeTerm,
    AfterTerm,
}

/// Whether a hook chain should keep iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// Keep calling the remaining hooks for this invocation.
    Continue,
    /// Stop iterating; the event is considered handled.
    Break,
}

/// A single hook callback. Hooks receive the session (so they can call back
/// into it, e.g. `change_quit`) and, for `on_exception`, the error that was
/// raised. A hook can itself fail (e.g. a `before_init` hook that probes the
/// remote host and can't reach it) -- returning `Err` aborts the remaining
/// hooks in its chain, which `session.rs`'s lifecycle treats the same way it
/// treats a failure from the phase the hook guards.
pub type HookFn =
    Box<dyn Fn(&Session, Option<&crate::error::Error>) -> crate::error::Result<HookOutcome> + Send + Sync>;

/// Ordered, per-hook-name list of callbacks, flattened from a parent chain
/// plus a dialect's own registrations at construction time.
#[derive(Default)]
pub struct HookRegistry {
    on_debug: Vec<HookFn>,
    on_before_run: Vec<HookFn>,
    on_after_run: Vec<HookFn>,
    on_init: Vec<HookFn>,
    on_exception: Vec<HookFn>,
    before_init: Vec<HookFn>,
    after_init: Vec<HookFn>,
    before_term: Vec<HookFn>,
    after_term: Vec<HookFn>,
}

impl HookRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn list_mut(&mut self, name: HookName) -> &mut Vec<HookFn> {
        match name {
            HookName::OnDebug => &mut self.on_debug,
            HookName::OnBeforeRun => &mut self.on_before_run,
            HookName::OnAfterRun => &mut self.on_after_run,
            HookName::OnInit => &mut self.on_init,
            HookName::OnException => &mut self.on_exception,
            HookName::BeforeInit => &mut self.before_init,
            HookName::AfterInit => &mut self.after_init,
            HookName::BeforeTerm => &mut self.before_term,
            HookName::AfterTerm => &mut self.after_term,
        }
    }

    fn list(&self, name: HookName) -> &[HookFn] {
        match name {
            HookName::OnDebug => &self.on_debug,
            HookName::OnBeforeRun => &self.on_before_run,
            HookName::OnAfterRun => &self.on_after_run,
            HookName::OnInit => &self.on_init,
            HookName::OnException => &self.on_exception,
            HookName::BeforeInit => &self.before_init,
            HookName::AfterInit => &self.after_init,
            HookName::BeforeTerm => &self.before_term,
            HookName::AfterTerm => &self.after_term,
        }
    }

    /// Register a callback at the end of `name`'s chain (subclass/dialect
    /// hooks are appended after whatever a parent chain already installed).
    pub fn register(&mut self, name: HookName, hook: HookFn) {
        self.list_mut(name).push(hook);
    }

    /// Merge another registry's hooks in after this one's, e.g. composing a
    /// dialect's hooks onto the core's default list.
    pub fn extend_from(&mut self, mut other: HookRegistry) {
        for name in [
            HookName::OnDebug,
            HookName::OnBeforeRun,
            HookName::OnAfterRun,
            HookName::OnInit,
            HookName::OnException,
            HookName::BeforeInit,
            HookName::AfterInit,
            HookName::BeforeTerm,
            HookName::AfterTerm,
        ] {
            self.list_mut(name).append(other.list_mut(name));
        }
    }

    /// Run every hook registered for `name` in insertion order. Stops early
    /// if a hook returns [`HookOutcome::Break`], reporting `Ok(true)`
    /// (handled). A hook returning anything else continues to the next. The
    /// first hook to return `Err` aborts the chain and propagates.
    pub fn run(
        &self,
        name: HookName,
        session: &Session,
        error: Option<&crate::error::Error>,
    ) -> crate::error::Result<bool> {
        for hook in self.list(name) {
            if hook(session, error)? == HookOutcome::Break {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("on_debug", &self.on_debug.len())
            .field("on_before_run", &self.on_before_run.len())
            .field("on_after_run", &self.on_after_run.len())
            .field("on_init", &self.on_init.len())
            .field("on_exception", &self.on_exception.len())
            .field("before_init", &self.before_init.len())
            .field("after_init", &self.after_init.len())
            .field("before_term", &self.before_term.len())
            .field("after_term", &self.after_term.len())
            .finish()
    }
}
