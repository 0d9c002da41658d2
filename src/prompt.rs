//! Prompt sanitization and matching.
//!
//! A fixed pair of UUID markers matched with `str::find` would be simpler,
//! but this driver needs an *active, swappable* pattern, because dialects
//! re-enter the same session with a different prompt (a nested interpreter,
//! a device's `[version][user@host]/path:` banner). [`PromptMatcher`] plus
//! the RAII [`PromptGuard`] model that swap as a compiled pattern behind a
//! small wrapper -- except this one is allowed to change at runtime and
//! always restores itself.

use regex::Regex;

/// Characters the Ruby original substitutes out of a literal prompt string
/// before treating it as a shell prompt, since they have special meaning to
/// common shells (`!` history expansion, `$` variable expansion, backslash
/// escapes, slashes that would break a `PS1` assignment, and quotes).
const UNSAFE_CHARS: &[(char, char)] = &[
    ('!', '1'),
    ('$', '2'),
    ('\\', '3'),
    ('/', '4'),
    ('"', '5'),
    ('\'', '6'),
];

/// Default prompt used when sanitization leaves nothing behind.
pub const DEFAULT_PROMPT: &str = "~~#";

/// Sanitize a user-supplied prompt string.
#[must_use]
pub fn sanitize_prompt(raw: &str) -> String {
    let mut sanitized: String = raw
        .chars()
        .map(|c| UNSAFE_CHARS.iter().find(|(bad, _)| *bad == c).map_or(c, |(_, sub)| *sub))
        .collect();

    if sanitized.trim().is_empty() {
        sanitized = DEFAULT_PROMPT.to_string();
    }
    sanitized
}

/// Compile a literal prompt string into a regex anchored at the end of the
/// buffer, tolerating trailing spaces/tabs but no other whitespace.
fn compile_literal(literal: &str) -> Regex {
    let escaped = regex::escape(literal);
    Regex::new(&format!("{escaped}[ \\t]*$")).expect("escaped literal prompt must compile")
}

/// The currently active prompt pattern, with save/restore support for
/// dialects that need to temporarily expect something else.
#[derive(Debug, Clone)]
pub struct PromptMatcher {
    literal: String,
    pattern: Regex,
}

impl PromptMatcher {
    /// Build a matcher from a raw (not yet sanitized) prompt string.
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        let literal = sanitize_prompt(raw);
        let pattern = compile_literal(&literal);
        Self { literal, pattern }
    }

    /// The sanitized literal prompt text (used to build shell `PS1`
    /// assignments and similar).
    #[must_use]
    pub fn literal(&self) -> &str {
        &self.literal
    }

    #[must_use]
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Does the tail of `text` contain an unbroken match of the active
    /// prompt pattern?
    #[must_use]
    pub fn matches_tail(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Find the match's byte range in `text`, if any.
    #[must_use]
    pub fn find_in(&self, text: &str) -> Option<(usize, usize)> {
        self.pattern.find(text).map(|m| (m.start(), m.end()))
    }

    /// Install a literal prompt, replacing whatever was active. Returns the
    /// previous matcher so the caller can restore it (see [`PromptGuard`] for
    /// the safe, scoped version dialects should prefer).
    pub fn set_literal(&mut self, literal: impl Into<String>) -> PromptMatcher {
        let literal = literal.into();
        let pattern = compile_literal(&literal);
        std::mem::replace(self, Self { literal, pattern })
    }

    /// Install a caller-provided regex directly (for dialects whose prompt
    /// isn't a fixed literal, e.g. a version-stamped banner).
    pub fn set_pattern(&mut self, literal: impl Into<String>, pattern: Regex) -> PromptMatcher {
        std::mem::replace(self, Self { literal: literal.into(), pattern })
    }
}

/// Scoped override of the active prompt, restored on every exit path
/// (normal return, early return, or panic-driven unwind). Dialects use
/// this to enter a nested interpreter or a device's sub-shell that echoes
/// a different prompt.
///
/// Construct with [`PromptMatcher::set_literal`]/[`set_pattern`] captured in
/// `previous`; dropping the guard restores it. Because the matcher itself
/// lives behind the session's mutex, callers build the guard while holding
/// the lock and must not hold it across an `.await`.
pub struct PromptGuard<'a> {
    matcher: &'a mut PromptMatcher,
    previous: Option<PromptMatcher>,
}

impl<'a> PromptGuard<'a> {
    #[must_use]
    pub fn literal(matcher: &'a mut PromptMatcher, literal: impl Into<String>) -> Self {
        let previous = matcher.set_literal(literal);
        Self { matcher, previous: Some(previous) }
    }

    #[must_use]
    pub fn pattern(matcher: &'a mut PromptMatcher, literal: impl Into<String>, pattern: Regex) -> Self {
        let previous = matcher.set_pattern(literal, pattern);
        Self { matcher, previous: Some(previous) }
    }
}

impl Drop for PromptGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *self.matcher = previous;
        }
    }
}
