//! Device-menu dialect: drives a numbered text menu (as
//! network appliances and embedded consoles commonly present on login)
//! through to its "drop into a real shell" option, then reassigns `PS1` so
//! the rest of the driver can treat it like any other shell.
//!
//! Grounded in the same re-entrant prompt scoping [`crate::prompt::PromptGuard`]
//! models for a single guarded region, generalized here across two
//! navigation steps plus a nested interpreter the running script can enter
//! and leave at will.

use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{Error, Result};
use crate::hooks::{HookFn, HookOutcome};
use crate::session::{ExecOptions, Session, SetupHook};

static MENU_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\)\s*(.+?)\s*$").expect("invalid menu line regex"));

static BANNER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(?P<version>[^\]]+)\]\[(?P<user>[^@\]]+)@(?P<host>[^\]]+)\](?P<path>[^:]*):")
        .expect("invalid banner regex")
});

/// The fields carried by a device's shell banner, e.g.
/// `[23.01-RELEASE][admin@router]/root:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub version: String,
    pub user: String,
    pub host: String,
    pub path: String,
}

/// Find the numbered option whose label contains `label`
/// (case-insensitively), e.g. `parse_menu_choice(menu, "Shell")` matching a
/// line that reads `8) Shell`.
#[must_use]
pub fn parse_menu_choice(menu_text: &str, label: &str) -> Option<u32> {
    let label_lower = label.to_lowercase();
    menu_text.lines().find_map(|line| {
        let caps = MENU_LINE.captures(line)?;
        caps[2].to_lowercase().contains(&label_lower).then(|| caps[1].parse().ok()).flatten()
    })
}

/// Parse a device's shell banner out of captured text.
#[must_use]
pub fn parse_banner(text: &str) -> Option<Banner> {
    let caps = BANNER.captures(text)?;
    Some(Banner {
        version: caps["version"].to_string(),
        user: caps["user"].to_string(),
        host: caps["host"].to_string(),
        path: caps["path"].to_string(),
    })
}

/// [`SetupHook`] for a device console: read the numbered menu already on
/// screen after connect, select the entry whose label matches
/// `shell_menu_label`, parse the resulting banner, then reassign `PS1` to
/// the session's configured prompt so every later `exec` behaves normally.
pub struct DeviceSetup {
    pub shell_menu_label: String,
}

impl DeviceSetup {
    #[must_use]
    pub fn new(shell_menu_label: impl Into<String>) -> Self {
        Self { shell_menu_label: shell_menu_label.into() }
    }
}

#[async_trait::async_trait]
impl SetupHook for DeviceSetup {
    async fn setup(&self, session: &Session) -> Result<()> {
        let menu_pattern = Regex::new(r"(?m)Enter an option:\s*$").expect("invalid menu prompt regex");
        let menu_token = session.push_temporary_prompt_pattern("Enter an option:", menu_pattern);
        session.push_capture();
        let matched = session.wait_for_active_prompt(Duration::from_secs(10), Duration::from_secs(30), false).await?;
        let menu_text = session.combined_output();
        session.pop_capture_discard();
        session.pop_temporary_prompt(menu_token);

        if !matched {
            return Err(Error::FailedToSetPrompt);
        }

        let choice = parse_menu_choice(&menu_text, &self.shell_menu_label).ok_or(Error::FailedToStartShell)?;

        let banner_token = session.push_temporary_prompt_pattern("device shell banner", BANNER.clone());
        session.push_capture();
        session.queue_raw(&choice.to_string());
        let matched = session.wait_for_active_prompt(Duration::from_secs(10), Duration::from_secs(30), false).await?;
        let banner_text = session.combined_output();
        session.pop_capture_discard();
        session.pop_temporary_prompt(banner_token);

        if !matched {
            return Err(Error::FailedToStartShell);
        }
        parse_banner(&banner_text).ok_or(Error::FailedToStartShell)?;

        let literal = session.options().prompt().to_string();
        session.set_prompt_literal(literal.clone());
        session
            .exec_ignore_code(&format!("PS1='{literal}'"), ExecOptions::default())
            .await?;
        Ok(())
    }
}

/// Enter the device's nested PHP interpreter, run `body` with the
/// interpreter's prompt active, then leave it. `php -a` itself is what
/// changes the remote's prompt, so the temporary-prompt swap must already
/// be in effect before that command is sent -- `wait_for_prompt` inside
/// `exec_ignore_code("php -a", ...)` is waiting for whatever pattern is
/// active at the time it's called, and that has to be `"php > "`, not the
/// outer shell's prompt, or it will nudge until `SilenceTimeout`. The
/// interpreter doesn't echo commands the way bash does, and it cannot
/// report an exit code, so callers composing this dialect should also
/// install [`crate::session::UndefinedExitCodeProbe`].
pub async fn enter_php_shell<F, Fut, T>(session: &Session, body: F) -> Result<T>
where
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let token = session.push_temporary_prompt("php > ");

    let entered = session
        .exec_ignore_code(
            "php -a",
            ExecOptions { silence_timeout: Some(Duration::from_secs(5)), ..Default::default() },
        )
        .await;

    let result = match entered {
        Ok(_) => body(session.clone()).await,
        Err(e) => Err(e),
    };

    // Restore the outer prompt before sending `exit`: that command's own
    // output is the outer shell's prompt reappearing, not another
    // `"php > "`.
    session.pop_temporary_prompt(token);

    session
        .exec_ignore_code(
            "exit",
            ExecOptions { command_is_echoed: Some(false), ..Default::default() },
        )
        .await?;

    result
}

/// Build an `on_exception` hook that treats [`Error::RestartNow`] as a
/// signal to swap the session's quit command for `reboot_command` and
/// report the exception handled: the recovery path for a device that
/// needs a different exit command after a user script requests a restart
/// mid-run.
#[must_use]
pub fn on_restart_now(reboot_command: impl Into<String>) -> HookFn {
    let reboot_command = reboot_command.into();
    Box::new(move |session, error| match error {
        Some(Error::RestartNow) => {
            session.change_quit(reboot_command.clone());
            Ok(HookOutcome::Break)
        }
        _ => Ok(HookOutcome::Continue),
    })
}
