//! Black-box tests of the device-menu dialect: menu/banner navigation
//! through [`shelldrive::dialects::device::DeviceSetup`], and the simpler
//! `on_restart_now` hook factory.

use std::sync::Arc;
use std::time::Duration;

use shelldrive::dialects::device::{enter_php_shell, on_restart_now, parse_banner, parse_menu_choice, DeviceSetup};
use shelldrive::transport::loopback::LoopbackTransport;
use shelldrive::{Error, ExecOptions, Session, SessionOptionsBuilder, SshShellMode, TransportOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn fresh_session(prompt: &str) -> (Session, tokio::io::DuplexStream) {
    let (transport, peer) = LoopbackTransport::pair();
    let options = SessionOptionsBuilder::new(TransportOptions::Ssh {
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
    (Session::new(options, Box::new(transport)), peer)
}

#[tokio::test]
async fn device_setup_selects_the_shell_entry_and_reassigns_the_prompt() {
    let (session, mut peer) = fresh_session("box#");
    session.set_setup_hook(Arc::new(DeviceSetup::new("Shell")));

    let peer_task = tokio::spawn(async move {
        let mut buf = [0_u8; 512];

        // The menu arrives unprompted as soon as the device connects; give
        // the worker a chance to open its own capture scope first so this
        // text lands inside it rather than the buffer level beneath it.
        tokio::time::sleep(Duration::from_millis(30)).await;
        peer.write_all(b"0) Logout\n1) Assign Interfaces\n8) Shell\n9) pfTop\nEnter an option: ")
            .await
            .unwrap();

        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"8\n");
        peer.write_all(b"[23.01-RELEASE][admin@router]/root: ").await.unwrap();

        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"PS1='box#'\n");
        peer.write_all(b"PS1='box#'\nbox#").await.unwrap();

        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"exit\n");
        peer.write_all(b"exit\nbox#").await.unwrap();
    });

    session.run(|_session| async move { Ok(()) }).await.unwrap();
    peer_task.await.unwrap();
}

#[tokio::test]
async fn device_setup_fails_when_the_menu_has_no_matching_entry() {
    let (session, mut peer) = fresh_session("box#");
    session.set_setup_hook(Arc::new(DeviceSetup::new("Shell")));

    let peer_task = tokio::spawn(async move {
        let mut buf = [0_u8; 512];
        tokio::time::sleep(Duration::from_millis(30)).await;
        peer.write_all(b"0) Logout\n1) Assign Interfaces\nEnter an option: ").await.unwrap();

        // Setup fails right after the menu read, but teardown still runs
        // and sends the quit command.
        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"exit\n");
        peer.write_all(b"exit\nbox#").await.unwrap();
    });

    let result = session.run(|_session| async move { Ok(()) }).await;
    assert!(matches!(result.unwrap_err(), Error::FailedToStartShell));
    peer_task.await.unwrap();
}

#[tokio::test]
async fn on_restart_now_swaps_the_quit_command_and_suppresses_the_error() {
    let (session, mut peer) = fresh_session("box#");
    session.register_hook(shelldrive::HookName::OnException, on_restart_now("reboot"));

    let peer_task = tokio::spawn(async move {
        let mut buf = [0_u8; 256];
        peer.write_all(b"box#").await.unwrap();
        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"exit\n");
        peer.write_all(b"exit\nbox#").await.unwrap();
    });

    let result = session.run(|_session| async move { Err(Error::RestartNow) }).await;
    assert!(result.is_ok(), "on_restart_now must suppress the triggering error");
    assert_eq!(session.options().quit(), "reboot");
    peer_task.await.unwrap();
}

#[tokio::test]
async fn enter_php_shell_swaps_the_prompt_before_the_command_that_triggers_it() {
    // Regression test: `php -a` is what moves the remote into the `php > `
    // prompt, so the temporary prompt must already be active when that
    // command is sent, or the wait for it will nudge until SilenceTimeout.
    let (session, mut peer) = fresh_session("box#");

    let peer_task = tokio::spawn(async move {
        let mut buf = [0_u8; 512];
        peer.write_all(b"box#").await.unwrap();

        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"php -a\n");
        peer.write_all(b"php -a\nInteractive shell\n\nphp > ").await.unwrap();

        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"echo 1;\n");
        peer.write_all(b"echo 1;\n1\nphp > ").await.unwrap();

        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"exit\n");
        peer.write_all(b"exit\nbox#").await.unwrap();

        // teardown's own quit command, now that the outer prompt is back.
        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"exit\n");
        peer.write_all(b"exit\nbox#").await.unwrap();
    });

    session
        .run(|session| async move {
            enter_php_shell(&session, |inner| async move {
                let out = inner.exec_ignore_code("echo 1;", ExecOptions::default()).await?;
                assert_eq!(out, "1\n");
                Ok(())
            })
            .await
        })
        .await
        .unwrap();

    peer_task.await.unwrap();
}

#[tokio::test]
async fn enter_php_shell_restores_the_outer_prompt_even_when_body_fails() {
    let (session, mut peer) = fresh_session("box#");

    let peer_task = tokio::spawn(async move {
        let mut buf = [0_u8; 512];
        peer.write_all(b"box#").await.unwrap();

        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"php -a\n");
        peer.write_all(b"php -a\nphp > ").await.unwrap();

        // `exit` still has to be sent against the restored outer prompt.
        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"exit\n");
        peer.write_all(b"exit\nbox#").await.unwrap();

        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"exit\n");
        peer.write_all(b"exit\nbox#").await.unwrap();
    });

    let result = session
        .run(|session| async move {
            let inner = enter_php_shell(&session, |_inner| async move {
                Err(Error::InvalidOption("boom".into()))
            })
            .await;
            inner
        })
        .await;

    assert!(matches!(result.unwrap_err(), Error::InvalidOption(_)));
    peer_task.await.unwrap();
}

#[test]
fn parses_the_numbered_entry_matching_a_label() {
    let menu = "0) Logout\n1) Assign Interfaces\n8) Shell\n9) pfTop\n";
    assert_eq!(parse_menu_choice(menu, "Shell"), Some(8));
    assert_eq!(parse_menu_choice(menu, "shell"), Some(8));
    assert_eq!(parse_menu_choice(menu, "Nonexistent"), None);
}

#[test]
fn parses_a_version_stamped_banner() {
    let text = "Welcome\n[23.01-RELEASE][admin@router]/root: ";
    let banner = parse_banner(text).unwrap();
    assert_eq!(banner.version, "23.01-RELEASE");
    assert_eq!(banner.user, "admin");
    assert_eq!(banner.host, "router");
    assert_eq!(banner.path, "/root");
}

#[test]
fn missing_banner_returns_none() {
    assert!(parse_banner("no banner here").is_none());
}
