//! Black-box tests of hook registration and composition, independent of a
//! running session -- `HookRegistry::run` only needs a `&Session` to hand
//! to each callback, not a connected one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shelldrive::transport::loopback::LoopbackTransport;
use shelldrive::{Error, HookName, HookOutcome, HookRegistry, Session, SessionOptionsBuilder, SshShellMode, TransportOptions};

fn blank_session() -> Session {
    let (transport, _peer) = LoopbackTransport::pair();
    let options = SessionOptionsBuilder::new(TransportOptions::Ssh {
        host: "localhost".into(),
        port: 22,
        user: "root".into(),
        password: None,
        shell: SshShellMode::LoginShell,
        connect_timeout: Duration::from_secs(5),
    })
    .build()
    .unwrap();
    Session::new(options, Box::new(transport))
}

fn counting_hook(counter: Arc<AtomicUsize>) -> shelldrive::HookFn {
    Box::new(move |_session, _error| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(HookOutcome::Continue)
    })
}

#[test]
fn hooks_run_in_registration_order() {
    let session = blank_session();
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let mut registry = HookRegistry::new();
    for label in ["first", "second", "third"] {
        let order = order.clone();
        registry.register(
            HookName::OnInit,
            Box::new(move |_session, _error| {
                order.lock().unwrap().push(label);
                Ok(HookOutcome::Continue)
            }),
        );
    }

    let handled = registry.run(HookName::OnInit, &session, None).unwrap();
    assert!(!handled);
    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn a_break_outcome_stops_the_remaining_chain() {
    let session = blank_session();
    let before = Arc::new(AtomicUsize::new(0));
    let after = Arc::new(AtomicUsize::new(0));

    let mut registry = HookRegistry::new();
    {
        let counter = before.clone();
        registry.register(
            HookName::OnDebug,
            Box::new(move |_s, _e| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(HookOutcome::Break)
            }),
        );
    }
    {
        let counter = after.clone();
        registry.register(HookName::OnDebug, counting_hook(counter));
    }

    let handled = registry.run(HookName::OnDebug, &session, None).unwrap();
    assert!(handled);
    assert_eq!(before.load(Ordering::SeqCst), 1);
    assert_eq!(after.load(Ordering::SeqCst), 0);
}

#[test]
fn a_failing_hook_aborts_the_chain_and_propagates() {
    let session = blank_session();
    let after = Arc::new(AtomicUsize::new(0));

    let mut registry = HookRegistry::new();
    registry.register(
        HookName::BeforeInit,
        Box::new(|_s, _e| Err(Error::InvalidOption("nope".into()))),
    );
    registry.register(HookName::BeforeInit, counting_hook(after.clone()));

    let err = registry.run(HookName::BeforeInit, &session, None).unwrap_err();
    assert!(matches!(err, Error::InvalidOption(_)));
    assert_eq!(after.load(Ordering::SeqCst), 0, "hooks after a failing one must not run");
}

#[test]
fn extend_from_appends_a_dialects_hooks_after_the_cores() {
    let session = blank_session();
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let mut core = HookRegistry::new();
    {
        let order = order.clone();
        core.register(
            HookName::AfterTerm,
            Box::new(move |_s, _e| {
                order.lock().unwrap().push("core");
                Ok(HookOutcome::Continue)
            }),
        );
    }

    let mut dialect = HookRegistry::new();
    {
        let order = order.clone();
        dialect.register(
            HookName::AfterTerm,
            Box::new(move |_s, _e| {
                order.lock().unwrap().push("dialect");
                Ok(HookOutcome::Continue)
            }),
        );
    }

    core.extend_from(dialect);
    core.run(HookName::AfterTerm, &session, None).unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["core", "dialect"]);
}

#[test]
fn on_exception_hooks_receive_the_error_that_was_raised() {
    let session = blank_session();
    let mut registry = HookRegistry::new();

    registry.register(
        HookName::OnException,
        Box::new(|_session, error| {
            assert!(matches!(error, Some(Error::CommandTimeout)));
            Ok(HookOutcome::Break)
        }),
    );

    let handled = registry
        .run(HookName::OnException, &session, Some(&Error::CommandTimeout))
        .unwrap();
    assert!(handled);
}
