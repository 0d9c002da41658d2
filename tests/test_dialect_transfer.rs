//! Black-box tests of the base64 file-transfer dialect, scripting the
//! remote's `which`/`echo`/`base64` responses over the loopback transport.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use shelldrive::dialects::transfer::{read_file, write_file};
use shelldrive::transport::loopback::LoopbackTransport;
use shelldrive::{Session, SessionOptionsBuilder, SshShellMode, TransportOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn fresh_session() -> (Session, tokio::io::DuplexStream) {
    let (transport, peer) = LoopbackTransport::pair();
    let options = SessionOptionsBuilder::new(TransportOptions::Ssh {
        host: "localhost".into(),
        port: 22,
        user: "root".into(),
        password: None,
        shell: SshShellMode::LoginShell,
        connect_timeout: Duration::from_secs(5),
    })
    .prompt("box#")
    .build()
    .unwrap();
    (Session::new(options, Box::new(transport)), peer)
}

async fn expect_and_reply(peer: &mut tokio::io::DuplexStream, expected: &str, reply: &str) {
    let mut buf = [0_u8; 4096];
    let n = peer.read(&mut buf).await.unwrap();
    let sent = String::from_utf8_lossy(&buf[..n]).to_string();
    assert_eq!(sent, expected);
    peer.write_all(reply.as_bytes()).await.unwrap();
}

#[tokio::test]
async fn write_file_chunks_a_small_payload_through_a_single_echo_batch() {
    let (session, mut peer) = fresh_session();

    let peer_task = tokio::spawn(async move {
        peer.write_all(b"box#").await.unwrap();

        expect_and_reply(&mut peer, "which base64 >/dev/null 2>&1; echo $?\n", "which base64 >/dev/null 2>&1; echo $?\n0\nbox#").await;
        expect_and_reply(&mut peer, "rm -f '/tmp/x.b64'\n", "rm -f '/tmp/x.b64'\nbox#").await;
        expect_and_reply(&mut peer, "echo 'aGk=' >> '/tmp/x.b64'\n", "echo 'aGk=' >> '/tmp/x.b64'\nbox#").await;
        expect_and_reply(
            &mut peer,
            "base64 -d '/tmp/x.b64' > '/tmp/x'\n",
            "base64 -d '/tmp/x.b64' > '/tmp/x'\nbox#",
        )
        .await;
        expect_and_reply(&mut peer, "rm -f '/tmp/x.b64'\n", "rm -f '/tmp/x.b64'\nbox#").await;

        // teardown
        expect_and_reply(&mut peer, "exit\n", "exit\nbox#").await;
    });

    session
        .run(|session| async move {
            write_file(&session, "/tmp/x", b"hi").await?;
            Ok(())
        })
        .await
        .unwrap();

    peer_task.await.unwrap();
}

#[tokio::test]
async fn read_file_decodes_the_remote_encoded_text() {
    let (session, mut peer) = fresh_session();

    let peer_task = tokio::spawn(async move {
        peer.write_all(b"box#").await.unwrap();

        expect_and_reply(&mut peer, "which base64 >/dev/null 2>&1; echo $?\n", "which base64 >/dev/null 2>&1; echo $?\n0\nbox#").await;
        expect_and_reply(&mut peer, "base64 '/tmp/x'\n", "base64 '/tmp/x'\naGk=\nbox#").await;

        expect_and_reply(&mut peer, "exit\n", "exit\nbox#").await;
    });

    session
        .run(|session| async move {
            let data = read_file(&session, "/tmp/x").await?;
            assert_eq!(data, b"hi");
            Ok(())
        })
        .await
        .unwrap();

    peer_task.await.unwrap();
}

#[tokio::test]
async fn write_file_falls_back_to_openssl_when_base64_is_missing() {
    let (session, mut peer) = fresh_session();

    let peer_task = tokio::spawn(async move {
        peer.write_all(b"box#").await.unwrap();

        expect_and_reply(&mut peer, "which base64 >/dev/null 2>&1; echo $?\n", "which base64 >/dev/null 2>&1; echo $?\n1\nbox#").await;
        expect_and_reply(&mut peer, "which openssl >/dev/null 2>&1; echo $?\n", "which openssl >/dev/null 2>&1; echo $?\n0\nbox#").await;
        expect_and_reply(&mut peer, "rm -f '/tmp/y.b64'\n", "rm -f '/tmp/y.b64'\nbox#").await;
        expect_and_reply(&mut peer, "echo 'eQ==' >> '/tmp/y.b64'\n", "echo 'eQ==' >> '/tmp/y.b64'\nbox#").await;
        expect_and_reply(
            &mut peer,
            "openssl base64 -d -in '/tmp/y.b64' -out '/tmp/y'\n",
            "openssl base64 -d -in '/tmp/y.b64' -out '/tmp/y'\nbox#",
        )
        .await;
        expect_and_reply(&mut peer, "rm -f '/tmp/y.b64'\n", "rm -f '/tmp/y.b64'\nbox#").await;

        expect_and_reply(&mut peer, "exit\n", "exit\nbox#").await;
    });

    session
        .run(|session| async move {
            write_file(&session, "/tmp/y", b"y").await?;
            Ok(())
        })
        .await
        .unwrap();

    peer_task.await.unwrap();
}

/// A generic fake remote shell that actually maintains a one-file staging
/// area and destination, so tests don't have to hand-script every
/// `echo >> ... && ...` batch a large payload splits into. Understands the
/// small vocabulary `write_file`/`read_file` actually send: `which`, `rm -f`,
/// an `echo '<b64 line>' >> '<encoded_path>' && ...` batch, a `base64 -d`
/// decode, and a `base64 '<path>'` encode.
async fn run_fake_file_shell(mut peer: tokio::io::DuplexStream, encoded_path: String) {
    let mut staging_b64 = String::new();
    let mut remote_file: Vec<u8> = Vec::new();
    let mut buf = vec![0_u8; 32 * 1024];

    peer.write_all(b"box#").await.unwrap();

    loop {
        let n = peer.read(&mut buf).await.unwrap();
        let sent = String::from_utf8_lossy(&buf[..n]).to_string();
        let command = sent.trim_end_matches('\n');

        if command == "exit" {
            peer.write_all(b"exit\nbox#").await.unwrap();
            break;
        }

        if command.starts_with("which ") {
            peer.write_all(format!("{sent}0\nbox#").as_bytes()).await.unwrap();
            continue;
        }

        if command.starts_with("rm -f") {
            staging_b64.clear();
            peer.write_all(format!("{sent}box#").as_bytes()).await.unwrap();
            continue;
        }

        if command.starts_with("base64 -d ") {
            remote_file = BASE64.decode(staging_b64.as_bytes()).expect("staged base64 must be well-formed");
            peer.write_all(format!("{sent}box#").as_bytes()).await.unwrap();
            continue;
        }

        if command.starts_with("base64 '") {
            let encoded = BASE64.encode(&remote_file);
            let wrapped: Vec<&str> =
                encoded.as_bytes().chunks(76).map(|c| std::str::from_utf8(c).unwrap()).collect();
            let body = wrapped.join("\n");
            peer.write_all(format!("{sent}{body}\nbox#").as_bytes()).await.unwrap();
            continue;
        }

        let suffix = format!("' >> '{encoded_path}'");
        for piece in command.split(" && ") {
            let inner = piece
                .strip_prefix("echo '")
                .and_then(|s| s.strip_suffix(&suffix))
                .unwrap_or_else(|| panic!("unexpected command in fake file shell: {piece}"));
            staging_b64.push_str(inner);
        }
        peer.write_all(format!("{sent}box#").as_bytes()).await.unwrap();
    }
}

#[tokio::test]
async fn write_file_then_read_file_round_trips_a_16kb_binary_payload_across_many_batches() {
    let (session, peer) = fresh_session();

    // Every byte value 0..=255 appears, including embedded NULs, and the
    // total size comfortably forces `write_file`'s echo batching past a
    // single `MAX_COMMAND_LEN`-bounded command.
    let data: Vec<u8> = (0..16_001usize).map(|i| (i % 256) as u8).collect();

    let peer_task = tokio::spawn(run_fake_file_shell(peer, "/tmp/big.b64".to_string()));

    session
        .run(|session| async move {
            write_file(&session, "/tmp/big", &data).await?;
            let read_back = read_file(&session, "/tmp/big").await?;
            assert_eq!(read_back, data);
            Ok(())
        })
        .await
        .unwrap();

    peer_task.await.unwrap();
}

#[tokio::test]
async fn write_file_then_read_file_round_trips_a_300_line_ascii_file() {
    let (session, peer) = fresh_session();

    let content: String = (1..=300).map(|n| format!("line {n}\n")).collect();
    let data = content.into_bytes();

    let peer_task = tokio::spawn(run_fake_file_shell(peer, "/tmp/log.txt.b64".to_string()));

    session
        .run(|session| async move {
            write_file(&session, "/tmp/log.txt", &data).await?;
            let read_back = read_file(&session, "/tmp/log.txt").await?;
            assert_eq!(read_back, data);
            Ok(())
        })
        .await
        .unwrap();

    peer_task.await.unwrap();
}
