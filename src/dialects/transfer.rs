//! Bash file-transfer dialect: moves files to and from a
//! remote shell that has no `scp`/`sftp` of its own, by shuttling base64 text
//! through ordinary `echo`/`cat` commands.
//!
//! No extra transport, just the one already in use for every other
//! interaction -- there is no separate upload/download channel, only more
//! commands sent down the same pipe the rest of the session uses.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{Error, Result};
use crate::session::{ExecOptions, Session};

/// Maximum length of a single queued shell command line. Conservative
/// relative to common `getconf ARG_MAX`/shell line-buffer limits so a
/// transfer never trips a remote's own command-length ceiling.
const MAX_COMMAND_LEN: usize = 2048;

/// Base64 line width used when chunking an upload (matches the classic MIME
/// wrap width so `base64 -d` and `openssl base64 -d`, which expect wrapped
/// input, both decode the reassembled file without extra flags).
const BASE64_LINE_WIDTH: usize = 76;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoder {
    Base64,
    OpenSsl,
    Perl,
}

impl Decoder {
    fn decode_command(self, encoded_path: &str, dest_path: &str) -> String {
        match self {
            Decoder::Base64 => format!("base64 -d '{encoded_path}' > '{dest_path}'"),
            Decoder::OpenSsl => format!("openssl base64 -d -in '{encoded_path}' -out '{dest_path}'"),
            Decoder::Perl => {
                format!("perl -MMIME::Base64 -ne 'print decode_base64($_)' '{encoded_path}' > '{dest_path}'")
            }
        }
    }

    fn encode_command(self, source_path: &str) -> String {
        match self {
            Decoder::Base64 => format!("base64 '{source_path}'"),
            Decoder::OpenSsl => format!("openssl base64 -in '{source_path}'"),
            Decoder::Perl => format!("perl -MMIME::Base64 -e 'local $/; print encode_base64(<>)' '{source_path}'"),
        }
    }
}

/// Probe the remote for the first of `base64`, `openssl`, or `perl` it has
/// on `PATH`, in that preference order (the first is the most common and
/// needs no sub-flag juggling; the other two are fallbacks for minimal
/// images that ship neither coreutils' `base64` nor a full perl toolchain).
async fn pick_decoder(session: &Session) -> Result<Decoder> {
    for (probe, decoder) in [
        ("base64", Decoder::Base64),
        ("openssl", Decoder::OpenSsl),
        ("perl -MMIME::Base64 -e 1", Decoder::Perl),
    ] {
        let command = format!("which {} >/dev/null 2>&1; echo $?", probe.split_whitespace().next().unwrap());
        let output = session.exec(&command, ExecOptions::default(), None).await?;
        if output.trim() == "0" {
            return Ok(decoder);
        }
    }
    Err(Error::Transport("remote has neither base64, openssl, nor perl for file transfer".into()))
}

/// Write `data` to `remote_path`: base64-encode locally, push
/// it up in `echo '<line>' >> staging.b64 && ...` batches under
/// [`MAX_COMMAND_LEN`], then decode remotely into the real destination.
pub async fn write_file(session: &Session, remote_path: &str, data: &[u8]) -> Result<()> {
    let decoder = pick_decoder(session).await?;
    let encoded_path = format!("{remote_path}.b64");

    session
        .exec(&format!("rm -f '{encoded_path}'"), ExecOptions::default(), None)
        .await?;

    let encoded = BASE64.encode(data);
    let lines: Vec<&str> = encoded
        .as_bytes()
        .chunks(BASE64_LINE_WIDTH)
        .map(|chunk| std::str::from_utf8(chunk).expect("base64 alphabet is ASCII"))
        .collect();

    let mut batch = Vec::new();
    let mut batch_len = 0usize;

    for line in lines {
        let piece = format!("echo '{line}' >> '{encoded_path}'");
        if !batch.is_empty() && batch_len + piece.len() + 4 > MAX_COMMAND_LEN {
            flush_batch(session, &mut batch).await?;
            batch_len = 0;
        }
        batch_len += piece.len() + 4;
        batch.push(piece);
    }
    flush_batch(session, &mut batch).await?;

    session
        .exec(&decoder.decode_command(&encoded_path, remote_path), ExecOptions::default(), None)
        .await?;
    session
        .exec(&format!("rm -f '{encoded_path}'"), ExecOptions::default(), None)
        .await?;
    Ok(())
}

async fn flush_batch(session: &Session, batch: &mut Vec<String>) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let command = batch.join(" && ");
    batch.clear();
    session.exec(&command, ExecOptions::default(), None).await?;
    Ok(())
}

/// Read `remote_path` back as bytes: base64-encode it on the
/// remote with whichever decoder's matching encoder is available, capture
/// the text, and decode it locally.
pub async fn read_file(session: &Session, remote_path: &str) -> Result<Vec<u8>> {
    let decoder = pick_decoder(session).await?;
    let output = session.exec(&decoder.encode_command(remote_path), ExecOptions::default(), None).await?;
    let cleaned: String = output.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64.decode(cleaned.as_bytes()).map_err(|e| Error::Transport(format!("corrupt base64 transfer: {e}")))
}
