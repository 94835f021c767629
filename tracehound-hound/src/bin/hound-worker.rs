//! Hound worker: analyzes one framed evidence payload at a time
//!
//! Reads length-prefixed frames from stdin and answers each with a
//! processing status, a metrics frame, and a completion status on stdout.
//! The optional first argument selects a failure mode used by the pool
//! test suite: `error`, `hang`, or `crash`.

use anyhow::Result;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracehound_core::sha256_hex;
use tracehound_hound::ipc::{encode_frame, FrameParser, HoundMessage, HoundState};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Frames own stdout; diagnostics go to stderr like any other hound
    // output the parent does not parse.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mode = std::env::args().nth(1).unwrap_or_else(|| "complete".to_string());
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut parser = FrameParser::new();
    let mut buf = vec![0u8; 8192];

    loop {
        let n = stdin.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        for payload in parser.feed(&buf[..n])? {
            handle(&mode, &payload, &mut stdout).await?;
        }
    }
    Ok(())
}

async fn handle(mode: &str, payload: &[u8], stdout: &mut tokio::io::Stdout) -> Result<()> {
    match mode {
        "error" => {
            write_message(stdout, &HoundMessage::status_error("analysis failed")).await?;
        }
        "hang" => {
            // Swallow the work item and never answer.
            std::future::pending::<()>().await;
        }
        "crash" => {
            std::process::exit(7);
        }
        _ => {
            write_message(stdout, &HoundMessage::status(HoundState::Processing)).await?;

            let started = Instant::now();
            let digest = sha256_hex(payload);
            tracing::debug!(%digest, bytes = payload.len(), "evidence analyzed");

            write_message(
                stdout,
                &HoundMessage::Metrics {
                    processing_time_ms: started.elapsed().as_secs_f64() * 1_000.0,
                    memory_used_bytes: payload.len() as f64,
                },
            )
            .await?;
            write_message(stdout, &HoundMessage::status(HoundState::Complete)).await?;
        }
    }
    Ok(())
}

async fn write_message(stdout: &mut tokio::io::Stdout, message: &HoundMessage) -> Result<()> {
    let frame = encode_frame(&message.encode())?;
    stdout.write_all(&frame).await?;
    stdout.flush().await?;
    Ok(())
}
