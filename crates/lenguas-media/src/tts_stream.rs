//! Bounded reading of synthesized speech.
//!
//! Audio arrives as an incremental byte stream. It is buffered up to a size
//! ceiling under one overall deadline; crossing the ceiling fails at once
//! instead of reading the rest of the stream.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::time::Instant;
use tracing::debug;

use lenguas_core::error::{Result, TranslatorError};
use lenguas_providers::AudioStream;

/// Read `stream` to the end, failing with `PayloadTooLarge` once more than
/// `max_bytes` have arrived and with `UpstreamUnavailable` if the stream is
/// not finished within `deadline`.
pub async fn collect_audio(
    mut stream: AudioStream,
    max_bytes: usize,
    deadline: Duration,
) -> Result<Bytes> {
    let until = Instant::now() + deadline;
    let mut buf = BytesMut::new();
    let mut chunks = 0usize;

    loop {
        let next = tokio::time::timeout_at(until, stream.next())
            .await
            .map_err(|_| {
                TranslatorError::UpstreamUnavailable(format!(
                    "speech stream did not finish within {}s",
                    deadline.as_secs()
                ))
            })?;

        let Some(chunk) = next else { break };
        let chunk = chunk?;
        chunks += 1;

        let size = buf.len() + chunk.len();
        if size > max_bytes {
            return Err(TranslatorError::PayloadTooLarge {
                size,
                limit: max_bytes,
            });
        }
        buf.extend_from_slice(&chunk);
    }

    debug!(bytes = buf.len(), chunks, "Speech stream complete");
    Ok(buf.freeze())
}
