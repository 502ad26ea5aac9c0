//! Server-Sent Events frame decoder
//!
//! Shared by the Streamable HTTP transport (POST replies and the inbound GET
//! stream) and the legacy HTTP+SSE transport. Frames are separated by a blank
//! line; `data:` lines are joined with `\n`; `id:`, `event:`, and `retry:`
//! fields are captured; lines starting with `:` are comments.
//!
//! Keep-alive frames (`event: ping` or `data: [PING]`) are dropped here so
//! consumers never see them.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::error::{McpError, Result};

/// One decoded SSE frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// `id:` field, the resumption cursor.
    pub id: Option<String>,
    /// `event:` field; `None` means the default `message` type.
    pub event: Option<String>,
    /// Joined `data:` lines.
    pub data: String,
    /// `retry:` field in milliseconds.
    pub retry: Option<u64>,
}

impl SseEvent {
    /// Event type with the SSE default applied.
    pub fn kind(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }

    fn is_ping(&self) -> bool {
        self.kind().eq_ignore_ascii_case("ping") || self.data.eq_ignore_ascii_case("[ping]")
    }
}

/// Incremental decoder fed with raw body chunks.
///
/// Chunks may split frames and UTF-8 sequences at arbitrary byte offsets.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(pos) = find_frame_end(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = parse_block(&String::from_utf8_lossy(&block[..pos])) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing frame that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.iter().all(|b| b.is_ascii_whitespace()) {
            return None;
        }
        parse_block(&String::from_utf8_lossy(&rest))
    }
}

fn find_frame_end(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = SseEvent::default();
    let mut data_lines: Vec<&str> = Vec::new();
    let mut saw_field = false;

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "data" => data_lines.push(value),
            "id" => event.id = Some(value.to_string()),
            "event" => event.event = Some(value.to_string()),
            "retry" => event.retry = value.trim().parse().ok(),
            _ => continue,
        }
        saw_field = true;
    }

    if !saw_field {
        return None;
    }
    event.data = data_lines.join("\n");
    if event.is_ping() {
        return None;
    }
    Some(event)
}

/// Decode an HTTP body stream into SSE frames.
///
/// A body read error is yielded once as [`McpError::Transport`] and ends the
/// stream.
pub fn decode_sse<S, E>(body: S) -> impl Stream<Item = Result<SseEvent>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let state = (Box::pin(body), SseDecoder::new(), VecDeque::new(), false);
    futures::stream::unfold(
        state,
        |(mut body, mut decoder, mut queue, mut done)| async move {
            loop {
                if let Some(event) = queue.pop_front() {
                    return Some((Ok(event), (body, decoder, queue, done)));
                }
                if done {
                    return None;
                }
                match body.next().await {
                    Some(Ok(chunk)) => queue.extend(decoder.push(&chunk)),
                    Some(Err(e)) => {
                        done = true;
                        let err = McpError::transport_with("event stream read failed", e);
                        return Some((Err(err), (body, decoder, queue, done)));
                    }
                    None => {
                        done = true;
                        queue.extend(decoder.finish());
                    }
                }
            }
        },
    )
}
