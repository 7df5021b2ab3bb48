//! Stream read loops and per-agent output sequencing
//!
//! Chunking rule: one `OutputEvent` per successful read on the pipe. A
//! multi-byte UTF-8 sequence split across two reads is held back and emitted
//! with the next chunk, invalid bytes become U+FFFD.

use crate::events::EventBus;
use crate::types::{AgentEvent, OutputEvent, OutputStream};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace, warn};

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Incremental UTF-8 decoder that never splits a code point
#[derive(Debug, Default)]
pub(crate) struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    /// Decode as much of `pending + bytes` as is complete
    pub(crate) fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // valid_up_to guarantees this prefix is UTF-8
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        // Incomplete sequence at the end: wait for more bytes
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// Flush whatever is left at end of stream
    pub(crate) fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Assigns sequence numbers for one agent id and publishes in that order
///
/// Numbering and publishing happen under one lock so the stdout and stderr
/// loops of an agent can never deliver out of sequence.
pub(crate) struct OutputEmitter {
    agent_id: String,
    next_sequence: Mutex<u64>,
    bus: Arc<EventBus>,
}

impl OutputEmitter {
    pub(crate) fn new(agent_id: impl Into<String>, bus: Arc<EventBus>) -> Self {
        Self {
            agent_id: agent_id.into(),
            next_sequence: Mutex::new(0),
            bus,
        }
    }

    pub(crate) fn emit(&self, stream: OutputStream, chunk: String) -> u64 {
        let mut next = self.next_sequence.lock();
        let sequence = *next;
        *next += 1;
        self.bus.publish(AgentEvent::Output(OutputEvent {
            agent_id: self.agent_id.clone(),
            stream,
            chunk,
            sequence,
        }));
        sequence
    }
}

/// Read a pipe to EOF, emitting one event per read
pub(crate) async fn pump_stream<R>(mut reader: R, stream: OutputStream, emitter: Arc<OutputEmitter>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut decoder = Utf8Chunker::default();

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("Agent {} {} closed", emitter.agent_id, stream);
                break;
            }
            Ok(n) => {
                let chunk = decoder.push(&buf[..n]);
                if !chunk.is_empty() {
                    trace!("Agent {} {}: {} bytes", emitter.agent_id, stream, n);
                    emitter.emit(stream, chunk);
                }
            }
            Err(e) => {
                warn!("Error reading agent {} {}: {}", emitter.agent_id, stream, e);
                break;
            }
        }
    }

    let rest = decoder.finish();
    if !rest.is_empty() {
        emitter.emit(stream, rest);
    }
}
