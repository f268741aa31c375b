//! Incremental re-framing of the upstream event stream.
//!
//! The [`SseReframer`] is fed raw upstream bytes as they arrive and returns
//! the frames to forward to the client. It owns all state needed across
//! reads: the partial line not yet terminated by `\n`, and the tail of a
//! multi-byte UTF-8 character split across two reads.
//!
//! Usage:
//!   let mut reframer = SseReframer::new("deepseek-chat");
//!   for bytes in upstream_reads {
//!       for frame in reframer.push(&bytes) { /* send frame */ }
//!       if reframer.is_done() { break; }
//!   }
//!   for frame in reframer.finish() { /* send frame */ }

use serde_json::Value;

use super::openai_types::ChatCompletionChunk;
use super::response::to_chunk;

const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

/// One outgoing server-sent event.
#[derive(Debug, Clone)]
pub enum Frame {
    Chunk(ChatCompletionChunk),
    Done,
}

impl Frame {
    /// The event payload, i.e. what follows `data: `.
    pub fn data(&self) -> String {
        match self {
            Self::Chunk(chunk) => match serde_json::to_string(chunk) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(error = %e, id = %chunk.id, "failed to serialize chunk");
                    String::new()
                }
            },
            Self::Done => DONE_SENTINEL.to_string(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

#[derive(Debug)]
pub struct SseReframer {
    model: String,
    buffer: String,
    /// Bytes of an incomplete UTF-8 sequence waiting for the next read.
    pending: Vec<u8>,
    done: bool,
}

impl SseReframer {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            buffer: String::new(),
            pending: Vec::new(),
            done: false,
        }
    }

    /// Whether the sentinel has been emitted. Nothing is produced after that.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one upstream read, returning the frames for every line it completes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        if self.done {
            return Vec::new();
        }

        self.decode(bytes);

        let mut frames = Vec::new();
        while let Some(newline_pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline_pos).collect();
            if let Some(frame) = self.process_line(&line) {
                let done = frame.is_done();
                frames.push(frame);
                if done {
                    self.done = true;
                    self.buffer.clear();
                    break;
                }
            }
        }
        frames
    }

    /// Call at end of the upstream stream. Emits the sentinel unless the
    /// upstream already sent one.
    pub fn finish(&mut self) -> Vec<Frame> {
        if self.done {
            return Vec::new();
        }
        self.done = true;

        if !self.pending.is_empty() {
            self.pending.clear();
            self.buffer.push(char::REPLACEMENT_CHARACTER);
        }
        if !self.buffer.trim().is_empty() {
            tracing::debug!(
                leftover_len = self.buffer.len(),
                "dropping unterminated trailing line"
            );
        }
        self.buffer.clear();

        vec![Frame::Done]
    }

    /// Stateful UTF-8 decode into `buffer`: invalid sequences become U+FFFD,
    /// a trailing incomplete sequence is held back in `pending`.
    fn decode(&mut self, bytes: &[u8]) {
        let mut owned = std::mem::take(&mut self.pending);
        owned.extend_from_slice(bytes);
        let mut input = owned.as_slice();

        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    self.buffer.push_str(valid);
                    input = &[];
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    if let Ok(valid) = std::str::from_utf8(valid) {
                        self.buffer.push_str(valid);
                    }
                    match e.error_len() {
                        Some(bad) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[bad..];
                        }
                        None => {
                            input = rest;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = input.to_vec();
    }

    fn process_line(&self, line: &str) -> Option<Frame> {
        let data = line.trim().strip_prefix(DATA_PREFIX)?;

        if data == DONE_SENTINEL {
            return Some(Frame::Done);
        }

        match serde_json::from_str::<Value>(data) {
            Ok(payload) => Some(Frame::Chunk(to_chunk(&payload, &self.model))),
            Err(e) => {
                tracing::warn!(error = %e, line = data, "skipping unparseable stream event");
                None
            }
        }
    }
}
