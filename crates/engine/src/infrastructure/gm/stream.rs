//! Incremental line accumulation for streaming providers.
//!
//! Raw chunks arrive in arbitrary slices; complete lines are parsed and
//! emitted immediately so the client sees narration as it is generated.
//! Whatever is left in the buffer at stream end is parsed as a final line.

use dungeonterm_shared::ServerMessage;

use super::parser::{parse_line, ParsedHp};
use crate::infrastructure::ports::{GmTurn, MessageSink};

/// Accumulates raw provider output and parses it line by line.
#[derive(Default)]
pub struct LineStreamer {
    buffer: String,
    raw_text: String,
    messages: Vec<ServerMessage>,
    hp_changes: Vec<ParsedHp>,
}

impl LineStreamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk, parsing and emitting every completed line.
    pub fn push_chunk(&mut self, chunk: &str, on_message: &MessageSink) {
        self.buffer.push_str(chunk);
        self.raw_text.push_str(chunk);

        while let Some(idx) = self.buffer.find('\n') {
            let line = self.buffer[..idx].trim().to_string();
            self.buffer.drain(..=idx);
            if !line.is_empty() {
                self.consume_line(&line, on_message);
            }
        }
    }

    /// Flush the trailing partial line and produce the turn.
    pub fn finish(mut self, on_message: &MessageSink) -> GmTurn {
        let remaining = self.buffer.trim().to_string();
        if !remaining.is_empty() {
            self.consume_line(&remaining, on_message);
        }
        GmTurn {
            messages: self.messages,
            hp_changes: self.hp_changes,
            raw_text: self.raw_text,
            provider_session_id: None,
        }
    }

    fn consume_line(&mut self, line: &str, on_message: &MessageSink) {
        for event in parse_line(line) {
            if let Some(msg) = event.message {
                self.messages.push(msg.clone());
                on_message(msg);
            }
            if let Some(hp) = event.hp {
                self.hp_changes.push(hp);
            }
        }
    }
}

/// Run a complete text blob through the per-line parser.
///
/// Used by buffered providers that deliver a final envelope instead of
/// streaming deltas; the parsing path is identical to the incremental one.
pub fn parse_text(
    text: &str,
    on_message: &MessageSink,
) -> (Vec<ServerMessage>, Vec<ParsedHp>) {
    let mut messages = Vec::new();
    let mut hp_changes = Vec::new();
    for raw in text.split('\n') {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        for event in parse_line(line) {
            if let Some(msg) = event.message {
                messages.push(msg.clone());
                on_message(msg);
            }
            if let Some(hp) = event.hp {
                hp_changes.push(hp);
            }
        }
    }
    (messages, hp_changes)
}
