//! Incremental parser for `data:` frames in a chat-completions stream.
//!
//! Chunks arrive split at arbitrary byte offsets, including inside a UTF-8
//! sequence, so the parser buffers raw bytes and only decodes complete lines.

use serde::Deserialize;

#[derive(Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Accumulates assistant text from a stream of SSE bytes.
#[derive(Debug, Default)]
pub struct FrameParser {
    pending: Vec<u8>,
    text: String,
    done: bool,
    skipped: u32,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk. Complete lines are parsed; a trailing partial line
    /// is kept for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.parse_line(&line[..line.len() - 1]);
        }
    }

    /// Flush a final unterminated line.
    pub fn finish(&mut self) {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.parse_line(&line);
        }
    }

    fn parse_line(&mut self, raw: &[u8]) {
        let Ok(line) = std::str::from_utf8(raw) else {
            self.skipped += 1;
            return;
        };
        let line = line.trim_end_matches('\r');
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim_start();
        if data == "[DONE]" {
            self.done = true;
            return;
        }
        match serde_json::from_str::<ChunkPayload>(data) {
            Ok(payload) => {
                let delta = payload
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta)
                    .and_then(|d| d.content);
                if let Some(content) = delta {
                    self.text.push_str(&content);
                }
            }
            Err(e) => {
                self.skipped += 1;
                tracing::debug!(error = %e, "skipping unparseable stream frame");
            }
        }
    }

    /// Text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Whether the `[DONE]` sentinel was seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Lines that could not be decoded or parsed.
    pub fn skipped(&self) -> u32 {
        self.skipped
    }
}
