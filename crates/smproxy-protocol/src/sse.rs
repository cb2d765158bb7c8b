use bytes::Bytes;

/// Terminal sentinel shared by the upstream stream and the downstream
/// chat-completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One reassembled `data:` frame. Multi-line bodies are joined with `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub data: String,
}

impl DataFrame {
    pub fn is_done(&self) -> bool {
        self.data == DONE_SENTINEL
    }
}

/// Incremental reassembler for a `data:`-only event stream.
///
/// The upstream wire never uses `event:` or `id:` fields; anything that is
/// not a `data:` line, a comment, or a frame delimiter is ignored. Frame
/// boundaries split across reads are handled by carrying the partial line
/// over to the next push.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: String,
    data_lines: Vec<String>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, chunk: &Bytes) -> Vec<DataFrame> {
        match std::str::from_utf8(chunk) {
            Ok(text) => self.push_str(text),
            Err(_) => Vec::new(),
        }
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<DataFrame> {
        self.buffer.push_str(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let mut line = self.buffer[..pos].to_string();
            self.buffer.drain(..=pos);

            if line.ends_with('\r') {
                line.pop();
            }

            if line.is_empty() {
                self.close_frame(&mut frames);
                continue;
            }

            // Comment lines carry upstream keepalive noise.
            if line.starts_with(':') {
                continue;
            }

            if let Some(value) = line.strip_prefix("data:") {
                self.data_lines
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
        }

        frames
    }

    /// Drain the carry-over buffer at end of input. A trailing frame without
    /// its blank-line terminator is still surfaced.
    pub fn finish(&mut self) -> Vec<DataFrame> {
        if !self.buffer.is_empty() {
            let mut line = std::mem::take(&mut self.buffer);
            if line.ends_with('\r') {
                line.pop();
            }
            if let Some(value) = line.strip_prefix("data:") {
                self.data_lines
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
        }
        let mut frames = Vec::new();
        self.close_frame(&mut frames);
        frames
    }

    fn close_frame(&mut self, frames: &mut Vec<DataFrame>) {
        if self.data_lines.is_empty() {
            return;
        }
        let data = self.data_lines.join("\n");
        self.data_lines.clear();
        frames.push(DataFrame { data });
    }
}

/// Encode one outgoing frame: `data: <payload>\n\n`.
pub fn encode_frame(payload: &str) -> String {
    format!("data: {payload}\n\n")
}
