use bytes::Bytes;
use tracing::trace;

use smproxy_protocol::smithery::chat::stream::{ChatStreamEvent, UpstreamFrame};
use smproxy_protocol::sse::FrameParser;

/// One item of the decoded upstream sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedItem {
    Event(ChatStreamEvent),
    /// The upstream `[DONE]` sentinel. Everything after it is ignored.
    Done,
}

/// Turns the raw upstream byte stream into a finite sequence of
/// `DecodedItem`s, one pass per upstream call.
///
/// Malformed or unrecognized frames are dropped here and never reach the
/// turn fold; one bad frame must not abort the turn.
#[derive(Debug, Default)]
pub struct EventDecoder {
    parser: FrameParser,
    done: bool,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &Bytes) -> Vec<DecodedItem> {
        if self.done {
            return Vec::new();
        }
        let frames = self.parser.push_bytes(chunk);
        self.collect(frames)
    }

    /// Drain the carry-over buffer once the byte stream ends.
    pub fn finish(&mut self) -> Vec<DecodedItem> {
        if self.done {
            return Vec::new();
        }
        let frames = self.parser.finish();
        self.collect(frames)
    }

    fn collect(
        &mut self,
        frames: Vec<smproxy_protocol::sse::DataFrame>,
    ) -> Vec<DecodedItem> {
        let mut items = Vec::new();
        for frame in frames {
            if self.done {
                break;
            }
            if frame.is_done() {
                self.done = true;
                items.push(DecodedItem::Done);
                continue;
            }
            match serde_json::from_str::<UpstreamFrame>(&frame.data) {
                Ok(parsed) => {
                    if let Some(event) = parsed.normalize() {
                        items.push(DecodedItem::Event(event));
                    }
                }
                Err(err) => {
                    trace!(error = %err, "dropping malformed upstream frame");
                }
            }
        }
        items
    }
}

/// Decode a fully-buffered upstream body for the non-streaming path.
pub fn decode_buffered(body: &str) -> Vec<DecodedItem> {
    let mut decoder = EventDecoder::new();
    let mut items = decoder.push(&Bytes::copy_from_slice(body.as_bytes()));
    items.extend(decoder.finish());
    items
}
