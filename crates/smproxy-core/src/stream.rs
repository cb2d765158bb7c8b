use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use smproxy_protocol::smithery::chat::request::ChatRequest;

use crate::client::UpstreamClient;
use crate::decode::{DecodedItem, EventDecoder};
use crate::emit::{
    TurnMeta, chunk_frame, done_frame, padding_frame, ping_frame, stop_chunk, text_chunk,
    tool_call_chunk,
};
use crate::turn::{TurnState, TurnStep};

/// Slack allowed when deciding whether the connection sat idle for a full
/// heartbeat interval.
const HEARTBEAT_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct StreamTuning {
    pub flush_interval: Duration,
    pub heartbeat: Duration,
}

/// Start one streaming turn. The returned receiver yields ready-to-send SSE
/// bytes; dropping it tears the whole pipeline down.
///
/// No retry happens here: by the time the receiver is wired to a response
/// body the headers have committed to an event stream, so upstream failure
/// can only degrade to an empty terminal chunk.
pub fn stream_chat(
    client: Arc<dyn UpstreamClient>,
    credential: Option<String>,
    request: ChatRequest,
    model: String,
    tuning: StreamTuning,
) -> mpsc::Receiver<Bytes> {
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(run_turn(client, credential, request, model, tuning, tx));
    rx
}

enum Flow {
    Continue,
    Done,
}

struct SseWriter {
    tx: mpsc::Sender<Bytes>,
    last_write: Instant,
    closed: bool,
}

impl SseWriter {
    fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            tx,
            last_write: Instant::now(),
            closed: false,
        }
    }

    /// Send one frame. A failed send means the client went away; the writer
    /// latches closed and every later write is a no-op error.
    async fn write(&mut self, frame: String) -> Result<(), ()> {
        if self.closed {
            return Err(());
        }
        if self.tx.send(Bytes::from(frame)).await.is_err() {
            self.closed = true;
            return Err(());
        }
        self.last_write = Instant::now();
        Ok(())
    }

    fn idle(&self) -> Duration {
        self.last_write.elapsed()
    }
}

async fn run_turn(
    client: Arc<dyn UpstreamClient>,
    credential: Option<String>,
    request: ChatRequest,
    model: String,
    tuning: StreamTuning,
    tx: mpsc::Sender<Bytes>,
) {
    let meta = TurnMeta::new(model);
    let mut writer = SseWriter::new(tx);
    if writer.write(padding_frame()).await.is_err() {
        return;
    }

    let mut body = match client.chat(&request, credential.as_deref(), false).await {
        Ok(resp) if resp.is_success() => resp.body.into_receiver(),
        Ok(resp) => {
            debug!(status = resp.status, "upstream rejected streaming call");
            finish_empty(&mut writer, &meta).await;
            return;
        }
        Err(err) => {
            debug!(error = %err, "upstream unreachable on streaming call");
            finish_empty(&mut writer, &meta).await;
            return;
        }
    };

    let mut decoder = EventDecoder::new();
    let mut state = TurnState::new();
    let mut flush_deadline: Option<Instant> = None;

    let mut heartbeat = tokio::time::interval(tuning.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate tick; the first heartbeat belongs a full interval out.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            maybe_chunk = body.recv() => {
                match maybe_chunk {
                    Some(chunk) => {
                        let items = decoder.push(&chunk);
                        if let Flow::Done = process_items(
                            &mut writer, &meta, &mut state, &mut flush_deadline, &tuning, items,
                        ).await {
                            return;
                        }
                    }
                    None => {
                        let items = decoder.finish();
                        if let Flow::Done = process_items(
                            &mut writer, &meta, &mut state, &mut flush_deadline, &tuning, items,
                        ).await {
                            return;
                        }
                        debug!("upstream stream ended prematurely");
                        let steps = state.end_of_stream();
                        let _ = apply_steps(
                            &mut writer, &meta, &mut flush_deadline, &tuning, steps,
                        ).await;
                        return;
                    }
                }
            }
            _ = tokio::time::sleep_until(flush_deadline.unwrap_or_else(Instant::now)),
                if flush_deadline.is_some() =>
            {
                flush_deadline = None;
                if let Some(text) = state.take_pending()
                    && writer.write(chunk_frame(&text_chunk(&meta, &text))).await.is_err()
                {
                    return;
                }
            }
            _ = heartbeat.tick() => {
                if writer.idle() + HEARTBEAT_GRACE >= tuning.heartbeat
                    && writer.write(ping_frame()).await.is_err()
                {
                    return;
                }
            }
        }
    }
}

async fn process_items(
    writer: &mut SseWriter,
    meta: &TurnMeta,
    state: &mut TurnState,
    flush_deadline: &mut Option<Instant>,
    tuning: &StreamTuning,
    items: Vec<DecodedItem>,
) -> Flow {
    for item in items {
        let steps = match item {
            DecodedItem::Event(event) => state.apply(event),
            DecodedItem::Done => state.end_of_stream(),
        };
        if let Flow::Done = apply_steps(writer, meta, flush_deadline, tuning, steps).await {
            return Flow::Done;
        }
    }
    Flow::Continue
}

async fn apply_steps(
    writer: &mut SseWriter,
    meta: &TurnMeta,
    flush_deadline: &mut Option<Instant>,
    tuning: &StreamTuning,
    steps: Vec<TurnStep>,
) -> Flow {
    for step in steps {
        match step {
            TurnStep::ScheduleFlush => {
                if flush_deadline.is_none() {
                    *flush_deadline = Some(Instant::now() + tuning.flush_interval);
                }
            }
            TurnStep::EmitText(text) => {
                *flush_deadline = None;
                if writer.write(chunk_frame(&text_chunk(meta, &text))).await.is_err() {
                    return Flow::Done;
                }
            }
            TurnStep::EmitToolCall(frame) => {
                if writer
                    .write(chunk_frame(&tool_call_chunk(meta, &frame)))
                    .await
                    .is_err()
                {
                    return Flow::Done;
                }
            }
            TurnStep::Finished { usage } => {
                let _ = writer.write(chunk_frame(&stop_chunk(meta, usage))).await;
                let _ = writer.write(done_frame()).await;
                return Flow::Done;
            }
        }
    }
    Flow::Continue
}

/// Degraded terminal sequence for turns that never produced content.
async fn finish_empty(writer: &mut SseWriter, meta: &TurnMeta) {
    let _ = writer.write(chunk_frame(&stop_chunk(meta, None))).await;
    let _ = writer.write(done_frame()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{BoxFuture, UpstreamBody, UpstreamResponse};
    use crate::error::TransportError;
    use std::sync::Mutex;

    /// Scripted upstream: each entry is (delay, raw SSE bytes).
    struct ScriptedClient {
        status: u16,
        script: Mutex<Vec<(Duration, &'static str)>>,
    }

    impl ScriptedClient {
        fn new(status: u16, script: Vec<(Duration, &'static str)>) -> Self {
            Self {
                status,
                script: Mutex::new(script),
            }
        }
    }

    impl UpstreamClient for ScriptedClient {
        fn chat<'a>(
            &'a self,
            _request: &'a ChatRequest,
            _credential: Option<&'a str>,
            _buffered: bool,
        ) -> BoxFuture<'a, Result<UpstreamResponse, TransportError>> {
            let script: Vec<_> = self.script.lock().unwrap().drain(..).collect();
            let status = self.status;
            Box::pin(async move {
                let (tx, rx) = mpsc::channel(8);
                tokio::spawn(async move {
                    for (delay, chunk) in script {
                        tokio::time::sleep(delay).await;
                        if tx.send(Bytes::from_static(chunk.as_bytes())).await.is_err() {
                            return;
                        }
                    }
                });
                Ok(UpstreamResponse {
                    status,
                    body: UpstreamBody::Stream(rx),
                })
            })
        }

        fn fetch_text<'a>(
            &'a self,
            _url: &'a str,
        ) -> BoxFuture<'a, Result<String, TransportError>> {
            Box::pin(async { Err(TransportError::new("not scripted")) })
        }
    }

    fn empty_request() -> ChatRequest {
        ChatRequest {
            messages: Vec::new(),
            tools: Vec::new(),
            model: "claude-sonnet-4.5".to_string(),
            system_prompt: String::new(),
            reasoning_effort: None,
            tool_choice: None,
        }
    }

    fn tuning() -> StreamTuning {
        StreamTuning {
            flush_interval: Duration::from_millis(10),
            heartbeat: Duration::from_secs(30),
        }
    }

    async fn collect_frames(mut rx: mpsc::Receiver<Bytes>) -> Vec<String> {
        let mut raw = Vec::new();
        while let Some(chunk) = rx.recv().await {
            raw.extend_from_slice(&chunk);
        }
        let text = String::from_utf8(raw).unwrap();
        text.split("\n\n")
            .filter(|frame| !frame.is_empty())
            .map(|frame| frame.to_string())
            .collect()
    }

    fn data_payloads(frames: &[String]) -> Vec<serde_json::Value> {
        frames
            .iter()
            .filter_map(|frame| frame.strip_prefix("data: "))
            .filter(|payload| *payload != "[DONE]")
            .map(|payload| serde_json::from_str(payload).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn text_deltas_coalesce_into_one_chunk() {
        let client = Arc::new(ScriptedClient::new(
            200,
            vec![
                (
                    Duration::ZERO,
                    "data: {\"type\":\"text-delta\",\"delta\":\"A\"}\n\ndata: {\"type\":\"text-delta\",\"delta\":\"B\"}\n\n",
                ),
                (Duration::from_millis(50), "data: [DONE]\n\n"),
            ],
        ));
        let rx = stream_chat(
            client,
            None,
            empty_request(),
            "m".to_string(),
            tuning(),
        );
        let frames = collect_frames(rx).await;

        assert!(frames[0].starts_with(':'), "padding frame first");
        assert_eq!(frames.last().unwrap(), "data: [DONE]");

        let payloads = data_payloads(&frames);
        let contents: Vec<_> = payloads
            .iter()
            .filter_map(|p| p["choices"][0]["delta"]["content"].as_str())
            .collect();
        assert_eq!(contents, vec!["AB"]);
    }

    #[tokio::test]
    async fn exactly_one_stop_chunk_and_it_precedes_done() {
        let client = Arc::new(ScriptedClient::new(
            200,
            vec![
                (
                    Duration::ZERO,
                    "data: {\"type\":\"text-delta\",\"delta\":\"hi\"}\n\ndata: {\"type\":\"finish\",\"messageMetadata\":{\"usage\":{\"inputTokens\":5,\"outputTokens\":3,\"totalTokens\":8}}}\n\ndata: [DONE]\n\n",
                ),
            ],
        ));
        let rx = stream_chat(
            client,
            None,
            empty_request(),
            "m".to_string(),
            tuning(),
        );
        let frames = collect_frames(rx).await;
        let payloads = data_payloads(&frames);

        let stops: Vec<_> = payloads
            .iter()
            .filter(|p| p["choices"][0]["finish_reason"] == "stop")
            .collect();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0]["usage"]["prompt_tokens"], 5);
        // The stop chunk is the last data frame before the sentinel.
        assert_eq!(
            payloads.last().unwrap()["choices"][0]["finish_reason"],
            "stop"
        );
        assert_eq!(frames.last().unwrap(), "data: [DONE]");
    }

    #[tokio::test]
    async fn tool_chunk_flushes_buffered_text_first() {
        let client = Arc::new(ScriptedClient::new(
            200,
            vec![(
                Duration::ZERO,
                "data: {\"type\":\"text-delta\",\"delta\":\"pre\"}\n\ndata: {\"type\":\"tool-input-start\",\"toolCallId\":\"c1\",\"toolName\":\"look\"}\n\ndata: [DONE]\n\n",
            )],
        ));
        let rx = stream_chat(
            client,
            None,
            empty_request(),
            "m".to_string(),
            tuning(),
        );
        let payloads = data_payloads(&collect_frames(rx).await);

        let text_pos = payloads
            .iter()
            .position(|p| p["choices"][0]["delta"]["content"] == "pre")
            .unwrap();
        let tool_pos = payloads
            .iter()
            .position(|p| p["choices"][0]["delta"]["tool_calls"].is_array())
            .unwrap();
        assert!(text_pos < tool_pos);
        assert_eq!(
            payloads[tool_pos]["choices"][0]["delta"]["tool_calls"][0]["id"],
            "c1"
        );
    }

    #[tokio::test]
    async fn upstream_error_degrades_to_empty_stop() {
        let client = Arc::new(ScriptedClient::new(500, Vec::new()));
        let rx = stream_chat(
            client,
            None,
            empty_request(),
            "m".to_string(),
            tuning(),
        );
        let frames = collect_frames(rx).await;
        let payloads = data_payloads(&frames);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["choices"][0]["finish_reason"], "stop");
        assert_eq!(frames.last().unwrap(), "data: [DONE]");
    }

    #[tokio::test]
    async fn premature_end_still_closes_the_turn() {
        let client = Arc::new(ScriptedClient::new(
            200,
            vec![(
                Duration::ZERO,
                "data: {\"type\":\"reasoning-delta\",\"delta\":\"half\"}\n\n",
            )],
        ));
        let rx = stream_chat(
            client,
            None,
            empty_request(),
            "m".to_string(),
            tuning(),
        );
        let frames = collect_frames(rx).await;
        let payloads = data_payloads(&frames);

        let contents: Vec<_> = payloads
            .iter()
            .filter_map(|p| p["choices"][0]["delta"]["content"].as_str())
            .collect();
        assert_eq!(contents, vec!["<think>half</think>"]);
        assert_eq!(
            payloads.last().unwrap()["choices"][0]["finish_reason"],
            "stop"
        );
        assert_eq!(frames.last().unwrap(), "data: [DONE]");
    }

    #[tokio::test]
    async fn idle_upstream_gets_keepalive_pings() {
        let client = Arc::new(ScriptedClient::new(
            200,
            vec![
                (
                    Duration::ZERO,
                    "data: {\"type\":\"text-delta\",\"delta\":\"x\"}\n\n",
                ),
                (Duration::from_millis(350), "data: [DONE]\n\n"),
            ],
        ));
        let rx = stream_chat(
            client,
            None,
            empty_request(),
            "m".to_string(),
            StreamTuning {
                flush_interval: Duration::from_millis(10),
                heartbeat: Duration::from_millis(100),
            },
        );
        let frames = collect_frames(rx).await;
        let pings = frames
            .iter()
            .filter(|frame| frame.starts_with(": ping"))
            .count();
        assert!(pings >= 1, "expected keepalive pings, got frames {frames:?}");
    }
}
