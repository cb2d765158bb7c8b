use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use smproxy_protocol::openai::create_chat_completions::request::CreateChatCompletionRequest;
use smproxy_protocol::openai::create_chat_completions::response::CreateChatCompletionResponse;

use crate::aggregate::aggregate_turn;
use crate::client::UpstreamClient;
use crate::convert::to_upstream;
use crate::emit::TurnMeta;
use crate::error::ChatError;
use crate::pool::CredentialPool;
use crate::stream::{StreamTuning, stream_chat};

const MAX_ATTEMPTS: usize = 3;

/// Streaming entry point: maps the request and opens the turn. All failure
/// handling lives inside the stream; by the time the caller has the
/// receiver, the response has committed to an event stream.
pub fn handle_stream(
    client: Arc<dyn UpstreamClient>,
    pool: &CredentialPool,
    request: &CreateChatCompletionRequest,
    tuning: StreamTuning,
) -> mpsc::Receiver<Bytes> {
    let mapped = to_upstream(request);
    let credential = pool.pick_round_robin();
    stream_chat(client, credential, mapped.upstream, mapped.model, tuning)
}

/// Non-streaming entry point with credential rotation.
///
/// Each failed attempt (non-success status or transport error) rotates the
/// pool away from the failing credential and retries, up to the attempt
/// bound. An exhausted pool and exhausted attempts surface as distinct
/// terminal errors carrying the last failure detail.
pub async fn handle_non_stream(
    client: &dyn UpstreamClient,
    pool: &CredentialPool,
    request: &CreateChatCompletionRequest,
) -> Result<CreateChatCompletionResponse, ChatError> {
    let mapped = to_upstream(request);
    let mut credential = pool.pick_round_robin();
    let mut attempt = 0;

    loop {
        let failure = match client
            .chat(&mapped.upstream, credential.as_deref(), true)
            .await
        {
            Ok(resp) if resp.is_success() => {
                let body = resp.body.collect_text().await;
                let meta = TurnMeta::new(mapped.model.clone());
                return Ok(aggregate_turn(&body, &meta));
            }
            Ok(resp) => ChatError::UpstreamStatus(resp.status).reason(),
            Err(err) => err.to_string(),
        };

        attempt += 1;
        debug!(attempt, error = %failure, "chat attempt failed");
        if attempt >= MAX_ATTEMPTS {
            return Err(ChatError::AllAttemptsFailed { last: failure });
        }
        match pool.rotate_after_failure(credential.as_deref()) {
            Ok(next) => credential = Some(next),
            Err(_) => return Err(ChatError::NoCredentials { last: failure }),
        }
    }
}
