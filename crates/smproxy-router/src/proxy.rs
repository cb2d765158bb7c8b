use std::convert::Infallible;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use smproxy_core::catalog::{fallback_models_list, refresh_catalog};
use smproxy_core::error::ChatError;
use smproxy_core::{handle_non_stream, handle_stream};
use smproxy_protocol::openai::create_chat_completions::request::CreateChatCompletionRequest;
use smproxy_protocol::openai::list_models::response::ListModelsResponse;
use smproxy_storage::MODELS_FILE;

use crate::AppState;

pub(crate) fn proxy_router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(models_list))
        .route("/v1/models/refresh", post(models_refresh))
}

async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<CreateChatCompletionRequest>,
) -> Response {
    debug!(
        model = request.model.as_deref().unwrap_or(""),
        stream = request.wants_stream(),
        messages = request.messages.len(),
        "chat request"
    );

    if request.wants_stream() {
        let rx = handle_stream(state.client.clone(), &state.pool, &request, state.tuning());
        // The round-robin cursor moved for this turn.
        state.persist_pool().await;

        let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
        let mut response = Response::new(Body::from_stream(stream));
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream; charset=utf-8"),
        );
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-transform"),
        );
        // Hint common reverse proxies to avoid buffering SSE responses.
        headers.insert(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        );
        return response;
    }

    let result = handle_non_stream(state.client.as_ref(), &state.pool, &request).await;
    // Rotation may have mutated the pool even on the failure path.
    state.persist_pool().await;
    match result {
        Ok(response) => Json(response).into_response(),
        Err(err) => chat_error_response(&err),
    }
}

fn chat_error_response(err: &ChatError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(serde_json::json!({ "error": err.reason() }))).into_response()
}

async fn models_list(State(state): State<AppState>) -> Json<ListModelsResponse> {
    match state.store.read_json::<ListModelsResponse>(MODELS_FILE).await {
        Some(cached) => Json(cached),
        None => Json(fallback_models_list()),
    }
}

async fn models_refresh(State(state): State<AppState>) -> Json<ListModelsResponse> {
    let list = refresh_catalog(state.client.as_ref()).await;
    if let Err(err) = state.store.write_json(MODELS_FILE, &list).await {
        warn!(error = %err, "model list write failed");
    }
    Json(list)
}
