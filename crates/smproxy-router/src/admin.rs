use axum::Json;
use axum::extract::State;
use axum::routing::{delete, get, post};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::warn;

use smproxy_common::ConfigPatch;
use smproxy_core::convert::REASONING_SUFFIXES;
use smproxy_protocol::openai::list_models::response::{
    ListModelsResponse, Model, ModelObjectType,
};
use smproxy_storage::{CONFIG_FILE, MODELS_FILE};

use crate::AppState;

pub(crate) fn admin_router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/admin/credentials",
            get(credentials_status).post(credentials_replace),
        )
        .route("/admin/credentials/add", post(credentials_add))
        .route("/admin/credentials/remove", delete(credentials_remove))
        .route("/admin/credentials/clear", delete(credentials_clear))
        .route("/admin/credentials/rotate", post(credentials_rotate))
        .route("/admin/credentials/random", post(credentials_random))
        .route("/admin/config", get(config_get).post(config_update))
        .route("/admin/models/add", post(models_add))
        .route("/admin/models/clear", post(models_clear))
}

/// Credentials arrive as a JSON array or as one multi-line string, one
/// credential per line.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CredentialsInput {
    Many(Vec<String>),
    One(String),
}

#[derive(Debug, Default, Deserialize)]
struct CredentialsBody {
    #[serde(default)]
    credentials: Option<CredentialsInput>,
    #[serde(default)]
    credential: Option<String>,
}

impl CredentialsBody {
    fn values(self) -> Vec<String> {
        let mut out = Vec::new();
        match self.credentials {
            Some(CredentialsInput::Many(items)) => out.extend(items),
            Some(CredentialsInput::One(text)) => {
                out.extend(text.lines().map(str::to_string));
            }
            None => {}
        }
        if let Some(single) = self.credential {
            out.push(single);
        }
        out.into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    }
}

#[derive(Debug, Serialize)]
struct CredentialPreview {
    index: usize,
    preview: String,
}

/// Never return full credential values; previews only.
fn preview(value: &str) -> String {
    match value.char_indices().nth(50) {
        Some((cut, _)) => format!("{}...", &value[..cut]),
        None => value.to_string(),
    }
}

async fn credentials_status(State(state): State<AppState>) -> Json<JsonValue> {
    let snapshot = state.pool.snapshot();
    let credentials: Vec<CredentialPreview> = snapshot
        .credentials
        .iter()
        .enumerate()
        .map(|(index, value)| CredentialPreview {
            index,
            preview: preview(value),
        })
        .collect();
    Json(json!({
        "total": snapshot.credentials.len(),
        "cursor": snapshot.cursor,
        "credentials": credentials,
    }))
}

async fn credentials_replace(
    State(state): State<AppState>,
    Json(body): Json<CredentialsBody>,
) -> Json<JsonValue> {
    let count = state.pool.replace(body.values());
    state.persist_pool().await;
    Json(json!({ "ok": true, "count": count }))
}

async fn credentials_add(
    State(state): State<AppState>,
    Json(body): Json<CredentialsBody>,
) -> Json<JsonValue> {
    let count = state.pool.add(body.values());
    state.persist_pool().await;
    Json(json!({ "ok": true, "count": count }))
}

async fn credentials_remove(
    State(state): State<AppState>,
    Json(body): Json<CredentialsBody>,
) -> Json<JsonValue> {
    let mut removed = false;
    for value in body.values() {
        removed |= state.pool.remove(&value);
    }
    state.persist_pool().await;
    Json(json!({ "ok": removed, "count": state.pool.len() }))
}

async fn credentials_clear(State(state): State<AppState>) -> Json<JsonValue> {
    state.pool.clear();
    state.persist_pool().await;
    Json(json!({ "ok": true, "count": 0 }))
}

async fn credentials_rotate(State(state): State<AppState>) -> Json<JsonValue> {
    let picked = state.pool.pick_round_robin();
    state.persist_pool().await;
    match picked {
        Some(value) => Json(json!({
            "ok": true,
            "total": state.pool.len(),
            "preview": preview(&value),
        })),
        None => Json(json!({ "ok": false, "error": "no_credentials_in_pool" })),
    }
}

async fn credentials_random(State(state): State<AppState>) -> Json<JsonValue> {
    match state.pool.pick_random() {
        Some(value) => Json(json!({
            "ok": true,
            "total": state.pool.len(),
            "preview": preview(&value),
        })),
        None => Json(json!({ "ok": false, "error": "no_credentials_in_pool" })),
    }
}

async fn config_get(State(state): State<AppState>) -> Json<JsonValue> {
    let config = state.config_snapshot();
    Json(json!({
        "host": config.host,
        "port": config.port,
        "heartbeat_ms": config.heartbeat_ms,
        "flush_interval_ms": config.flush_interval_ms,
        "data_dir": config.data_dir,
    }))
}

async fn config_update(
    State(state): State<AppState>,
    Json(patch): Json<ConfigPatch>,
) -> Json<JsonValue> {
    {
        let mut config = state
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        config.apply(patch.clone());
    }

    // Persist the merged patch file so overrides survive a restart.
    let mut stored: ConfigPatch = state
        .store
        .read_json(CONFIG_FILE)
        .await
        .unwrap_or_default();
    stored.overlay(patch);
    match state.store.write_json(CONFIG_FILE, &stored).await {
        Ok(()) => Json(json!({ "ok": true })),
        Err(err) => {
            warn!(error = %err, "config write failed");
            Json(json!({ "ok": false, "error": err.to_string() }))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelsAddBody {
    #[serde(default)]
    models: Option<Vec<ModelInput>>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    owned_by: Option<String>,
    #[serde(default)]
    supports_reasoning: Option<bool>,
    #[serde(default, rename = "supportsReasoning")]
    supports_reasoning_camel: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ModelInput {
    id: String,
    #[serde(default)]
    owned_by: Option<String>,
    #[serde(default, alias = "supportsReasoning")]
    supports_reasoning: Option<bool>,
}

async fn models_add(
    State(state): State<AppState>,
    Json(body): Json<ModelsAddBody>,
) -> Json<JsonValue> {
    let mut items: Vec<ModelInput> = body.models.unwrap_or_default();
    if let Some(id) = body.id {
        items.push(ModelInput {
            id,
            owned_by: body.owned_by,
            supports_reasoning: body
                .supports_reasoning
                .or(body.supports_reasoning_camel),
        });
    }
    if items.is_empty() {
        return Json(json!({ "ok": false, "error": "no_models" }));
    }

    let mut current = state
        .store
        .read_json::<ListModelsResponse>(MODELS_FILE)
        .await
        .unwrap_or_else(|| ListModelsResponse::new(Vec::new()));

    let mut known: std::collections::HashSet<String> =
        current.data.iter().map(|model| model.id.clone()).collect();
    for item in items {
        let id = item.id.trim().to_string();
        if id.is_empty() {
            continue;
        }
        let owned_by = item
            .owned_by
            .unwrap_or_else(|| "custom".to_string());
        if known.insert(id.clone()) {
            current.data.push(Model {
                id: id.clone(),
                object: ModelObjectType::Model,
                owned_by: owned_by.clone(),
            });
        }
        if item.supports_reasoning.unwrap_or(false) {
            for &(suffix, _) in REASONING_SUFFIXES {
                let variant = format!("{id}{suffix}");
                if known.insert(variant.clone()) {
                    current.data.push(Model {
                        id: variant,
                        object: ModelObjectType::Model,
                        owned_by: owned_by.clone(),
                    });
                }
            }
        }
    }

    match state.store.write_json(MODELS_FILE, &current).await {
        Ok(()) => Json(json!({ "ok": true, "count": current.data.len() })),
        Err(err) => {
            warn!(error = %err, "model list write failed");
            Json(json!({ "ok": false, "error": err.to_string() }))
        }
    }
}

async fn models_clear(State(state): State<AppState>) -> Json<JsonValue> {
    let ok = state.store.delete(MODELS_FILE).await;
    Json(json!({ "ok": ok }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_line_credentials_split_and_trim() {
        let body: CredentialsBody =
            serde_json::from_value(json!({ "credentials": " a \n\nb\n" })).unwrap();
        assert_eq!(body.values(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn array_credentials_pass_through() {
        let body: CredentialsBody =
            serde_json::from_value(json!({ "credentials": ["x", " ", "y"] })).unwrap();
        assert_eq!(body.values(), vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn single_credential_field() {
        let body: CredentialsBody =
            serde_json::from_value(json!({ "credential": "only" })).unwrap();
        assert_eq!(body.values(), vec!["only".to_string()]);
    }

    #[test]
    fn preview_truncates_long_values() {
        let long = "x".repeat(80);
        assert_eq!(preview(&long).len(), 53);
        assert!(preview(&long).ends_with("..."));
        assert_eq!(preview("short"), "short");
    }
}
