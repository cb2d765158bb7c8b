use serde_json::Value as JsonValue;
use tracing::debug;

use smproxy_protocol::openai::list_models::response::{ListModelsResponse, Model, ModelObjectType};

use crate::client::{PLAYGROUND_URL, UpstreamClient};
use crate::convert::REASONING_SUFFIXES;

/// Keys that identify the model table among the many array literals in the
/// playground bundle.
const MARKER_KEYS: [&str; 5] = ["supportsReasoning", "value", "label", "provider", "premium"];
const MAX_SCANS: usize = 2000;

pub fn fallback_models_list() -> ListModelsResponse {
    ListModelsResponse::new(vec![
        Model {
            id: "claude-sonnet-4.5".to_string(),
            object: ModelObjectType::Model,
            owned_by: "smithery".to_string(),
        },
        Model {
            id: "gpt-5".to_string(),
            object: ModelObjectType::Model,
            owned_by: "smithery".to_string(),
        },
    ])
}

/// Scrape the playground bundle for the model table. Falls back to the
/// static list when nothing parseable turns up.
pub async fn refresh_catalog(client: &dyn UpstreamClient) -> ListModelsResponse {
    match scrape_catalog(client).await {
        Some(list) => list,
        None => fallback_models_list(),
    }
}

async fn scrape_catalog(client: &dyn UpstreamClient) -> Option<ListModelsResponse> {
    let html = client.fetch_text(PLAYGROUND_URL).await.ok()?;
    for src in extract_script_srcs(&html, PLAYGROUND_URL) {
        let js = match client.fetch_text(&src).await {
            Ok(js) => js,
            Err(err) => {
                debug!(url = %src, error = %err, "bundle fetch failed, trying next");
                continue;
            }
        };
        let Some(segment) = find_models_array(&js) else {
            continue;
        };
        let normalized = normalize_models_js(segment);
        match serde_json::from_str::<Vec<JsonValue>>(&normalized) {
            Ok(models) => return Some(models_to_openai_list(&models)),
            Err(err) => {
                debug!(url = %src, error = %err, "model table did not parse, trying next");
            }
        }
    }
    None
}

/// Scan for the first balanced top-level `[...]` whose text carries all the
/// marker keys. String literals (including template strings) are skipped so
/// brackets inside them cannot unbalance the scan.
pub fn find_models_array(js: &str) -> Option<&str> {
    let bytes = js.as_bytes();
    let n = bytes.len();
    let mut i = 0;
    let mut scans = 0;

    while i < n && scans < MAX_SCANS {
        scans += 1;
        let Some(start_rel) = js[i..].find('[') else {
            break;
        };
        let start = i + start_rel;

        let mut j = start;
        let mut depth = 0i64;
        let mut in_str = false;
        let mut quote = 0u8;
        let mut escaped = false;
        while j < n {
            let c = bytes[j];
            if in_str {
                if escaped {
                    escaped = false;
                } else if c == b'\\' {
                    escaped = true;
                } else if c == quote {
                    in_str = false;
                }
                j += 1;
                continue;
            }
            match c {
                b'"' | b'\'' | b'`' => {
                    in_str = true;
                    quote = c;
                }
                b'[' => depth += 1,
                b']' => {
                    depth -= 1;
                    if depth == 0 {
                        let segment = &js[start..=j];
                        if MARKER_KEYS.iter().all(|key| segment.contains(key)) {
                            return Some(segment);
                        }
                        i = j + 1;
                        break;
                    }
                }
                _ => {}
            }
            j += 1;
        }

        if i <= start {
            i = start + 1;
        }
    }
    None
}

/// Normalize a minified JS array literal into JSON: `!0`/`!1` become
/// booleans and bare object keys get quoted.
pub fn normalize_models_js(segment: &str) -> String {
    let segment = segment.replace("!0", "true").replace("!1", "false");
    quote_bare_keys(&segment)
}

fn quote_bare_keys(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 64);
    let mut i = 0;
    let mut in_str = false;
    let mut quote = '"';
    let mut escaped = false;

    while i < chars.len() {
        let c = chars[i];
        if in_str {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_str = false;
            }
            i += 1;
            continue;
        }
        match c {
            '"' | '\'' | '`' => {
                in_str = true;
                quote = c;
                out.push(c);
                i += 1;
            }
            '{' | ',' => {
                out.push(c);
                i += 1;
                let mut j = i;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                let mut k = j;
                if k < chars.len() && (chars[k].is_ascii_alphabetic() || chars[k] == '_') {
                    k += 1;
                    while k < chars.len()
                        && (chars[k].is_ascii_alphanumeric() || chars[k] == '_')
                    {
                        k += 1;
                    }
                    let mut after = k;
                    while after < chars.len() && chars[after].is_whitespace() {
                        after += 1;
                    }
                    if after < chars.len() && chars[after] == ':' {
                        out.extend(&chars[i..j]);
                        out.push('"');
                        out.extend(&chars[j..k]);
                        out.push('"');
                        i = k;
                    }
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Project the scraped table onto an OpenAI model list, adding one variant
/// per reasoning suffix for models that support reasoning.
pub fn models_to_openai_list(models: &[JsonValue]) -> ListModelsResponse {
    let mut data = Vec::new();
    for model in models {
        let id = model["value"]
            .as_str()
            .or_else(|| model["id"].as_str())
            .unwrap_or("");
        if id.is_empty() {
            continue;
        }
        let provider = model["provider"]
            .as_str()
            .unwrap_or("smithery")
            .to_ascii_lowercase();
        data.push(Model {
            id: id.to_string(),
            object: ModelObjectType::Model,
            owned_by: provider.clone(),
        });
        if model["supportsReasoning"].as_bool() == Some(true) {
            for &(suffix, _) in REASONING_SUFFIXES {
                data.push(Model {
                    id: format!("{id}{suffix}"),
                    object: ModelObjectType::Model,
                    owned_by: provider.clone(),
                });
            }
        }
    }
    ListModelsResponse::new(data)
}

pub fn extract_script_srcs(html: &str, base: &str) -> Vec<String> {
    const NEEDLE: &str = "<script src=\"";
    let mut out = Vec::new();
    let mut rest = html;
    while let Some(pos) = rest.find(NEEDLE) {
        let after = &rest[pos + NEEDLE.len()..];
        let Some(end) = after.find('"') else {
            break;
        };
        out.push(resolve_url(&after[..end], base));
        rest = &after[end..];
    }
    out
}

fn resolve_url(src: &str, base: &str) -> String {
    if src.contains("://") {
        return src.to_string();
    }
    if let Some(rest) = src.strip_prefix("//") {
        return format!("https://{rest}");
    }
    let origin = origin_of(base);
    if src.starts_with('/') {
        format!("{origin}{src}")
    } else {
        format!("{origin}/{src}")
    }
}

fn origin_of(url: &str) -> &str {
    let Some(scheme_end) = url.find("://") else {
        return url;
    };
    match url[scheme_end + 3..].find('/') {
        Some(path_start) => &url[..scheme_end + 3 + path_start],
        None => url,
    }
}
