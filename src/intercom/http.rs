//! HTTP plumbing for the Intercom API: client construction and error
//! normalization.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use serde_json::Value;

use crate::error::{BridgeError, Result};

/// Build default headers for a Bearer-token JSON API.
pub fn bearer_headers(access_token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    let auth = HeaderValue::from_str(&format!("Bearer {access_token}"))
        .map_err(|_| BridgeError::Configuration("access token is not a valid header value".into()))?;
    headers.insert(AUTHORIZATION, auth);
    Ok(headers)
}

/// Build the reqwest client used for every Intercom call.
pub fn build_client(access_token: &str) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .default_headers(bearer_headers(access_token)?)
        .timeout(Duration::from_secs(120))
        .pool_max_idle_per_host(10)
        .build()?)
}

/// Pass successful responses through; turn anything else into
/// [`BridgeError::Api`] with the best human-readable reason available.
pub async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_to_error(status, &body))
}

/// Normalize an error response body.
///
/// Reason priority: field validation errors joined by a space, `details`,
/// `reason`, then the canonical status text.
pub fn status_to_error(status: StatusCode, body: &str) -> BridgeError {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(error_reason)
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| status.to_string());
    BridgeError::api(status.as_u16(), message)
}

fn error_reason(body: &Value) -> Option<String> {
    if let Some(errors) = body.get("errors") {
        if let Some(joined) = validation_messages(errors) {
            return Some(joined);
        }
    }
    ["details", "reason"]
        .iter()
        .find_map(|key| body.get(*key).and_then(text_of))
}

fn validation_messages(errors: &Value) -> Option<String> {
    let messages: Vec<String> = match errors {
        // { "field": ["msg", ...], ... }
        Value::Object(fields) => fields
            .values()
            .flat_map(|v| match v {
                Value::Array(items) => items.iter().filter_map(text_of).collect::<Vec<_>>(),
                other => text_of(other).into_iter().collect(),
            })
            .collect(),
        // [ { "code": "...", "message": "..." }, ... ]
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.get("message").and_then(text_of).or_else(|| text_of(item)))
            .collect(),
        _ => Vec::new(),
    };
    (!messages.is_empty()).then(|| messages.join(" "))
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
