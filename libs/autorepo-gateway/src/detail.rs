//! Human-readable messages from error response bodies.
//!
//! The backend reports failures as `{"detail": "..."}` or, for validation
//! errors, `{"detail": [{"msg": "...", ...}, ...]}`.

use serde::Deserialize;
use serde_json::Value;

/// Message used when the body carries no usable `detail`.
pub const DEFAULT_FAILURE_MESSAGE: &str = "request failed";

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<Detail>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Detail {
    Text(String),
    Items(Vec<DetailItem>),
}

#[derive(Deserialize)]
struct DetailItem {
    msg: Option<String>,
}

/// Extract the display message from an error response body.
///
/// Falls back to [`DEFAULT_FAILURE_MESSAGE`] when `detail` is missing, empty,
/// or of an unexpected shape.
#[must_use]
pub fn error_message(body: &Value) -> String {
    extract(body).unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_owned())
}

fn extract(body: &Value) -> Option<String> {
    let parsed = ErrorBody::deserialize(body).ok()?;
    let message = match parsed.detail? {
        Detail::Text(text) => text,
        Detail::Items(items) => items.into_iter().next()?.msg?,
    };
    let trimmed = message.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}
