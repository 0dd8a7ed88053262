use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error payload the API attaches to rejected requests: `{"detail": ...}`.
///
/// `detail` is usually a string but validation failures send a list, so it is
/// kept as a raw value and only surfaced when it is a non-empty string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub detail: Option<Value>,
}

impl ErrorDetail {
    pub fn message(&self) -> Option<&str> {
        self.detail
            .as_ref()?
            .as_str()
            .map(str::trim)
            .filter(|message| !message.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown content type '{0}' (expected document, image or video)")]
pub struct ParseContentTypeError(pub String);
