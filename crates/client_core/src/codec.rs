//! Body encoding per call and response/error decoding.

use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use shared::error::ErrorDetail;
use thiserror::Error;
use tracing::debug;

use crate::{
    error::Operation,
    transport::{FilePart, MultipartBody, RequestBody},
};

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const JSON: &str = "application/json";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode request body: {0}")]
    Encode(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Form body for the credential exchange.
///
/// The wire contract carries the email in the `username` field.
pub fn encode_credentials(email: &str, password: &str) -> RequestBody {
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("username", email)
        .append_pair("password", password)
        .finish();
    RequestBody::Bytes {
        content_type: FORM_URLENCODED.to_string(),
        bytes: encoded.into_bytes(),
    }
}

pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<RequestBody, CodecError> {
    let bytes = serde_json::to_vec(value).map_err(|err| CodecError::Encode(err.to_string()))?;
    Ok(RequestBody::Bytes {
        content_type: JSON.to_string(),
        bytes,
    })
}

/// Every field becomes a text part; the file, if any, is added last.
pub fn encode_multipart(fields: Vec<(String, String)>, file: Option<FilePart>) -> RequestBody {
    RequestBody::Multipart(MultipartBody { fields, file })
}

pub fn decode<T: DeserializeOwned>(raw: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(raw).map_err(|err| CodecError::MalformedResponse(err.to_string()))
}

/// Pulls `detail` out of an error payload, falling back to the operation's
/// default message.
pub fn extract_error_message(operation: Operation, status: StatusCode, raw: &[u8]) -> String {
    match serde_json::from_slice::<ErrorDetail>(raw) {
        Ok(payload) => {
            if let Some(message) = payload.message() {
                return message.to_string();
            }
            debug!(%operation, status = status.as_u16(), "codec: error payload without detail");
        }
        Err(err) => {
            debug!(%operation, status = status.as_u16(), error = %err, "codec: unparsable error payload");
        }
    }
    operation.default_message().to_string()
}

#[cfg(test)]
#[path = "tests/codec_tests.rs"]
mod tests;
