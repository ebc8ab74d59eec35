use serde::Deserialize;

use crate::error::FetchError;
use crate::types::{TokenMeta, TransferRecord};

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

/// Decode the `{success, data, errors}` wrapper every explorer response
/// shares and return `data`.
pub(super) fn parse_envelope(body: &str) -> Result<serde_json::Value, FetchError> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| FetchError::InvalidResponse(format!("decode response envelope: {e}")))?;

    if !envelope.success {
        let message = envelope
            .errors
            .as_ref()
            .and_then(|errors| errors.get("message"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| "request unsuccessful".to_owned());
        return Err(FetchError::Api(message));
    }

    Ok(envelope.data)
}

pub(super) fn parse_transfer_records(
    data: serde_json::Value,
) -> Result<Vec<TransferRecord>, FetchError> {
    if data.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(data)
        .map_err(|e| FetchError::InvalidResponse(format!("invalid transfer list: {e}")))
}

pub(super) fn parse_token_meta(
    token: &str,
    data: serde_json::Value,
) -> Result<TokenMeta, FetchError> {
    #[derive(Deserialize)]
    struct MetaData {
        creator: String,
        created_time: u64,
        #[serde(default)]
        metadata: Option<MetaDetails>,
    }

    #[derive(Deserialize)]
    struct MetaDetails {
        name: Option<String>,
        image: Option<String>,
    }

    let raw: MetaData = serde_json::from_value(data)
        .map_err(|e| FetchError::InvalidResponse(format!("invalid token meta: {e}")))?;
    if raw.creator.is_empty() {
        return Err(FetchError::InvalidResponse(format!(
            "token {token} has no creator"
        )));
    }
    let (name, image) = raw
        .metadata
        .map(|m| (m.name, m.image))
        .unwrap_or((None, None));

    Ok(TokenMeta {
        address: token.to_owned(),
        creator: raw.creator,
        created_time: raw.created_time,
        name,
        image,
    })
}
