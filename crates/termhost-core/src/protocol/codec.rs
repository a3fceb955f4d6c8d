//! JSON Lines framing

use super::inbound::{DomainEvent, InboundMessage, TransportMessage};
use super::outbound::ControlMessage;
use crate::error::HostResult;
use thiserror::Error;

/// Why an inbound line could not be turned into a message
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("message has no 'type' field")]
    MissingType,

    #[error("unrecognized message type '{type_name}'")]
    Unrecognized { type_name: String },

    #[error("invalid '{type_name}' payload: {source}")]
    InvalidPayload {
        type_name: String,
        source: serde_json::Error,
    },
}

/// Decode one line read from the backend
pub fn decode_line(line: &str) -> Result<InboundMessage, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(line.trim())?;
    let type_name = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(DecodeError::MissingType)?
        .to_string();

    let invalid = |source| DecodeError::InvalidPayload {
        type_name: type_name.clone(),
        source,
    };
    if DomainEvent::TYPE_TAGS.contains(&type_name.as_str()) {
        serde_json::from_value(value)
            .map(InboundMessage::Domain)
            .map_err(invalid)
    } else if TransportMessage::TYPE_TAGS.contains(&type_name.as_str()) {
        serde_json::from_value(value)
            .map(InboundMessage::Transport)
            .map_err(invalid)
    } else {
        Err(DecodeError::Unrecognized { type_name })
    }
}

/// Encode a control message as a single line, newline included
pub fn encode_line(message: &ControlMessage) -> HostResult<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}
