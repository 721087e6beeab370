//! RPC envelope encoding: `{type_id, request_id, response_to, payload, error}`.
//!
//! `payload` is an opaque JSON value the router never interprets, so the
//! envelope is encoded and decoded by hand rather than through a typed
//! `Facet` struct — a derive would force every envelope through one fixed
//! payload shape.

use std::fmt;

use flowersec_wire::{escape_json_string, object_fields, unescape_json_string, RawJsonError};

#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub type_id: u32,
    pub request_id: u64,
    pub response_to: u64,
    /// Raw JSON text of the payload value, or `None` if the field was
    /// absent or `null`.
    pub payload: Option<String>,
    pub error: Option<RpcError>,
}

impl Envelope {
    pub fn request(type_id: u32, request_id: u64, payload: Option<String>) -> Self {
        Self { type_id, request_id, response_to: 0, payload, error: None }
    }

    pub fn notification(type_id: u32, payload: Option<String>) -> Self {
        Self { type_id, request_id: 0, response_to: 0, payload, error: None }
    }

    pub fn response(type_id: u32, response_to: u64, payload: Option<String>) -> Self {
        Self { type_id, request_id: 0, response_to, payload, error: None }
    }

    pub fn error_response(type_id: u32, response_to: u64, error: RpcError) -> Self {
        Self { type_id, request_id: 0, response_to, payload: None, error: Some(error) }
    }

    pub fn is_notification(&self) -> bool {
        self.request_id == 0 && self.response_to == 0
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push('{');
        out.push_str("\"type_id\":");
        out.push_str(&self.type_id.to_string());
        out.push_str(",\"request_id\":");
        out.push_str(&self.request_id.to_string());
        out.push_str(",\"response_to\":");
        out.push_str(&self.response_to.to_string());
        if let Some(payload) = &self.payload {
            out.push_str(",\"payload\":");
            out.push_str(payload);
        }
        if let Some(error) = &self.error {
            out.push_str(",\"error\":{\"code\":");
            out.push_str(&error.code.to_string());
            out.push_str(",\"message\":");
            out.push_str(&escape_json_string(&error.message));
            out.push('}');
        }
        out.push('}');
        out
    }

    pub fn decode(json: &str) -> Result<Self, EnvelopeError> {
        let fields = object_fields(json)?;

        let mut type_id = None;
        let mut request_id = 0u64;
        let mut response_to = 0u64;
        let mut payload = None;
        let mut error = None;

        for (key, raw) in fields {
            match key.as_str() {
                "type_id" => {
                    type_id = Some(raw.trim().parse::<u32>().map_err(|_| EnvelopeError::InvalidNumber("type_id"))?)
                }
                "request_id" => {
                    request_id = raw.trim().parse::<u64>().map_err(|_| EnvelopeError::InvalidNumber("request_id"))?
                }
                "response_to" => {
                    response_to =
                        raw.trim().parse::<u64>().map_err(|_| EnvelopeError::InvalidNumber("response_to"))?
                }
                "payload" => payload = if raw.trim() == "null" { None } else { Some(raw.to_string()) },
                "error" => error = Some(decode_error(raw)?),
                _ => {}
            }
        }

        Ok(Self {
            type_id: type_id.ok_or(EnvelopeError::MissingField("type_id"))?,
            request_id,
            response_to,
            payload,
            error,
        })
    }
}

fn decode_error(raw: &str) -> Result<RpcError, EnvelopeError> {
    let fields = object_fields(raw)?;
    let mut code = None;
    let mut message = None;
    for (key, value) in fields {
        match key.as_str() {
            "code" => code = Some(value.trim().parse::<i32>().map_err(|_| EnvelopeError::InvalidNumber("error.code"))?),
            "message" => message = Some(unescape_json_string(value)?),
            _ => {}
        }
    }
    Ok(RpcError {
        code: code.ok_or(EnvelopeError::MissingField("error.code"))?,
        message: message.ok_or(EnvelopeError::MissingField("error.message"))?,
    })
}

#[derive(Debug)]
pub enum EnvelopeError {
    Json(RawJsonError),
    MissingField(&'static str),
    InvalidNumber(&'static str),
    Encode(String),
    Decode(String),
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeError::Json(e) => write!(f, "malformed envelope json: {e}"),
            EnvelopeError::MissingField(name) => write!(f, "envelope missing field: {name}"),
            EnvelopeError::InvalidNumber(name) => write!(f, "envelope field is not a valid number: {name}"),
            EnvelopeError::Encode(msg) => write!(f, "failed to encode payload: {msg}"),
            EnvelopeError::Decode(msg) => write!(f, "failed to decode payload: {msg}"),
        }
    }
}

impl std::error::Error for EnvelopeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EnvelopeError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RawJsonError> for EnvelopeError {
    fn from(e: RawJsonError) -> Self {
        EnvelopeError::Json(e)
    }
}
