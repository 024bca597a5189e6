//! Typed JSON-RPC envelopes.
//!
//! Inbound frames are parsed exactly once, at the transport boundary, into
//! either a [`Inbound::Response`] (carries an `id`) or an
//! [`Inbound::Notification`] (no `id`, carries `method` and a `params` object
//! with a `subscriberId`). Everything past the router works on these types.
//!
//! ```text
//! request:       {"id": "<uuid>", "method": "...", "params": {...}}
//! response:      {"id": "<uuid>", "result": ...} | {"id": "<uuid>", "error": ...}
//! notification:  {"method": "...", "params": {"subscriberId": "<uuid>", ...}}
//! ```

use crate::domain::correlation::CorrelationId;
use crate::domain::error::{ClientError, RpcError};
use serde::Serialize;
use serde_json::{Map, Value};

/// Field name carrying the subscriber correlation id.
pub const SUBSCRIBER_ID_FIELD: &str = "subscriberId";

/// Outbound request envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub id: CorrelationId,
    pub method: String,
    pub params: Value,
}

impl Request {
    pub fn new(id: CorrelationId, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Serialize to the bytes handed to the transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ClientError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Server push notification addressed to one subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub subscriber_id: CorrelationId,
    /// The complete `params` object, `subscriberId` included
    pub params: Value,
}

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Response {
        id: CorrelationId,
        outcome: Result<Value, ClientError>,
    },
    Notification(Notification),
}

impl Inbound {
    /// Parse one inbound frame.
    ///
    /// Fails only when the frame cannot be attributed to anybody. A response
    /// that carries a valid id but neither `result` nor `error` parses
    /// successfully with a `Protocol` outcome, so only that call fails.
    pub fn parse(bytes: &[u8]) -> Result<Inbound, ClientError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let Value::Object(mut object) = value else {
            return Err(ClientError::protocol("message is not a json object"));
        };

        if let Some(id) = object.get("id") {
            let id = id
                .as_str()
                .and_then(|s| CorrelationId::parse(s).ok())
                .ok_or_else(|| ClientError::protocol(format!("unrecognised id {}", id)))?;

            let outcome = if let Some(result) = object.remove("result") {
                Ok(result)
            } else if let Some(error) = object.remove("error") {
                Err(ClientError::Rpc(RpcError::from_value(error)))
            } else {
                Err(ClientError::protocol(format!(
                    "received bad json rpc message: {}",
                    Value::Object(object)
                )))
            };
            return Ok(Inbound::Response { id, outcome });
        }

        let method = match object.remove("method") {
            Some(Value::String(method)) => method,
            _ => {
                return Err(ClientError::protocol(
                    "message has neither id nor method",
                ))
            }
        };

        let params = object
            .remove("params")
            .ok_or_else(|| ClientError::protocol(format!("notification {} has no params", method)))?;

        let subscriber_id = params
            .get(SUBSCRIBER_ID_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| CorrelationId::parse(s).ok())
            .ok_or_else(|| {
                ClientError::protocol(format!("notification {} has no valid subscriberId", method))
            })?;

        Ok(Inbound::Notification(Notification {
            method,
            subscriber_id,
            params,
        }))
    }
}

/// Turn caller-supplied params into an object, inserting the subscriber id.
///
/// `null` is treated as an empty object.
pub fn with_subscriber_id(
    params: Value,
    subscriber_id: CorrelationId,
) -> Result<Value, ClientError> {
    let mut object = match params {
        Value::Object(object) => object,
        Value::Null => Map::new(),
        other => {
            return Err(ClientError::protocol(format!(
                "subscription params must be an object, got {}",
                other
            )))
        }
    };
    object.insert(
        SUBSCRIBER_ID_FIELD.to_string(),
        Value::String(subscriber_id.to_string()),
    );
    Ok(Value::Object(object))
}
