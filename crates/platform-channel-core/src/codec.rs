//! JSON method codec.
//!
//! Wire shapes:
//! - method call: `{"method": "<name>", "args": <value>}`
//! - success envelope: `[<value>]`
//! - error envelope: `["<code>", "<message>", <details>]`
//! - "not implemented": no reply bytes at all
//!
//! A `null` argument and absent arguments are the same thing on the wire.

use crate::error::CodecError;
use crate::{EventPayload, MethodCall, MethodResult, PlatformError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize, Deserialize)]
struct WireCall {
    method: String,
    #[serde(default)]
    args: Value,
}

/// Stateless codec shared by method and event channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMethodCodec;

impl JsonMethodCodec {
    pub fn encode_method_call(call: &MethodCall) -> Result<Vec<u8>, CodecError> {
        let wire = WireCall {
            method: call.method.clone(),
            args: call.arguments.clone().unwrap_or(Value::Null),
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    pub fn decode_method_call(bytes: &[u8]) -> Result<MethodCall, CodecError> {
        let wire: WireCall = serde_json::from_slice(bytes)?;
        let arguments = match wire.args {
            Value::Null => None,
            args => Some(args),
        };
        Ok(MethodCall {
            method: wire.method,
            arguments,
        })
    }

    pub fn encode_success_envelope(value: &Value) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(&Value::Array(vec![value.clone()]))?)
    }

    pub fn encode_error_envelope(error: &PlatformError) -> Result<Vec<u8>, CodecError> {
        let envelope = Value::Array(vec![
            Value::String(error.code.clone()),
            Value::String(error.message.clone()),
            error.details.clone().unwrap_or(Value::Null),
        ]);
        Ok(serde_json::to_vec(&envelope)?)
    }

    /// Decodes a success or error envelope.
    pub fn decode_envelope(bytes: &[u8]) -> Result<Result<Value, PlatformError>, CodecError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let mut items = match value {
            Value::Array(items) => items,
            other => {
                return Err(CodecError::InvalidEnvelope(format!(
                    "expected an array, got {other}"
                )));
            }
        };

        match items.len() {
            1 => Ok(Ok(items.remove(0))),
            3 => {
                let details = items.pop().filter(|d| !d.is_null());
                let message = match items.pop() {
                    Some(Value::String(message)) => message,
                    Some(Value::Null) | None => String::new(),
                    Some(other) => {
                        return Err(CodecError::InvalidEnvelope(format!(
                            "error message must be a string, got {other}"
                        )));
                    }
                };
                let code = match items.pop() {
                    Some(Value::String(code)) => code,
                    other => {
                        return Err(CodecError::InvalidEnvelope(format!(
                            "error code must be a string, got {other:?}"
                        )));
                    }
                };
                Ok(Err(PlatformError {
                    code,
                    message,
                    details,
                }))
            }
            n => Err(CodecError::InvalidEnvelope(format!(
                "envelope has {n} elements"
            ))),
        }
    }

    /// Encodes a handler answer. `NotImplemented` becomes an empty reply.
    pub fn encode_result(result: &MethodResult) -> Result<Option<Vec<u8>>, CodecError> {
        match result {
            MethodResult::Success(value) => Self::encode_success_envelope(value).map(Some),
            MethodResult::Error(error) => Self::encode_error_envelope(error).map(Some),
            MethodResult::NotImplemented => Ok(None),
        }
    }

    pub fn decode_result(reply: Option<&[u8]>) -> Result<MethodResult, CodecError> {
        match reply {
            None => Ok(MethodResult::NotImplemented),
            Some(bytes) => Ok(match Self::decode_envelope(bytes)? {
                Ok(value) => MethodResult::Success(value),
                Err(error) => MethodResult::Error(error),
            }),
        }
    }

    pub fn encode_event(event: &EventPayload) -> Result<Vec<u8>, CodecError> {
        match event {
            EventPayload::Success(value) => Self::encode_success_envelope(value),
            EventPayload::Error(error) => Self::encode_error_envelope(error),
        }
    }

    pub fn decode_event(bytes: &[u8]) -> Result<EventPayload, CodecError> {
        Ok(match Self::decode_envelope(bytes)? {
            Ok(value) => EventPayload::Success(value),
            Err(error) => EventPayload::Error(error),
        })
    }
}
