//! Call, result and event envelopes.
//!
//! Values are untyped JSON so both sides can exchange whatever the
//! application defines; this module only fixes the envelope shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A named method invocation with optional arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    pub arguments: Option<Value>,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Option<Value>) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    /// The arguments as a map, if they are one.
    pub fn arguments_map(&self) -> Option<&serde_json::Map<String, Value>> {
        self.arguments.as_ref().and_then(Value::as_object)
    }
}

/// A domain-reported failure: `(code, message, details)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformError {
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

impl PlatformError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// What a method call handler answers.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResult {
    Success(Value),
    Error(PlatformError),
    /// The handler exists but does not know the method.
    NotImplemented,
}

impl MethodResult {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(PlatformError::new(code, message))
    }
}

/// One item pushed down an event channel. There is no "not implemented"
/// event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Success(Value),
    Error(PlatformError),
}

impl EventPayload {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(PlatformError::new(code, message))
    }
}

impl From<EventPayload> for MethodResult {
    fn from(event: EventPayload) -> Self {
        match event {
            EventPayload::Success(value) => Self::Success(value),
            EventPayload::Error(error) => Self::Error(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arguments_map_only_for_objects() {
        let call = MethodCall::new("openPage", Some(json!({"name": "Alice"})));
        assert_eq!(call.arguments_map().unwrap()["name"], "Alice");

        let call = MethodCall::new("openPage", Some(json!(["Alice"])));
        assert!(call.arguments_map().is_none());

        let call = MethodCall::new("openPage", None);
        assert!(call.arguments_map().is_none());
    }

    #[test]
    fn platform_error_display() {
        let err = PlatformError::new("UNAVAILABLE", "Battery level not available.");
        assert_eq!(err.to_string(), "UNAVAILABLE: Battery level not available.");
    }
}
