//! Bridge configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_DOMAIN: &str = "samples.flutter.io";

/// Settings shared by both ends of a bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Namespace prefix for channel names (`<domain>/<purpose>`).
    pub domain: String,
    /// Uniform timeout for every pending send. `None` waits forever.
    pub call_timeout_ms: Option<u64>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_string(),
            call_timeout_ms: None,
        }
    }
}

impl BridgeConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    /// Fully qualified channel name for a purpose, e.g. `battery`.
    pub fn channel_name(&self, purpose: &str) -> String {
        format!("{}/{}", self.domain, purpose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.channel_name("battery"), "samples.flutter.io/battery");
        assert_eq!(config.call_timeout(), None);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: BridgeConfig = serde_json::from_str(r#"{"call_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.domain, DEFAULT_DOMAIN);
        assert_eq!(config.call_timeout(), Some(Duration::from_millis(250)));
    }
}
