//! Config schema types (gateway, database, provider, fanout).

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtendoConfig {
    pub gateway: GatewayConfig,
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub fanout: FanoutConfig,
}

/// HTTP/WS listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 18790,
        }
    }
}

/// SQLite database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite file. `:memory:` is accepted for throwaway runs.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "atendo.db".into(),
        }
    }
}

/// WhatsApp provider API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the provider HTTP API.
    pub base_url: String,
    /// API key sent on every provider request.
    pub api_key: String,
    /// Provider instance name, addressed in send/connection paths.
    pub instance: String,
    /// Per-request timeout applied to provider calls.
    pub timeout_secs: u64,
    /// Probe the provider connection state before sending.
    pub check_connection: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            api_key: String::new(),
            instance: "main".into(),
            timeout_secs: 15,
            check_connection: true,
        }
    }
}

/// Realtime fanout tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Per-subscriber buffered frame capacity; a subscriber that falls this
    /// far behind is disconnected rather than allowed to block ingestion.
    pub buffer: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self { buffer: 256 }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_runnable() {
        let cfg = AtendoConfig::default();
        assert_eq!(cfg.gateway.port, 18790);
        assert!(!cfg.database.path.is_empty());
        assert!(cfg.provider.timeout_secs > 0);
        assert!(cfg.fanout.buffer > 0);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: AtendoConfig = toml::from_str(
            r#"
            [provider]
            base_url = "http://wa.example.com"
            api_key = "k1"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.provider.base_url, "http://wa.example.com");
        assert_eq!(cfg.provider.api_key, "k1");
        // Untouched sections keep defaults.
        assert_eq!(cfg.gateway.bind, "127.0.0.1");
        assert!(cfg.provider.check_connection);
    }
}
