//! Client configuration.
//!
//! Plain data with construction-time validation. Reading these values from
//! files, flags, or the environment is a caller concern; the core only
//! checks that what it was handed is usable and fails fast when it is not
//! (a TLS toggle without key material must never get as far as a dial).

use std::collections::HashMap;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CLIENT_ID, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_KEEPALIVE_MS, DEFAULT_METADATA_MAX_AGE_MS,
    DEFAULT_METADATA_RETRIES, DEFAULT_TIMEOUT_MS,
};
use crate::error::{Error, Result};
use crate::protocol::{ApiKey, SaslMechanism};

/// TLS material for broker connections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    /// Path to the PEM-encoded client certificate (may be a chain).
    pub cert: String,
    /// Path to the PEM-encoded client private key.
    pub key: String,
    /// Path to the PEM-encoded CA bundle used to verify brokers.
    pub ca: String,
    /// Overrides the server name used for certificate verification and SNI;
    /// empty means "use the dialed host".
    pub server_name: String,
    /// Skip server certificate verification. Test clusters only.
    pub insecure_skip_verify: bool,
}

/// SASL credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslOptions {
    pub mechanism: SaslMechanism,
    pub user: String,
    pub password: String,
}

/// Configuration shared by every broker connection of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Comma-separated `host:port` seed list.
    pub bootstrap_servers: String,
    /// Sent as the client_id string in every request header.
    pub client_id: String,
    pub connect_timeout_ms: u64,
    pub keepalive_ms: u64,
    /// Default response-read timeout.
    pub timeout_ms: u64,
    /// Per-API overrides of `timeout_ms`.
    pub timeout_ms_per_api: HashMap<ApiKey, u64>,
    pub tls_enabled: bool,
    pub tls: Option<TlsOptions>,
    pub sasl: Option<SaslOptions>,
    /// Recommended ticker interval for metadata refresh; the core does not
    /// schedule refreshes itself.
    pub metadata_max_age_ms: u64,
    /// Attempts for one topic metadata fetch before giving up.
    pub fetch_topic_metadata_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: String::new(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            keepalive_ms: DEFAULT_KEEPALIVE_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            timeout_ms_per_api: HashMap::new(),
            tls_enabled: false,
            tls: None,
            sasl: None,
            metadata_max_age_ms: DEFAULT_METADATA_MAX_AGE_MS,
            fetch_topic_metadata_retries: DEFAULT_METADATA_RETRIES,
        }
    }
}

impl ClientConfig {
    pub fn new(bootstrap_servers: &str) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.to_string(),
            ..Self::default()
        }
    }

    /// Validate the configuration. Called by every constructor that accepts
    /// a config; errors here are fatal and nothing is dialed.
    pub fn validate(&self) -> Result<()> {
        self.seed_addresses()?;
        if self.tls_enabled {
            match &self.tls {
                None => {
                    return Err(Error::Config(
                        "tls is enabled but no tls options are set".to_string(),
                    ))
                }
                Some(tls) => {
                    if tls.cert.is_empty() || tls.key.is_empty() || tls.ca.is_empty() {
                        return Err(Error::Config(
                            "tls is enabled but either cert or key or ca is not set".to_string(),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// The parsed bootstrap list, in the order given.
    pub fn seed_addresses(&self) -> Result<Vec<String>> {
        let mut seeds = Vec::new();
        for part in self.bootstrap_servers.split(',') {
            let address = part.trim();
            if address.is_empty() {
                continue;
            }
            let valid = address
                .rsplit_once(':')
                .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
                .unwrap_or(false);
            if !valid {
                return Err(Error::Config(format!(
                    "malformed bootstrap address: {address:?}"
                )));
            }
            seeds.push(address.to_string());
        }
        if seeds.is_empty() {
            return Err(Error::Config("bootstrap server list is empty".to_string()));
        }
        Ok(seeds)
    }

    /// The response-read timeout for one API, honoring per-API overrides.
    pub fn timeout_for(&self, api: ApiKey) -> Duration {
        let ms = self
            .timeout_ms_per_api
            .get(&api)
            .copied()
            .unwrap_or(self.timeout_ms);
        Duration::from_millis(ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.keepalive_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_needs_bootstrap() {
        assert!(ClientConfig::default().validate().is_err());
    }

    #[test]
    fn test_seed_addresses_parsing() {
        let config = ClientConfig::new("a.example:9092, b.example:9093 ,");
        assert_eq!(
            config.seed_addresses().unwrap(),
            vec!["a.example:9092".to_string(), "b.example:9093".to_string()]
        );
    }

    #[test]
    fn test_malformed_bootstrap_rejected() {
        for bad in ["nocolon", "host:", ":9092", "host:notaport"] {
            let config = ClientConfig::new(bad);
            assert!(config.validate().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_tls_enabled_without_material_is_fatal() {
        let mut config = ClientConfig::new("localhost:9092");
        config.tls_enabled = true;
        assert!(config.validate().is_err());

        config.tls = Some(TlsOptions {
            cert: "client.crt".to_string(),
            key: "client.key".to_string(),
            ca: String::new(),
            ..TlsOptions::default()
        });
        assert_eq!(
            config.validate(),
            Err(Error::Config(
                "tls is enabled but either cert or key or ca is not set".to_string()
            ))
        );
    }

    #[test]
    fn test_tls_disabled_ignores_material() {
        let config = ClientConfig::new("localhost:9092");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_override_per_api() {
        let mut config = ClientConfig::new("localhost:9092");
        config.timeout_ms = 1_000;
        config.timeout_ms_per_api.insert(ApiKey::Fetch, 60_000);
        assert_eq!(config.timeout_for(ApiKey::Fetch), Duration::from_secs(60));
        assert_eq!(
            config.timeout_for(ApiKey::Metadata),
            Duration::from_secs(1)
        );
    }
}
