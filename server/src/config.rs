//! Runtime configuration for the delivery engine and the secret lookup.

use log::{error, warn};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::store::{RemoteServer, RetryPolicy};

/// Tunables injected into the orchestrator, queue manager and sweeper.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Ceiling on one remote command, connect through reply.
    pub rcon_timeout: Duration,
    /// Ceiling on candidate servers tried per delivery attempt.
    pub max_candidates: usize,
    pub retry: RetryPolicy,
    /// Retry sweeper period; `None` disables the sweeper.
    pub sweep_interval: Option<Duration>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            rcon_timeout: Duration::from_millis(5000),
            max_candidates: 8,
            retry: RetryPolicy::default(),
            sweep_interval: None,
        }
    }
}

impl DeliveryConfig {
    /// Upper bound on transport time for one order: candidates x commands x timeout.
    pub fn worst_case(&self, candidates: usize, commands: usize) -> Duration {
        let calls = candidates.min(self.max_candidates).saturating_mul(commands);
        self.rcon_timeout
            .saturating_mul(u32::try_from(calls).unwrap_or(u32::MAX))
    }
}

/// Read-only map of server id or name to its RCON secret.
#[derive(Clone, Default)]
pub struct SecretStore {
    secrets: HashMap<String, String>,
}

impl SecretStore {
    /// Parses a JSON object of `{"server-id-or-name": "secret"}`.
    ///
    /// Malformed input is logged and yields an empty store.
    pub fn from_json(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<HashMap<String, String>>(raw) {
            Ok(secrets) => {
                if secrets.is_empty() {
                    warn!("RCON secret map is empty; every delivery will fail over");
                }
                Self { secrets }
            }
            Err(e) => {
                error!("Failed to parse RCON secrets, expected a JSON object: {}", e);
                Self::default()
            }
        }
    }

    /// Secret for a server, looked up by id first and then by name. Empty
    /// secrets count as missing.
    pub fn lookup(&self, server: &RemoteServer) -> Option<&str> {
        self.non_empty(&server.id)
            .or_else(|| self.non_empty(&server.name))
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.secrets
            .get(key)
            .map(String::as_str)
            .filter(|secret| !secret.is_empty())
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.secrets.keys().collect();
        keys.sort();
        f.debug_struct("SecretStore")
            .field("servers", &keys)
            .field("secrets", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(id: &str, name: &str) -> RemoteServer {
        RemoteServer {
            id: id.to_string(),
            name: name.to_string(),
            host: "localhost".to_string(),
            port: 25575,
            mode: "survival".to_string(),
            enabled: true,
            priority: 0,
        }
    }

    #[test]
    fn test_lookup_prefers_id() {
        let store = SecretStore::from_json(r#"{"s1": "by-id", "survival-1": "by-name"}"#);
        assert_eq!(store.lookup(&server("s1", "survival-1")), Some("by-id"));
        assert_eq!(store.lookup(&server("s9", "survival-1")), Some("by-name"));
        assert_eq!(store.lookup(&server("s9", "hub")), None);
    }

    #[test]
    fn test_empty_secret_counts_as_missing() {
        let store = SecretStore::from_json(r#"{"s1": "", "survival-1": "by-name", "s2": ""}"#);
        assert_eq!(store.lookup(&server("s1", "survival-1")), Some("by-name"));
        assert_eq!(store.lookup(&server("s2", "hub")), None);
    }

    #[test]
    fn test_malformed_json_is_empty() {
        assert!(SecretStore::from_json("not json").is_empty());
        assert!(SecretStore::from_json("[\"a\"]").is_empty());
        assert!(SecretStore::from_json("").is_empty());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let store = SecretStore::from_json(r#"{"s1": "hunter2"}"#);
        let debug = format!("{:?}", store);
        assert!(debug.contains("s1"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_worst_case_bound() {
        let config = DeliveryConfig {
            rcon_timeout: Duration::from_secs(2),
            max_candidates: 3,
            ..DeliveryConfig::default()
        };
        assert_eq!(config.worst_case(10, 4), Duration::from_secs(24));
        assert_eq!(config.worst_case(0, 4), Duration::ZERO);
    }
}
