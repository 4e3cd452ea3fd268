//! Confluent Cloud Types
//!
//! Domain records shared by the control-plane and data-plane clients.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Treat an explicit JSON `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================
// Identity
// ============================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    #[serde(deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(deserialize_with = "null_as_default")]
    pub first_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub last_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub organization_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub deactivated: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub service_account: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Account {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub organization_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub deactivated: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub created: String,
    #[serde(deserialize_with = "null_as_default")]
    pub modified: String,
    #[serde(deserialize_with = "null_as_default")]
    pub internal: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Organization {
    #[serde(deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub deactivated: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub created: String,
    #[serde(deserialize_with = "null_as_default")]
    pub modified: String,
}

// ============================================================
// Cluster
// ============================================================

/// A logical Kafka cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cluster {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub account_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub organization_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub network_ingress: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub network_egress: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub storage: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub durability: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    /// Bootstrap endpoint, `protocol://host:port`
    #[serde(deserialize_with = "null_as_default")]
    pub endpoint: String,
    /// Base URL of the cluster's own data-plane API
    #[serde(deserialize_with = "null_as_default")]
    pub api_endpoint: String,
    #[serde(deserialize_with = "null_as_default")]
    pub region: String,
    #[serde(deserialize_with = "null_as_default")]
    pub service_provider: String,
    #[serde(deserialize_with = "null_as_default")]
    pub created: String,
    #[serde(deserialize_with = "null_as_default")]
    pub modified: String,
}

impl Cluster {
    pub fn endpoint_parts(&self) -> EndpointParts {
        EndpointParts::parse(&self.endpoint)
    }

    pub fn readiness(&self) -> Readiness {
        Readiness::from_status(&self.status)
    }
}

/// Whether a cluster reports itself as serving traffic.
///
/// Informational only: data-plane calls do not wait on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Provisioning,
}

impl Readiness {
    pub fn from_status(status: &str) -> Self {
        if status.eq_ignore_ascii_case("UP") {
            Readiness::Ready
        } else {
            Readiness::Provisioning
        }
    }
}

impl std::fmt::Display for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Readiness::Ready => write!(f, "ready"),
            Readiness::Provisioning => write!(f, "provisioning"),
        }
    }
}

/// Components of a `protocol://host:port` endpoint.
///
/// Empty or malformed input yields the default value (`""`, `""`, `0`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointParts {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl EndpointParts {
    pub fn parse(endpoint: &str) -> Self {
        Self::try_parse(endpoint.trim()).unwrap_or_default()
    }

    fn try_parse(endpoint: &str) -> Option<Self> {
        let (protocol, rest) = endpoint.split_once("://")?;
        let (host, port) = rest.rsplit_once(':')?;
        if protocol.is_empty() || host.is_empty() {
            return None;
        }
        let port = port.trim_end_matches('/').parse().ok()?;

        Some(Self {
            protocol: protocol.to_string(),
            host: host.to_string(),
            port,
        })
    }
}

// ============================================================
// Topic
// ============================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Broker {
    #[serde(deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub host: String,
    #[serde(deserialize_with = "null_as_default")]
    pub port: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Partition {
    #[serde(deserialize_with = "null_as_default")]
    pub partition: i32,
    pub leader: Option<Broker>,
    #[serde(deserialize_with = "null_as_default")]
    pub replicas: Vec<Broker>,
    #[serde(deserialize_with = "null_as_default")]
    pub isr: Vec<Broker>,
}

/// A single topic configuration value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValue {
    pub value: String,
    pub read_only: bool,
    pub sensitive: bool,
}

impl ConfigValue {
    pub fn writable(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            read_only: false,
            sensitive: false,
        }
    }
}

/// Topic configuration keyed by Kafka config name (`retention.ms`, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicConfigs(BTreeMap<String, ConfigValue>);

impl TopicConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ConfigValue) {
        self.0.insert(name.into(), value);
    }

    /// Builder-style insert of a writable entry
    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, ConfigValue::writable(value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ConfigValue> {
        self.0.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|c| c.value.as_str())
    }

    pub fn mark_read_only(&mut self, name: &str) {
        if let Some(entry) = self.0.get_mut(name) {
            entry.read_only = true;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Entries that may be written back to the remote API
    pub fn writable(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter(|(_, v)| !v.read_only)
            .map(|(k, v)| (k.as_str(), v.value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A topic as seen on the data plane
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topic {
    pub name: String,
    pub internal: bool,
    pub partitions: Vec<Partition>,
    pub configs: TopicConfigs,
}

impl Topic {
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }
}

// ============================================================
// API Key
// ============================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogicalCluster {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
}

/// A cluster-scoped API key.
///
/// `secret` is only populated in the response to the create call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKey {
    #[serde(alias = "Id", deserialize_with = "null_as_default")]
    pub id: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub key: String,
    pub secret: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub account_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub logical_clusters: Vec<LogicalCluster>,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub deactivated: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub created: String,
    #[serde(deserialize_with = "null_as_default")]
    pub modified: String,
}

impl ApiKey {
    pub fn cluster_ids(&self) -> Vec<String> {
        self.logical_clusters.iter().map(|c| c.id.clone()).collect()
    }

    /// The secret, if this value came from the create response
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parse() {
        let parts = EndpointParts::parse("SASL_SSL://broker.example.com:9092");
        assert_eq!(parts.protocol, "SASL_SSL");
        assert_eq!(parts.host, "broker.example.com");
        assert_eq!(parts.port, 9092);
    }

    #[test]
    fn test_endpoint_parse_empty_and_malformed() {
        assert_eq!(EndpointParts::parse(""), EndpointParts::default());
        assert_eq!(EndpointParts::parse("broker:9092"), EndpointParts::default());
        assert_eq!(
            EndpointParts::parse("SASL_SSL://broker.example.com"),
            EndpointParts::default()
        );
        assert_eq!(
            EndpointParts::parse("SASL_SSL://broker.example.com:http"),
            EndpointParts::default()
        );
        let parts = EndpointParts::default();
        assert_eq!((parts.protocol.as_str(), parts.host.as_str(), parts.port), ("", "", 0));
    }

    #[test]
    fn test_cluster_decodes_partial_payload() {
        let cluster: Cluster = serde_json::from_str(
            r#"{"id": "lkc-1", "name": "orders", "status": "UP",
                "endpoint": "SASL_SSL://pkc-1.eu-west-1.aws.confluent.cloud:9092",
                "unknown_field": true}"#,
        )
        .unwrap();

        assert_eq!(cluster.id, "lkc-1");
        assert_eq!(cluster.readiness(), Readiness::Ready);
        assert_eq!(cluster.endpoint_parts().port, 9092);
        assert_eq!(cluster.api_endpoint, "");
    }

    #[test]
    fn test_null_fields_decode_as_defaults() {
        let cluster: Cluster = serde_json::from_str(
            r#"{"id": "lkc-1", "name": "main", "api_endpoint": null, "durability": null, "storage": null}"#,
        )
        .unwrap();
        assert_eq!(cluster.id, "lkc-1");
        assert_eq!(cluster.api_endpoint, "");
        assert_eq!(cluster.durability, "");
        assert_eq!(cluster.storage, 0);

        let user: User =
            serde_json::from_str(r#"{"id": 7, "first_name": null, "deactivated": null}"#).unwrap();
        assert_eq!(user.first_name, "");
        assert!(!user.deactivated);

        let key: ApiKey = serde_json::from_str(
            r#"{"id": 3, "key": "ABC", "description": null, "logical_clusters": null}"#,
        )
        .unwrap();
        assert_eq!(key.description, "");
        assert!(key.cluster_ids().is_empty());
    }

    #[test]
    fn test_readiness_from_status() {
        assert_eq!(Readiness::from_status("up"), Readiness::Ready);
        assert_eq!(Readiness::from_status("PROVISIONING"), Readiness::Provisioning);
        assert_eq!(Readiness::from_status(""), Readiness::Provisioning);
    }

    #[test]
    fn test_writable_skips_read_only() {
        let mut configs = TopicConfigs::new().set("retention.ms", "1000");
        configs.insert(
            "segment.bytes",
            ConfigValue {
                value: "1073741824".to_string(),
                read_only: true,
                sensitive: false,
            },
        );

        let writable: Vec<_> = configs.writable().collect();
        assert_eq!(writable, vec![("retention.ms", "1000")]);
        assert_eq!(configs.len(), 2);
    }

    #[test]
    fn test_api_key_accepts_capitalised_id() {
        let key: ApiKey =
            serde_json::from_str(r#"{"Id": 42, "key": "ABC", "secret": ""}"#).unwrap();
        assert_eq!(key.id, 42);
        assert_eq!(key.secret(), None);
    }
}
