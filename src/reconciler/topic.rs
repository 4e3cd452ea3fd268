//! Topic reconciler
//!
//! Key: `(account_id, cluster_id, name)`, recorded as the composite id
//! `{account}-{cluster}-{name}`. Name and partition count are fixed at
//! creation; config attributes update in place.
//!
//! Config attributes use underscores where the Kafka key uses dots
//! (`retention_ms` is `retention.ms`).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{reject_change, AttrValue, Attributes, ReadOutcome, Reconciler};
use crate::control_plane::ControlPlaneClient;
use crate::data_plane::DataPlaneClient;
use crate::error::{Error, Result};
use crate::retry::RetryConfig;
use crate::transport::CallContext;
use crate::types::{Cluster, Topic, TopicConfigs};

pub const DEFAULT_PARTITIONS: i64 = 3;

#[derive(Debug, Clone, Copy)]
enum ConfigDefault {
    Str(&'static str),
    Int(i64),
}

/// Config attributes managed on every topic, with their defaults
const CONFIG_ATTRIBUTES: [(&str, ConfigDefault); 10] = [
    ("cleanup_policy", ConfigDefault::Str("delete")),
    ("retention_ms", ConfigDefault::Int(604_800_000)),
    ("segment_bytes", ConfigDefault::Int(1_073_741_824)),
    ("max_message_bytes", ConfigDefault::Int(2_097_164)),
    ("min_compaction_lag_ms", ConfigDefault::Int(0)),
    ("message_timestamp_type", ConfigDefault::Str("CreateTime")),
    ("delete_retention_ms", ConfigDefault::Int(86_400_000)),
    ("retention_bytes", ConfigDefault::Int(-1)),
    ("segment_ms", ConfigDefault::Int(604_800_000)),
    ("message_timestamp_difference_max_ms", ConfigDefault::Str("9223372036854775807")),
];

const IMMUTABLE: [&str; 4] = ["account_id", "cluster_id", "name", "num_partitions"];

pub fn config_key(attribute: &str) -> String {
    attribute.replace('_', ".")
}

pub fn topic_id(account_id: &str, cluster_id: &str, name: &str) -> String {
    format!("{account_id}-{cluster_id}-{name}")
}

/// Desired config entries, defaults filled in
fn desired_configs(desired: &Attributes) -> Result<TopicConfigs> {
    let mut configs = TopicConfigs::new();
    for (attribute, default) in CONFIG_ATTRIBUTES {
        let value = match (desired.get(attribute), default) {
            (Some(AttrValue::Str(s)), _) if !s.is_empty() => s.clone(),
            (Some(AttrValue::Int(i)), _) => i.to_string(),
            (Some(AttrValue::Bool(_)), _) => {
                return Err(Error::invalid_attribute(attribute, "expected string or integer"))
            }
            (_, ConfigDefault::Str(s)) => s.to_string(),
            (_, ConfigDefault::Int(i)) => i.to_string(),
        };
        configs = configs.set(config_key(attribute), value);
    }
    Ok(configs)
}

/// Attributes recorded for a topic. Only known, writable entries are kept.
fn topic_attributes(
    cluster: &Cluster,
    name: &str,
    partitions: i64,
    configs: &TopicConfigs,
) -> Attributes {
    let mut attrs = Attributes::new()
        .with("id", topic_id(&cluster.account_id, &cluster.id, name))
        .with("account_id", cluster.account_id.as_str())
        .with("cluster_id", cluster.id.as_str())
        .with("cluster_name", cluster.name.as_str())
        .with("name", name)
        .with("num_partitions", partitions);

    for (attribute, default) in CONFIG_ATTRIBUTES {
        let Some(entry) = configs.get(&config_key(attribute)) else {
            continue;
        };
        if entry.read_only {
            continue;
        }
        match (default, entry.value.parse::<i64>()) {
            (ConfigDefault::Int(_), Ok(i)) => attrs.set(attribute, i),
            _ => attrs.set(attribute, entry.value.as_str()),
        }
    }
    attrs
}

pub struct TopicReconciler {
    control: Arc<ControlPlaneClient>,
    retry: RetryConfig,
}

impl TopicReconciler {
    pub fn new(control: Arc<ControlPlaneClient>, retry: RetryConfig) -> Self {
        Self { control, retry }
    }

    /// The owning cluster and a client for its data plane
    async fn cluster(
        &self,
        ctx: &CallContext,
        attrs: &Attributes,
    ) -> Result<Option<(Cluster, DataPlaneClient)>> {
        let account_id = attrs.opt_str("account_id")?;
        let cluster_id = attrs.str("cluster_id")?;

        let Some(cluster) = self.control.get_cluster(ctx, account_id, cluster_id).await? else {
            return Ok(None);
        };
        let client = DataPlaneClient::for_cluster(
            &cluster,
            Arc::clone(self.control.session()),
            self.retry.clone(),
        )?;
        Ok(Some((cluster, client)))
    }

    async fn require_cluster(
        &self,
        ctx: &CallContext,
        attrs: &Attributes,
    ) -> Result<(Cluster, DataPlaneClient)> {
        self.cluster(ctx, attrs)
            .await?
            .ok_or_else(|| Error::not_found("cluster", attrs.str("cluster_id").unwrap_or_default()))
    }
}

#[async_trait]
impl Reconciler for TopicReconciler {
    fn kind(&self) -> &'static str {
        "topic"
    }

    async fn create(&self, ctx: &CallContext, desired: &Attributes) -> Result<Attributes> {
        let name = desired.str("name")?;
        let partitions = desired.int_or("num_partitions", DEFAULT_PARTITIONS)?;
        let partition_count = u32::try_from(partitions)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| Error::invalid_attribute("num_partitions", "must be positive"))?;
        let configs = desired_configs(desired)?;

        let (cluster, data_plane) = self.require_cluster(ctx, desired).await?;
        data_plane
            .create_topic(ctx, name, partition_count, &configs)
            .await?;

        Ok(topic_attributes(&cluster, name, partitions, &configs))
    }

    async fn read(
        &self,
        ctx: &CallContext,
        current: &Attributes,
    ) -> Result<ReadOutcome<Attributes>> {
        let name = current.str("name")?;
        let Some((cluster, data_plane)) = self.cluster(ctx, current).await? else {
            return Ok(ReadOutcome::Absent);
        };

        let topic: Option<Topic> = data_plane.get_topic(ctx, name).await?;
        Ok(ReadOutcome::from(topic.map(|t| {
            topic_attributes(&cluster, &t.name, t.partition_count() as i64, &t.configs)
        })))
    }

    async fn update(
        &self,
        ctx: &CallContext,
        current: &Attributes,
        desired: &Attributes,
    ) -> Result<Attributes> {
        for name in IMMUTABLE {
            reject_change(self.kind(), current, desired, name)?;
        }

        let name = current.str("name")?;
        let (cluster, data_plane) = self.require_cluster(ctx, current).await?;
        let live = data_plane
            .get_topic(ctx, name)
            .await?
            .ok_or_else(|| Error::not_found("topic", name))?;

        let mut configs = desired_configs(desired)?;
        for (key, value) in live.configs.iter() {
            if value.read_only {
                configs.mark_read_only(key);
            }
        }

        data_plane.update_topic_config(ctx, name, &configs).await?;
        Ok(topic_attributes(
            &cluster,
            name,
            live.partition_count() as i64,
            &configs,
        ))
    }

    async fn delete(&self, ctx: &CallContext, current: &Attributes) -> Result<()> {
        let name = current.str("name")?;
        let Some((cluster, data_plane)) = self.cluster(ctx, current).await? else {
            info!(topic = %name, "Cluster already gone, nothing to delete");
            return Ok(());
        };

        match data_plane.delete_topic(ctx, name).await {
            Err(e) if e.status_code() == Some(404) => {
                info!(cluster_id = %cluster.id, topic = %name, "Topic already gone");
                Ok(())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        cluster_json, cluster_list_json, fast_retry, mock_login, session_manager, FakeTransport,
        Reply,
    };
    use reqwest::Method;
    use serde_json::json;

    const TOPICS: &str = "/2.0/kafka/lkc-1/topics";
    const ORDERS_CONFIG: &str = "/2.0/kafka/lkc-1/topics/orders/config";

    fn reconciler(transport: &Arc<FakeTransport>) -> TopicReconciler {
        mock_login(transport);
        transport.on(
            Method::GET,
            "/api/clusters",
            Reply::json(200, cluster_list_json(vec![cluster_json("lkc-1", "main")])),
        );
        let session = Arc::new(session_manager(transport));
        let control = Arc::new(ControlPlaneClient::new(session, fast_retry()));
        TopicReconciler::new(control, fast_retry())
    }

    fn live_topic(transport: &FakeTransport) {
        transport.on(
            Method::GET,
            TOPICS,
            Reply::json(200, json!([{"name": "orders", "partitions": [{"partition": 0}, {"partition": 1}]}])),
        );
        transport.on(
            Method::GET,
            ORDERS_CONFIG,
            Reply::json(
                200,
                json!({"entries": [
                    {"name": "cleanup.policy", "value": "compact", "isReadOnly": false, "isSensitive": false},
                    {"name": "retention.ms", "value": "3600000", "isReadOnly": false, "isSensitive": false},
                    {"name": "segment.bytes", "value": "1073741824", "isReadOnly": true, "isSensitive": false},
                    {"name": "flush.ms", "value": "1000", "isReadOnly": false, "isSensitive": false}
                ]}),
            ),
        );
    }

    fn key() -> Attributes {
        Attributes::new()
            .with("cluster_id", "lkc-1")
            .with("name", "orders")
    }

    #[test]
    fn test_attribute_to_config_key() {
        assert_eq!(config_key("retention_ms"), "retention.ms");
        assert_eq!(
            config_key("message_timestamp_difference_max_ms"),
            "message.timestamp.difference.max.ms"
        );
        assert_eq!(topic_id("a-1", "lkc-1", "orders"), "a-1-lkc-1-orders");
    }

    #[test]
    fn test_desired_configs_fill_defaults() {
        let desired = Attributes::new()
            .with("retention_ms", 3_600_000i64)
            .with("cleanup_policy", "compact");
        let configs = desired_configs(&desired).unwrap();

        assert_eq!(configs.len(), 10);
        assert_eq!(configs.value("retention.ms"), Some("3600000"));
        assert_eq!(configs.value("cleanup.policy"), Some("compact"));
        assert_eq!(configs.value("retention.bytes"), Some("-1"));
        assert_eq!(configs.value("message.timestamp.type"), Some("CreateTime"));
    }

    #[tokio::test]
    async fn test_create_sends_configs_in_both_phases() {
        let transport = Arc::new(FakeTransport::new());
        transport.on(Method::PUT, TOPICS, Reply::status(204));
        transport.on(Method::PUT, ORDERS_CONFIG, Reply::status(204));
        let topics = reconciler(&transport);

        let attrs = topics
            .create(&CallContext::new(), &key().with("retention_ms", 3_600_000i64))
            .await
            .unwrap();

        assert_eq!(attrs.str("id").unwrap(), "a-primary-lkc-1-orders");
        assert_eq!(attrs.str("cluster_name").unwrap(), "main");
        assert_eq!(attrs.get("num_partitions"), Some(&AttrValue::Int(3)));
        assert_eq!(attrs.get("retention_ms"), Some(&AttrValue::Int(3_600_000)));

        let create = transport.last_body(Method::PUT, TOPICS).unwrap();
        assert_eq!(create["numPartitions"], 3);
        assert_eq!(create["configs"]["retention.ms"], "3600000");

        let update = transport.last_body(Method::PUT, ORDERS_CONFIG).unwrap();
        assert_eq!(update["entries"].as_array().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_failed_config_phase_shows_defaults_on_next_read() {
        let transport = Arc::new(FakeTransport::new());
        transport.on(Method::PUT, TOPICS, Reply::status(204));
        transport.on(Method::PUT, ORDERS_CONFIG, Reply::status(422));
        transport.on(
            Method::GET,
            TOPICS,
            Reply::json(200, json!([{"name": "orders", "partitions": [{"partition": 0}]}])),
        );
        transport.on(
            Method::GET,
            ORDERS_CONFIG,
            Reply::json(
                200,
                json!({"entries": [
                    {"name": "retention.ms", "value": "604800000", "isReadOnly": false, "isSensitive": false}
                ]}),
            ),
        );
        let topics = reconciler(&transport);
        let ctx = CallContext::new();

        let err = topics
            .create(&ctx, &key().with("retention_ms", 3_600_000i64))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(422));
        assert_eq!(transport.count(Method::PUT, TOPICS), 1);
        assert_eq!(transport.count(Method::DELETE, "/2.0/kafka/lkc-1/topics/orders"), 0);

        let attrs = topics.read(&ctx, &key()).await.unwrap().present().unwrap();
        assert_eq!(attrs.get("num_partitions"), Some(&AttrValue::Int(1)));
        assert_eq!(attrs.get("retention_ms"), Some(&AttrValue::Int(604_800_000)));
    }

    #[tokio::test]
    async fn test_create_rejects_zero_partitions() {
        let transport = Arc::new(FakeTransport::new());
        let topics = reconciler(&transport);

        let err = topics
            .create(&CallContext::new(), &key().with("num_partitions", 0i64))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAttribute { .. }));
    }

    #[tokio::test]
    async fn test_read_keeps_known_writable_entries() {
        let transport = Arc::new(FakeTransport::new());
        live_topic(&transport);
        let topics = reconciler(&transport);

        let attrs = topics
            .read(&CallContext::new(), &key())
            .await
            .unwrap()
            .present()
            .unwrap();

        assert_eq!(attrs.get("num_partitions"), Some(&AttrValue::Int(2)));
        assert_eq!(attrs.str("cleanup_policy").unwrap(), "compact");
        assert_eq!(attrs.get("retention_ms"), Some(&AttrValue::Int(3_600_000)));
        assert!(!attrs.contains("segment_bytes"));
        assert!(!attrs.contains("flush_ms"));
    }

    #[tokio::test]
    async fn test_read_missing_topic_is_absent() {
        let transport = Arc::new(FakeTransport::new());
        transport.on(Method::GET, TOPICS, Reply::json(200, json!([])));
        let topics = reconciler(&transport);

        let outcome = topics.read(&CallContext::new(), &key()).await.unwrap();
        assert!(outcome.is_absent());
    }

    #[tokio::test]
    async fn test_read_with_missing_cluster_is_absent() {
        let transport = Arc::new(FakeTransport::new());
        let topics = reconciler(&transport);

        let current = key().with("cluster_id", "lkc-gone");
        let outcome = topics.read(&CallContext::new(), &current).await.unwrap();

        assert!(outcome.is_absent());
        assert_eq!(transport.count(Method::GET, TOPICS), 0);
    }

    #[tokio::test]
    async fn test_update_skips_entries_reported_read_only() {
        let transport = Arc::new(FakeTransport::new());
        live_topic(&transport);
        transport.on(Method::PUT, ORDERS_CONFIG, Reply::status(204));
        let topics = reconciler(&transport);

        let desired = key().with("retention_ms", 600_000i64);
        topics
            .update(&CallContext::new(), &key(), &desired)
            .await
            .unwrap();

        let body = transport.last_body(Method::PUT, ORDERS_CONFIG).unwrap();
        let names: Vec<&str> = body["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"retention.ms"));
        assert!(!names.contains(&"segment.bytes"));
        assert_eq!(names.len(), 9);
    }

    #[tokio::test]
    async fn test_rename_is_unsupported() {
        let transport = Arc::new(FakeTransport::new());
        let topics = reconciler(&transport);

        let desired = key().with("name", "orders-v2");
        let err = topics
            .update(&CallContext::new(), &key(), &desired)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_delete_of_missing_topic_is_noop() {
        let transport = Arc::new(FakeTransport::new());
        transport.on(Method::DELETE, "/2.0/kafka/lkc-1/topics/orders", Reply::status(404));
        let topics = reconciler(&transport);

        topics.delete(&CallContext::new(), &key()).await.unwrap();
    }
}
