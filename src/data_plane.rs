//! Data-Plane Client
//!
//! Topic and topic-config management against a single cluster's own
//! `api_endpoint`. Every call carries the bearer token. One client is
//! built per cluster; nothing here is cached across clusters.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::session::SessionManager;
use crate::transport::{dispatch, Auth, CallContext, HttpRequest, HttpResponse, HttpTransport};
use crate::types::{Cluster, ConfigValue, Partition, Topic, TopicConfigs};

const REPLICATION_FACTOR: u32 = 3;

/// Configs accepted in the create request; the rest go in the follow-up update
const CREATE_TIME_CONFIGS: [&str; 5] = [
    "cleanup.policy",
    "delete.retention.ms",
    "max.message.bytes",
    "retention.bytes",
    "retention.ms",
];

// ============================================================
// API Request/Response Types
// ============================================================

#[derive(Debug, Deserialize)]
struct TopicRecord {
    name: String,
    #[serde(default)]
    internal: bool,
    #[serde(default)]
    partitions: Vec<Partition>,
}

#[derive(Debug, Deserialize)]
struct ConfigEntries {
    entries: Vec<ConfigEntry>,
}

/// One entry of `GET /topics/{name}/config`; all flags are required
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigEntry {
    name: String,
    value: Option<String>,
    is_read_only: bool,
    is_sensitive: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTopicRequest<'a> {
    name: &'a str,
    num_partitions: u32,
    replication_factor: u32,
    configs: BTreeMap<&'a str, &'a str>,
}

#[derive(Debug, Serialize)]
struct UpdateConfigRequest<'a> {
    entries: Vec<ConfigUpdate<'a>>,
}

#[derive(Debug, Serialize)]
struct ConfigUpdate<'a> {
    name: &'a str,
    value: &'a str,
}

// ============================================================
// Client Implementation
// ============================================================

pub struct DataPlaneClient {
    base_url: String,
    cluster_id: String,
    session: Arc<SessionManager>,
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
    create_retry: RetryPolicy,
}

impl DataPlaneClient {
    /// Build a client addressing `cluster`'s data-plane API.
    ///
    /// Fails with `Config` when the cluster has no `api_endpoint` yet.
    pub fn for_cluster(
        cluster: &Cluster,
        session: Arc<SessionManager>,
        retry: RetryConfig,
    ) -> Result<Self> {
        let endpoint = cluster.api_endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(Error::config(format!(
                "cluster {} has no api_endpoint",
                cluster.id
            )));
        }

        let transport = session.transport();
        Ok(Self {
            base_url: format!("{}/2.0/kafka/{}", endpoint, cluster.id),
            cluster_id: cluster.id.clone(),
            session,
            transport,
            retry: RetryPolicy::new(retry.clone()),
            create_retry: RetryPolicy::create_topic(retry),
        })
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    fn topic_url(&self, name: &str, suffix: &str) -> String {
        format!("{}/topics/{}{}", self.base_url, urlencoding::encode(name), suffix)
    }

    async fn bearer(&self, ctx: &CallContext) -> Result<Auth> {
        let credentials = self.session.ensure_ready(ctx).await?;
        Ok(Auth::Bearer(credentials.access_token))
    }

    async fn read(&self, ctx: &CallContext, url: String, operation: &str) -> Result<HttpResponse> {
        let request = HttpRequest::get(url).with_auth(self.bearer(ctx).await?);
        dispatch(self.transport.as_ref(), ctx, request)
            .await?
            .expect_status(200, operation)
    }

    pub async fn list_topics(&self, ctx: &CallContext) -> Result<Vec<Topic>> {
        let url = format!("{}/topics", self.base_url);
        let records: Vec<TopicRecord> = self
            .read(ctx, url, "listing topics")
            .await?
            .json("topic list")?;

        debug!(cluster_id = %self.cluster_id, count = records.len(), "Listed topics");
        Ok(records
            .into_iter()
            .map(|r| Topic {
                name: r.name,
                internal: r.internal,
                partitions: r.partitions,
                configs: TopicConfigs::new(),
            })
            .collect())
    }

    /// Fetch a topic and its configuration; `None` when it does not exist
    pub async fn get_topic(&self, ctx: &CallContext, name: &str) -> Result<Option<Topic>> {
        let Some(mut topic) = self
            .list_topics(ctx)
            .await?
            .into_iter()
            .find(|t| t.name == name)
        else {
            debug!(cluster_id = %self.cluster_id, topic = %name, "Topic not found");
            return Ok(None);
        };

        match self.topic_configs(ctx, name).await {
            Ok(configs) => topic.configs = configs,
            Err(e) if e.status_code() == Some(404) => {
                debug!(cluster_id = %self.cluster_id, topic = %name, "Topic deleted during read");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
        Ok(Some(topic))
    }

    async fn topic_configs(&self, ctx: &CallContext, name: &str) -> Result<TopicConfigs> {
        let url = self.topic_url(name, "/config");
        let entries: ConfigEntries = self
            .read(ctx, url, "reading topic config")
            .await?
            .json("topic config entries")?;

        let mut configs = TopicConfigs::new();
        for entry in entries.entries {
            configs.insert(
                entry.name,
                ConfigValue {
                    value: entry.value.unwrap_or_default(),
                    read_only: entry.is_read_only,
                    sensitive: entry.is_sensitive,
                },
            );
        }
        Ok(configs)
    }

    /// Create a topic, then apply its configuration.
    ///
    /// The two steps are not atomic. If the config update fails the topic
    /// stays behind with server defaults and only that error is returned;
    /// the next read shows the drift.
    pub async fn create_topic(
        &self,
        ctx: &CallContext,
        name: &str,
        partitions: u32,
        configs: &TopicConfigs,
    ) -> Result<()> {
        let request = HttpRequest::put(format!("{}/topics?validate=false", self.base_url))
            .with_auth(self.bearer(ctx).await?)
            .with_json(&CreateTopicRequest {
                name,
                num_partitions: partitions,
                replication_factor: REPLICATION_FACTOR,
                configs: configs
                    .writable()
                    .filter(|(key, _)| CREATE_TIME_CONFIGS.contains(key))
                    .collect(),
            })?;

        self.create_retry
            .execute(self.transport.as_ref(), ctx, "creating topic", request)
            .await?
            .expect_status(204, "creating topic")?;

        info!(cluster_id = %self.cluster_id, topic = %name, partitions, "Topic created");

        if let Err(e) = self.update_topic_config(ctx, name, configs).await {
            warn!(
                cluster_id = %self.cluster_id,
                topic = %name,
                error = %e,
                "Topic created but its configuration was not applied"
            );
            return Err(e);
        }
        Ok(())
    }

    /// Write the non-read-only entries of `configs`
    pub async fn update_topic_config(
        &self,
        ctx: &CallContext,
        name: &str,
        configs: &TopicConfigs,
    ) -> Result<()> {
        let entries: Vec<ConfigUpdate<'_>> = configs
            .writable()
            .map(|(name, value)| ConfigUpdate { name, value })
            .collect();
        let count = entries.len();

        let request = HttpRequest::put(self.topic_url(name, "/config"))
            .with_auth(self.bearer(ctx).await?)
            .with_json(&UpdateConfigRequest { entries })?;

        self.retry
            .execute(self.transport.as_ref(), ctx, "updating topic config", request)
            .await?
            .expect_status(204, "updating topic config")?;

        info!(cluster_id = %self.cluster_id, topic = %name, entries = count, "Topic config updated");
        Ok(())
    }

    pub async fn delete_topic(&self, ctx: &CallContext, name: &str) -> Result<()> {
        let request = HttpRequest::delete(self.topic_url(name, "")).with_auth(self.bearer(ctx).await?);

        self.retry
            .execute(self.transport.as_ref(), ctx, "deleting topic", request)
            .await?
            .expect_status(204, "deleting topic")?;

        info!(cluster_id = %self.cluster_id, topic = %name, "Topic deleted");
        Ok(())
    }
}
