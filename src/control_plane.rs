//! Control-Plane Client
//!
//! Cluster and API key management against the account-level API.
//! Reads authenticate with the session cookie and are sent once;
//! mutations authenticate with the bearer token and go through the
//! default [`RetryPolicy`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::retry::{RetryConfig, RetryPolicy};
use crate::session::{Credentials, SessionManager};
use crate::transport::{dispatch, Auth, CallContext, HttpRequest, HttpResponse, HttpTransport};
use crate::types::{ApiKey, Cluster, LogicalCluster};

const NETWORK_INGRESS: i64 = 100;
const NETWORK_EGRESS: i64 = 100;
const STORAGE: i64 = 5000;

/// Parameters for a new cluster
#[derive(Debug, Clone)]
pub struct NewCluster<'a> {
    pub name: &'a str,
    pub durability: &'a str,
    pub region: &'a str,
    pub service_provider: &'a str,
}

// ============================================================
// API Request/Response Types
// ============================================================

#[derive(Debug, Deserialize)]
struct ClusterList {
    #[serde(default)]
    clusters: Vec<Cluster>,
}

#[derive(Debug, Deserialize)]
struct ClusterResponse {
    cluster: Cluster,
}

#[derive(Debug, Serialize)]
struct CreateClusterRequest<'a> {
    config: CreateClusterConfig<'a>,
}

#[derive(Debug, Serialize)]
struct CreateClusterConfig<'a> {
    name: &'a str,
    account_id: &'a str,
    network_ingress: i64,
    network_egress: i64,
    storage: i64,
    durability: &'a str,
    region: &'a str,
    service_provider: &'a str,
}

#[derive(Debug, Serialize)]
struct ClusterEnvelope<'a> {
    cluster: ClusterRecord<'a>,
}

#[derive(Debug, Serialize)]
struct ClusterRecord<'a> {
    id: &'a str,
    name: &'a str,
    account_id: &'a str,
    network_ingress: i64,
    network_egress: i64,
    storage: i64,
    durability: &'a str,
    region: &'a str,
    service_provider: &'a str,
    organization_id: i64,
}

impl<'a> ClusterRecord<'a> {
    fn from_cluster(cluster: &'a Cluster, name: &'a str) -> Self {
        Self {
            id: &cluster.id,
            name,
            account_id: &cluster.account_id,
            network_ingress: cluster.network_ingress,
            network_egress: cluster.network_egress,
            storage: cluster.storage,
            durability: &cluster.durability,
            region: &cluster.region,
            service_provider: &cluster.service_provider,
            organization_id: cluster.organization_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiKeyList {
    #[serde(default)]
    api_keys: Vec<ApiKey>,
}

#[derive(Debug, Deserialize)]
struct ApiKeyResponse {
    api_key: ApiKey,
}

#[derive(Debug, Serialize)]
struct ApiKeyEnvelope<'a> {
    api_key: ApiKeyRecord<'a>,
}

#[derive(Debug, Serialize)]
struct ApiKeyRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    account_id: &'a str,
    logical_clusters: Vec<LogicalCluster>,
}

impl<'a> ApiKeyRecord<'a> {
    fn for_cluster(cluster: &'a Cluster, id: Option<u64>) -> Self {
        Self {
            id,
            account_id: &cluster.account_id,
            logical_clusters: vec![LogicalCluster {
                id: cluster.id.clone(),
            }],
        }
    }
}

// ============================================================
// Client Implementation
// ============================================================

pub struct ControlPlaneClient {
    session: Arc<SessionManager>,
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
}

impl ControlPlaneClient {
    pub fn new(session: Arc<SessionManager>, retry: RetryConfig) -> Self {
        let transport = session.transport();
        Self {
            session,
            transport,
            retry: RetryPolicy::new(retry),
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.session.api_endpoint(), path)
    }

    /// Session-cookie GET, single attempt, 200 expected
    async fn read(
        &self,
        ctx: &CallContext,
        credentials: &Credentials,
        url: String,
        operation: &str,
    ) -> Result<HttpResponse> {
        let request = HttpRequest::get(url).with_auth(Auth::Session(credentials.session.clone()));
        dispatch(self.transport.as_ref(), ctx, request)
            .await?
            .expect_status(200, operation)
    }

    /// Bearer-token mutation with retries, 200 expected
    async fn mutate(
        &self,
        ctx: &CallContext,
        credentials: &Credentials,
        request: HttpRequest,
        operation: &str,
    ) -> Result<HttpResponse> {
        let request = request.with_auth(Auth::Bearer(credentials.access_token.clone()));
        self.retry
            .execute(self.transport.as_ref(), ctx, operation, request)
            .await?
            .expect_status(200, operation)
    }

    // ------------------------------------------------------------
    // Clusters
    // ------------------------------------------------------------

    /// List clusters of an account (primary account when `None`)
    pub async fn list_clusters(
        &self,
        ctx: &CallContext,
        account_id: Option<&str>,
    ) -> Result<Vec<Cluster>> {
        let credentials = self.session.ensure_ready(ctx).await?;
        let account_id = credentials.identity.account(account_id)?.id.as_str();

        let url = self.url(&format!(
            "/api/clusters?account_id={}",
            urlencoding::encode(account_id)
        ));
        let list: ClusterList = self
            .read(ctx, &credentials, url, "listing clusters")
            .await?
            .json("cluster list")?;

        debug!(account_id = %account_id, count = list.clusters.len(), "Listed clusters");
        Ok(list.clusters)
    }

    /// Find a cluster by id; `None` when the account has no such cluster
    pub async fn get_cluster(
        &self,
        ctx: &CallContext,
        account_id: Option<&str>,
        cluster_id: &str,
    ) -> Result<Option<Cluster>> {
        let clusters = self.list_clusters(ctx, account_id).await?;
        Ok(clusters.into_iter().find(|c| c.id == cluster_id))
    }

    /// Find a cluster by name; `None` when the account has no such cluster
    pub async fn get_cluster_by_name(
        &self,
        ctx: &CallContext,
        account_id: Option<&str>,
        name: &str,
    ) -> Result<Option<Cluster>> {
        let clusters = self.list_clusters(ctx, account_id).await?;
        Ok(clusters.into_iter().find(|c| c.name == name))
    }

    pub async fn create_cluster(
        &self,
        ctx: &CallContext,
        account_id: Option<&str>,
        params: &NewCluster<'_>,
    ) -> Result<Cluster> {
        let credentials = self.session.ensure_ready(ctx).await?;
        let account_id = credentials.identity.account(account_id)?.id.as_str();

        let request = HttpRequest::post(self.url("/api/clusters")).with_json(&CreateClusterRequest {
            config: CreateClusterConfig {
                name: params.name,
                account_id,
                network_ingress: NETWORK_INGRESS,
                network_egress: NETWORK_EGRESS,
                storage: STORAGE,
                durability: params.durability,
                region: params.region,
                service_provider: params.service_provider,
            },
        })?;

        let created: ClusterResponse = self
            .mutate(ctx, &credentials, request, "creating cluster")
            .await?
            .json("create cluster response")?;

        info!(
            cluster_id = %created.cluster.id,
            name = %created.cluster.name,
            status = %created.cluster.status,
            "Cluster created"
        );
        Ok(created.cluster)
    }

    /// Rename a cluster; the name is its only mutable attribute
    pub async fn update_cluster(
        &self,
        ctx: &CallContext,
        cluster: &Cluster,
        new_name: &str,
    ) -> Result<Cluster> {
        let credentials = self.session.ensure_ready(ctx).await?;

        let url = self.url(&format!("/api/clusters/{}", urlencoding::encode(&cluster.id)));
        let request = HttpRequest::put(url).with_json(&ClusterEnvelope {
            cluster: ClusterRecord::from_cluster(cluster, new_name),
        })?;

        let updated: ClusterResponse = self
            .mutate(ctx, &credentials, request, "updating cluster")
            .await?
            .json("update cluster response")?;

        info!(cluster_id = %cluster.id, from = %cluster.name, to = %new_name, "Cluster renamed");
        Ok(updated.cluster)
    }

    pub async fn delete_cluster(&self, ctx: &CallContext, cluster: &Cluster) -> Result<()> {
        let credentials = self.session.ensure_ready(ctx).await?;

        let url = self.url(&format!("/api/clusters/{}", urlencoding::encode(&cluster.id)));
        let request = HttpRequest::delete(url).with_json(&ClusterEnvelope {
            cluster: ClusterRecord::from_cluster(cluster, &cluster.name),
        })?;

        self.mutate(ctx, &credentials, request, "deleting cluster")
            .await?;

        info!(cluster_id = %cluster.id, "Cluster deleted");
        Ok(())
    }

    // ------------------------------------------------------------
    // API keys
    // ------------------------------------------------------------

    pub async fn list_api_keys(&self, ctx: &CallContext, cluster: &Cluster) -> Result<Vec<ApiKey>> {
        let credentials = self.session.ensure_ready(ctx).await?;

        let url = self.url(&format!(
            "/api/api_keys?account_id={}&cluster_id={}",
            urlencoding::encode(&cluster.account_id),
            urlencoding::encode(&cluster.id)
        ));
        let list: ApiKeyList = self
            .read(ctx, &credentials, url, "listing API keys")
            .await?
            .json("API key list")?;

        debug!(cluster_id = %cluster.id, count = list.api_keys.len(), "Listed API keys");
        Ok(list.api_keys)
    }

    /// Find an API key by id; the secret is never part of the result
    pub async fn get_api_key(
        &self,
        ctx: &CallContext,
        cluster: &Cluster,
        key_id: u64,
    ) -> Result<Option<ApiKey>> {
        let keys = self.list_api_keys(ctx, cluster).await?;
        let found = keys.into_iter().find(|k| k.id == key_id).map(|mut key| {
            key.secret = None;
            key
        });

        if found.is_none() {
            debug!(cluster_id = %cluster.id, key_id, "API key not found");
        }
        Ok(found)
    }

    /// Create an API key; the returned value is the only one carrying the secret
    pub async fn create_api_key(&self, ctx: &CallContext, cluster: &Cluster) -> Result<ApiKey> {
        let credentials = self.session.ensure_ready(ctx).await?;

        let request = HttpRequest::post(self.url("/api/api_keys")).with_json(&ApiKeyEnvelope {
            api_key: ApiKeyRecord::for_cluster(cluster, None),
        })?;

        let created: ApiKeyResponse = self
            .mutate(ctx, &credentials, request, "creating API key")
            .await?
            .json("create API key response")?;

        info!(cluster_id = %cluster.id, key_id = created.api_key.id, "API key created");
        Ok(created.api_key)
    }

    pub async fn delete_api_key(
        &self,
        ctx: &CallContext,
        cluster: &Cluster,
        key_id: u64,
    ) -> Result<()> {
        let credentials = self.session.ensure_ready(ctx).await?;

        let url = self.url(&format!("/api/api_keys/{key_id}"));
        let request = HttpRequest::delete(url).with_json(&ApiKeyEnvelope {
            api_key: ApiKeyRecord::for_cluster(cluster, Some(key_id)),
        })?;

        self.mutate(ctx, &credentials, request, "deleting API key")
            .await?;

        info!(cluster_id = %cluster.id, key_id, "API key deleted");
        Ok(())
    }
}
