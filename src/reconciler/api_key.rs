//! API key reconciler
//!
//! Key: the server-assigned integer id. Keys are immutable; the secret is
//! only returned by the create call, so `read` carries the recorded secret
//! forward instead of losing it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{Attributes, ReadOutcome, Reconciler};
use crate::control_plane::ControlPlaneClient;
use crate::error::{Error, Result};
use crate::transport::CallContext;
use crate::types::{ApiKey, Cluster};

pub struct ApiKeyReconciler {
    control: Arc<ControlPlaneClient>,
}

fn key_id(attrs: &Attributes) -> Result<u64> {
    let id = attrs
        .opt_int("id")?
        .ok_or_else(|| Error::invalid_attribute("id", "is required"))?;
    u64::try_from(id).map_err(|_| Error::invalid_attribute("id", "must not be negative"))
}

fn api_key_attributes(cluster: &Cluster, key: &ApiKey, secret: Option<&str>) -> Attributes {
    let mut attrs = Attributes::new()
        .with("id", key.id.to_string())
        .with("account_id", cluster.account_id.as_str())
        .with("cluster_id", cluster.id.as_str())
        .with("key", key.key.as_str())
        .with("created", key.created.as_str())
        .with("modified", key.modified.as_str());
    if let Some(secret) = secret {
        attrs.set("secret", secret);
    }
    attrs
}

impl ApiKeyReconciler {
    pub fn new(control: Arc<ControlPlaneClient>) -> Self {
        Self { control }
    }

    async fn cluster(&self, ctx: &CallContext, attrs: &Attributes) -> Result<Option<Cluster>> {
        let account_id = attrs.opt_str("account_id")?;
        let cluster_id = attrs.str("cluster_id")?;
        self.control.get_cluster(ctx, account_id, cluster_id).await
    }
}

#[async_trait]
impl Reconciler for ApiKeyReconciler {
    fn kind(&self) -> &'static str {
        "api key"
    }

    async fn create(&self, ctx: &CallContext, desired: &Attributes) -> Result<Attributes> {
        let cluster = self
            .cluster(ctx, desired)
            .await?
            .ok_or_else(|| Error::not_found("cluster", desired.str("cluster_id").unwrap_or_default()))?;

        let key = self.control.create_api_key(ctx, &cluster).await?;
        Ok(api_key_attributes(&cluster, &key, key.secret()))
    }

    async fn read(
        &self,
        ctx: &CallContext,
        current: &Attributes,
    ) -> Result<ReadOutcome<Attributes>> {
        let id = key_id(current)?;
        let Some(cluster) = self.cluster(ctx, current).await? else {
            return Ok(ReadOutcome::Absent);
        };

        let key = self.control.get_api_key(ctx, &cluster, id).await?;
        let secret = current.opt_str("secret")?;
        Ok(ReadOutcome::from(
            key.map(|k| api_key_attributes(&cluster, &k, secret)),
        ))
    }

    async fn delete(&self, ctx: &CallContext, current: &Attributes) -> Result<()> {
        let id = key_id(current)?;
        let Some(cluster) = self.cluster(ctx, current).await? else {
            info!(key_id = id, "Cluster already gone, nothing to delete");
            return Ok(());
        };

        match self.control.delete_api_key(ctx, &cluster, id).await {
            Err(e) if e.status_code() == Some(404) => {
                info!(cluster_id = %cluster.id, key_id = id, "API key already gone");
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

    fn reconciler(transport: &Arc<FakeTransport>) -> ApiKeyReconciler {
        mock_login(transport);
        transport.on(
            Method::GET,
            "/api/clusters",
            Reply::json(200, cluster_list_json(vec![cluster_json("lkc-1", "main")])),
        );
        let session = Arc::new(session_manager(transport));
        ApiKeyReconciler::new(Arc::new(ControlPlaneClient::new(session, fast_retry())))
    }

    fn script_key(transport: &FakeTransport) {
        transport.on(
            Method::POST,
            "/api/api_keys",
            Reply::json(
                200,
                json!({"api_key": {"id": 42, "key": "AK42", "secret": "s3cr3t",
                       "created": "2026-10-01T00:00:00Z", "logical_clusters": [{"id": "lkc-1"}]}}),
            ),
        );
        transport.on(
            Method::GET,
            "/api/api_keys",
            Reply::json(
                200,
                json!({"api_keys": [{"id": 42, "key": "AK42",
                        "created": "2026-10-01T00:00:00Z", "logical_clusters": [{"id": "lkc-1"}]}]}),
            ),
        );
    }

    #[tokio::test]
    async fn test_secret_survives_read() {
        let transport = Arc::new(FakeTransport::new());
        script_key(&transport);
        let keys = reconciler(&transport);
        let ctx = CallContext::new();

        let created = keys
            .create(&ctx, &Attributes::new().with("cluster_id", "lkc-1"))
            .await
            .unwrap();
        assert_eq!(created.str("secret").unwrap(), "s3cr3t");
        assert_eq!(created.str("id").unwrap(), "42");

        let read = keys.read(&ctx, &created).await.unwrap().present().unwrap();
        assert_eq!(read.str("key").unwrap(), "AK42");
        assert_eq!(read.str("secret").unwrap(), "s3cr3t");

        let without_secret = Attributes::new()
            .with("id", "42")
            .with("cluster_id", "lkc-1");
        let read = keys
            .read(&ctx, &without_secret)
            .await
            .unwrap()
            .present()
            .unwrap();
        assert!(!read.contains("secret"));
    }

    #[tokio::test]
    async fn test_read_missing_key_is_absent() {
        let transport = Arc::new(FakeTransport::new());
        transport.on(Method::GET, "/api/api_keys", Reply::json(200, json!({"api_keys": []})));
        let keys = reconciler(&transport);

        let current = Attributes::new()
            .with("id", 42i64)
            .with("cluster_id", "lkc-1");
        let outcome = keys.read(&CallContext::new(), &current).await.unwrap();
        assert!(outcome.is_absent());
    }

    #[tokio::test]
    async fn test_create_on_unknown_cluster_fails() {
        let transport = Arc::new(FakeTransport::new());
        let keys = reconciler(&transport);

        let err = keys
            .create(&CallContext::new(), &Attributes::new().with("cluster_id", "lkc-9"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_is_unsupported() {
        let transport = Arc::new(FakeTransport::new());
        let keys = reconciler(&transport);

        let current = Attributes::new().with("id", "42");
        let err = keys
            .update(&CallContext::new(), &current, &current)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let transport = Arc::new(FakeTransport::new());
        transport.on(Method::DELETE, "/api/api_keys/42", Reply::json(200, json!({})));
        let keys = reconciler(&transport);

        let current = Attributes::new()
            .with("id", "42")
            .with("cluster_id", "lkc-1");
        keys.delete(&CallContext::new(), &current).await.unwrap();

        assert_eq!(transport.count(Method::DELETE, "/api/api_keys/42"), 1);
    }
}
