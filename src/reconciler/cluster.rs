//! Cluster reconciler
//!
//! Key: the server-assigned cluster id. `name` is the only attribute that
//! can change in place; provider, region, durability and account are fixed
//! at creation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{reject_change, Attributes, ReadOutcome, Reconciler};
use crate::control_plane::{ControlPlaneClient, NewCluster};
use crate::error::{Error, Result};
use crate::transport::CallContext;
use crate::types::{Cluster, Readiness};

pub const DEFAULT_DURABILITY: &str = "LOW";

const IMMUTABLE: [&str; 4] = ["account_id", "service_provider", "region", "durability"];

pub struct ClusterReconciler {
    control: Arc<ControlPlaneClient>,
}

impl ClusterReconciler {
    pub fn new(control: Arc<ControlPlaneClient>) -> Self {
        Self { control }
    }

    async fn find(&self, ctx: &CallContext, current: &Attributes) -> Result<Option<Cluster>> {
        let account_id = current.opt_str("account_id")?;
        let id = current.str("id")?;
        self.control.get_cluster(ctx, account_id, id).await
    }
}

/// Attributes recorded for a cluster, including the parsed endpoint
pub fn cluster_attributes(cluster: &Cluster) -> Attributes {
    let endpoint = cluster.endpoint_parts();

    Attributes::new()
        .with("id", cluster.id.as_str())
        .with("name", cluster.name.as_str())
        .with("account_id", cluster.account_id.as_str())
        .with("organization_id", cluster.organization_id)
        .with("service_provider", cluster.service_provider.as_str())
        .with("region", cluster.region.as_str())
        .with("durability", cluster.durability.as_str())
        .with("endpoint", cluster.endpoint.as_str())
        .with("api_endpoint", cluster.api_endpoint.as_str())
        .with("status", cluster.status.as_str())
        .with("ready", cluster.readiness() == Readiness::Ready)
        .with("host", endpoint.host)
        .with("port", i64::from(endpoint.port))
        .with("protocol", endpoint.protocol)
}

#[async_trait]
impl Reconciler for ClusterReconciler {
    fn kind(&self) -> &'static str {
        "cluster"
    }

    async fn create(&self, ctx: &CallContext, desired: &Attributes) -> Result<Attributes> {
        let params = NewCluster {
            name: desired.str("name")?,
            service_provider: desired.str("service_provider")?,
            region: desired.str("region")?,
            durability: desired.str_or("durability", DEFAULT_DURABILITY)?,
        };

        let cluster = self
            .control
            .create_cluster(ctx, desired.opt_str("account_id")?, &params)
            .await?;
        Ok(cluster_attributes(&cluster))
    }

    async fn read(
        &self,
        ctx: &CallContext,
        current: &Attributes,
    ) -> Result<ReadOutcome<Attributes>> {
        let found = self.find(ctx, current).await?;
        Ok(ReadOutcome::from(found.as_ref().map(cluster_attributes)))
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

        let cluster = self
            .find(ctx, current)
            .await?
            .ok_or_else(|| Error::not_found("cluster", current.str("id").unwrap_or_default()))?;

        let new_name = desired.str("name")?;
        if new_name == cluster.name {
            return Ok(cluster_attributes(&cluster));
        }

        let updated = self.control.update_cluster(ctx, &cluster, new_name).await?;
        Ok(cluster_attributes(&updated))
    }

    async fn delete(&self, ctx: &CallContext, current: &Attributes) -> Result<()> {
        match self.find(ctx, current).await? {
            Some(cluster) => self.control.delete_cluster(ctx, &cluster).await,
            None => {
                info!(id = %current.str("id")?, "Cluster already gone, nothing to delete");
                Ok(())
            }
        }
    }
}
