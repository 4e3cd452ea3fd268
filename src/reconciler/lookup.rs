//! Read-only lookups of existing accounts and clusters

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::cluster::cluster_attributes;
use super::{Attributes, ReadOutcome};
use crate::control_plane::ControlPlaneClient;
use crate::error::Result;
use crate::session::SessionManager;
use crate::transport::CallContext;
use crate::types::Account;

#[async_trait]
pub trait Lookup: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn lookup(&self, ctx: &CallContext, query: &Attributes)
        -> Result<ReadOutcome<Attributes>>;
}

/// Account by `name`, or the primary account when no name is given
pub struct AccountLookup {
    session: Arc<SessionManager>,
}

impl AccountLookup {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }
}

fn account_attributes(account: &Account) -> Attributes {
    Attributes::new()
        .with("id", account.id.as_str())
        .with("name", account.name.as_str())
        .with("organization_id", account.organization_id)
        .with("deactivated", account.deactivated)
        .with("created", account.created.as_str())
        .with("modified", account.modified.as_str())
        .with("internal", account.internal)
}

#[async_trait]
impl Lookup for AccountLookup {
    fn kind(&self) -> &'static str {
        "account"
    }

    async fn lookup(
        &self,
        ctx: &CallContext,
        query: &Attributes,
    ) -> Result<ReadOutcome<Attributes>> {
        let credentials = self.session.ensure_ready(ctx).await?;
        let identity = &credentials.identity;

        let account = match query.opt_str("name")? {
            None => Some(identity.primary_account()),
            Some(name) => identity.account_by_name(name),
        };

        if account.is_none() {
            debug!(name = ?query.opt_str("name")?, "No matching account");
        }
        Ok(ReadOutcome::from(account.map(account_attributes)))
    }
}

/// Cluster by `name` within an optional `account_id`
pub struct ClusterLookup {
    control: Arc<ControlPlaneClient>,
}

impl ClusterLookup {
    pub fn new(control: Arc<ControlPlaneClient>) -> Self {
        Self { control }
    }
}

#[async_trait]
impl Lookup for ClusterLookup {
    fn kind(&self) -> &'static str {
        "cluster"
    }

    async fn lookup(
        &self,
        ctx: &CallContext,
        query: &Attributes,
    ) -> Result<ReadOutcome<Attributes>> {
        let name = query.str("name")?;
        let account_id = query.opt_str("account_id")?;

        let cluster = self
            .control
            .get_cluster_by_name(ctx, account_id, name)
            .await?;
        if cluster.is_none() {
            debug!(name = %name, account_id = ?account_id, "No matching cluster");
        }
        Ok(ReadOutcome::from(cluster.as_ref().map(cluster_attributes)))
    }
}
