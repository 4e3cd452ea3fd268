//! Provider facade
//!
//! Owns the session and control-plane client and dispatches CRUD calls to
//! the reconciler for each resource kind. Every operation walks the
//! resource's [`LifecycleState`] and logs each transition.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::lookup::Lookup;
use super::{
    readiness_of, AccountLookup, ApiKeyReconciler, Attributes, ClusterLookup, ClusterReconciler,
    LifecycleState, ReadOutcome, Reconciler, TopicReconciler,
};
use crate::config::ProviderConfig;
use crate::control_plane::ControlPlaneClient;
use crate::data_plane::DataPlaneClient;
use crate::error::Result;
use crate::retry::RetryConfig;
use crate::session::SessionManager;
use crate::transport::{CallContext, HttpTransport, ReqwestTransport};
use crate::types::Cluster;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Cluster,
    Topic,
    ApiKey,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Cluster => write!(f, "cluster"),
            ResourceKind::Topic => write!(f, "topic"),
            ResourceKind::ApiKey => write!(f, "api_key"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceKind {
    Account,
    Cluster,
}

/// Attributes after an operation, with the state the resource ended in
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub attributes: Attributes,
    pub state: LifecycleState,
}

pub struct Provider {
    session: Arc<SessionManager>,
    control: Arc<ControlPlaneClient>,
    retry: RetryConfig,
    clusters: ClusterReconciler,
    topics: TopicReconciler,
    api_keys: ApiKeyReconciler,
    account_lookup: AccountLookup,
    cluster_lookup: ClusterLookup,
}

fn step(kind: ResourceKind, from: LifecycleState, to: LifecycleState) -> Result<LifecycleState> {
    let next = from.transition(to)?;
    debug!(resource = %kind, from = %from, to = %next, "Lifecycle transition");
    Ok(next)
}

impl Provider {
    /// Build a provider talking to the real API
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(ReqwestTransport::new(config.request_timeout)?);
        Ok(Self::with_transport(&config, transport))
    }

    pub fn with_transport(config: &ProviderConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let session = Arc::new(SessionManager::new(config, transport));
        let control = Arc::new(ControlPlaneClient::new(
            Arc::clone(&session),
            config.retry.clone(),
        ));

        Self {
            clusters: ClusterReconciler::new(Arc::clone(&control)),
            topics: TopicReconciler::new(Arc::clone(&control), config.retry.clone()),
            api_keys: ApiKeyReconciler::new(Arc::clone(&control)),
            account_lookup: AccountLookup::new(Arc::clone(&session)),
            cluster_lookup: ClusterLookup::new(Arc::clone(&control)),
            retry: config.retry.clone(),
            session,
            control,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn control_plane(&self) -> &Arc<ControlPlaneClient> {
        &self.control
    }

    /// Data-plane client for one cluster
    pub fn data_plane(&self, cluster: &Cluster) -> Result<DataPlaneClient> {
        DataPlaneClient::for_cluster(cluster, Arc::clone(&self.session), self.retry.clone())
    }

    fn reconciler(&self, kind: ResourceKind) -> &dyn Reconciler {
        match kind {
            ResourceKind::Cluster => &self.clusters,
            ResourceKind::Topic => &self.topics,
            ResourceKind::ApiKey => &self.api_keys,
        }
    }

    pub async fn create(
        &self,
        ctx: &CallContext,
        kind: ResourceKind,
        desired: &Attributes,
    ) -> Result<Applied> {
        let state = step(kind, LifecycleState::NonExistent, LifecycleState::Creating)?;

        match self.reconciler(kind).create(ctx, desired).await {
            Ok(attributes) => {
                let state = step(kind, state, LifecycleState::Existing(readiness_of(&attributes)))?;
                info!(resource = %kind, state = %state, "✅ Created");
                Ok(Applied { attributes, state })
            }
            Err(e) => {
                step(kind, state, LifecycleState::NonExistent)?;
                warn!(resource = %kind, error = %e, "Create failed");
                Err(e)
            }
        }
    }

    /// Refresh recorded attributes. A resource that cannot be found,
    /// including one whose lookup reports `NotFound`, is `Absent`.
    pub async fn read(
        &self,
        ctx: &CallContext,
        kind: ResourceKind,
        current: &Attributes,
    ) -> Result<ReadOutcome<Applied>> {
        let prior = LifecycleState::Existing(readiness_of(current));

        let outcome = match self.reconciler(kind).read(ctx, current).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_not_found() => ReadOutcome::Absent,
            Err(e) => return Err(e),
        };

        match outcome {
            ReadOutcome::Present(attributes) => {
                let state = step(kind, prior, LifecycleState::Existing(readiness_of(&attributes)))?;
                Ok(ReadOutcome::Present(Applied { attributes, state }))
            }
            ReadOutcome::Absent => {
                step(kind, prior, LifecycleState::NonExistent)?;
                info!(resource = %kind, "Resource no longer exists remotely");
                Ok(ReadOutcome::Absent)
            }
        }
    }

    pub async fn update(
        &self,
        ctx: &CallContext,
        kind: ResourceKind,
        current: &Attributes,
        desired: &Attributes,
    ) -> Result<Applied> {
        let prior = LifecycleState::Existing(readiness_of(current));
        let state = step(kind, prior, LifecycleState::Updating)?;

        match self.reconciler(kind).update(ctx, current, desired).await {
            Ok(attributes) => {
                let state = step(kind, state, LifecycleState::Existing(readiness_of(&attributes)))?;
                info!(resource = %kind, state = %state, "✅ Updated");
                Ok(Applied { attributes, state })
            }
            Err(e) => {
                step(kind, state, prior)?;
                warn!(resource = %kind, error = %e, "Update failed");
                Err(e)
            }
        }
    }

    pub async fn delete(
        &self,
        ctx: &CallContext,
        kind: ResourceKind,
        current: &Attributes,
    ) -> Result<LifecycleState> {
        let prior = LifecycleState::Existing(readiness_of(current));
        let state = step(kind, prior, LifecycleState::Deleting)?;

        match self.reconciler(kind).delete(ctx, current).await {
            Ok(()) => {
                let state = step(kind, state, LifecycleState::NonExistent)?;
                info!(resource = %kind, "🗑️ Deleted");
                Ok(state)
            }
            Err(e) => {
                step(kind, state, prior)?;
                warn!(resource = %kind, error = %e, "Delete failed");
                Err(e)
            }
        }
    }

    pub async fn lookup(
        &self,
        ctx: &CallContext,
        kind: DataSourceKind,
        query: &Attributes,
    ) -> Result<ReadOutcome<Attributes>> {
        let source: &dyn Lookup = match kind {
            DataSourceKind::Account => &self.account_lookup,
            DataSourceKind::Cluster => &self.cluster_lookup,
        };
        debug!(data_source = source.kind(), "Lookup");
        source.lookup(ctx, query).await
    }
}
