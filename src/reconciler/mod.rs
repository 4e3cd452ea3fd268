//! Resource reconcilers
//!
//! Each remote resource kind is modelled as a [`Reconciler`] mapping a flat
//! attribute map (the orchestrator's view of desired or recorded state) to
//! control-plane and data-plane calls and back:
//! - `create` converges from nothing to the desired attributes
//! - `read` refreshes recorded attributes, or reports [`ReadOutcome::Absent`]
//! - `update` applies in-place changes where the resource allows them
//! - `delete` removes the remote resource

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::transport::CallContext;
use crate::types::Readiness;

pub mod api_key;
pub mod cluster;
pub mod lookup;
pub mod provider;
pub mod topic;

pub use api_key::ApiKeyReconciler;
pub use cluster::ClusterReconciler;
pub use lookup::{AccountLookup, ClusterLookup};
pub use provider::{Applied, DataSourceKind, Provider, ResourceKind};
pub use topic::TopicReconciler;

// ============================================================
// Attributes
// ============================================================

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl AttrValue {
    fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Str(_) => "string",
            AttrValue::Int(_) => "integer",
            AttrValue::Bool(_) => "boolean",
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => f.write_str(s),
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

/// Flat attribute map keyed by attribute name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, AttrValue>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Required string attribute
    pub fn str(&self, name: &str) -> Result<&str> {
        self.opt_str(name)?
            .ok_or_else(|| Error::invalid_attribute(name, "is required"))
    }

    /// Optional string attribute; an empty string counts as unset
    pub fn opt_str(&self, name: &str) -> Result<Option<&str>> {
        match self.0.get(name) {
            None => Ok(None),
            Some(AttrValue::Str(s)) if s.is_empty() => Ok(None),
            Some(AttrValue::Str(s)) => Ok(Some(s)),
            Some(other) => Err(mismatch(name, "string", other)),
        }
    }

    pub fn str_or<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str> {
        Ok(self.opt_str(name)?.unwrap_or(default))
    }

    /// Integer attribute; numeric strings are accepted
    pub fn opt_int(&self, name: &str) -> Result<Option<i64>> {
        match self.0.get(name) {
            None => Ok(None),
            Some(AttrValue::Int(i)) => Ok(Some(*i)),
            Some(AttrValue::Str(s)) if s.is_empty() => Ok(None),
            Some(AttrValue::Str(s)) => s
                .parse()
                .map(Some)
                .map_err(|_| Error::invalid_attribute(name, format!("'{s}' is not an integer"))),
            Some(other) => Err(mismatch(name, "integer", other)),
        }
    }

    pub fn int_or(&self, name: &str, default: i64) -> Result<i64> {
        Ok(self.opt_int(name)?.unwrap_or(default))
    }

    pub fn opt_bool(&self, name: &str) -> Result<Option<bool>> {
        match self.0.get(name) {
            None => Ok(None),
            Some(AttrValue::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(mismatch(name, "boolean", other)),
        }
    }
}

impl<K: Into<String>, V: Into<AttrValue>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

fn mismatch(name: &str, expected: &str, found: &AttrValue) -> Error {
    Error::invalid_attribute(
        name,
        format!("expected {expected}, found {}", found.type_name()),
    )
}

// ============================================================
// Reconciler contract
// ============================================================

/// Result of a `read`
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome<P> {
    Present(P),
    /// The remote resource no longer exists
    Absent,
}

impl<P> ReadOutcome<P> {
    pub fn is_absent(&self) -> bool {
        matches!(self, ReadOutcome::Absent)
    }

    pub fn present(self) -> Option<P> {
        match self {
            ReadOutcome::Present(p) => Some(p),
            ReadOutcome::Absent => None,
        }
    }

    pub fn map<Q>(self, f: impl FnOnce(P) -> Q) -> ReadOutcome<Q> {
        match self {
            ReadOutcome::Present(p) => ReadOutcome::Present(f(p)),
            ReadOutcome::Absent => ReadOutcome::Absent,
        }
    }
}

impl<P> From<Option<P>> for ReadOutcome<P> {
    fn from(value: Option<P>) -> Self {
        value.map_or(ReadOutcome::Absent, ReadOutcome::Present)
    }
}

/// CRUD mapping between attributes and one remote resource kind
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Resource type name, used in logs and errors
    fn kind(&self) -> &'static str;

    async fn create(&self, ctx: &CallContext, desired: &Attributes) -> Result<Attributes>;

    /// Refresh `current`. Must return `Absent`, not an error, when the
    /// remote resource cannot be found.
    async fn read(&self, ctx: &CallContext, current: &Attributes)
        -> Result<ReadOutcome<Attributes>>;

    async fn update(
        &self,
        _ctx: &CallContext,
        _current: &Attributes,
        _desired: &Attributes,
    ) -> Result<Attributes> {
        Err(Error::Unsupported(format!(
            "{} cannot be updated in place",
            self.kind()
        )))
    }

    async fn delete(&self, ctx: &CallContext, current: &Attributes) -> Result<()>;
}

/// Fail when `desired` changes an attribute that can only be set at creation
pub(crate) fn reject_change(
    kind: &str,
    current: &Attributes,
    desired: &Attributes,
    name: &str,
) -> Result<()> {
    match (current.get(name), desired.get(name)) {
        (Some(from), Some(to)) if from != to => Err(Error::Unsupported(format!(
            "changing {name} of a {kind} requires replacing it"
        ))),
        _ => Ok(()),
    }
}

// ============================================================
// Lifecycle
// ============================================================

/// Where a resource instance is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NonExistent,
    Creating,
    Existing(Readiness),
    Updating,
    Deleting,
}

impl LifecycleState {
    pub fn can_transition_to(&self, next: &LifecycleState) -> bool {
        use LifecycleState::*;

        matches!(
            (self, next),
            (NonExistent, Creating)
                | (NonExistent, Existing(_))
                | (Creating, Existing(_))
                | (Creating, NonExistent)
                | (Existing(_), Existing(_))
                | (Existing(_), Updating)
                | (Existing(_), Deleting)
                | (Existing(_), NonExistent)
                | (Updating, Existing(_))
                | (Deleting, NonExistent)
                | (Deleting, Existing(_))
        )
    }

    pub fn transition(self, next: LifecycleState) -> Result<LifecycleState> {
        if self.can_transition_to(&next) {
            Ok(next)
        } else {
            Err(Error::Unsupported(format!(
                "invalid lifecycle transition {self} -> {next}"
            )))
        }
    }

    pub fn is_existing(&self) -> bool {
        matches!(self, LifecycleState::Existing(_))
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::NonExistent => write!(f, "non-existent"),
            LifecycleState::Creating => write!(f, "creating"),
            LifecycleState::Existing(readiness) => write!(f, "existing ({readiness})"),
            LifecycleState::Updating => write!(f, "updating"),
            LifecycleState::Deleting => write!(f, "deleting"),
        }
    }
}

/// Readiness reported by a resource's attributes.
///
/// Only clusters carry a `status`; everything else is ready once it exists.
pub fn readiness_of(attributes: &Attributes) -> Readiness {
    match attributes.get("status") {
        Some(AttrValue::Str(status)) => Readiness::from_status(status),
        _ => Readiness::Ready,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let attrs = Attributes::new()
            .with("name", "orders")
            .with("num_partitions", 6i64)
            .with("retention_ms", "3600000")
            .with("ready", true)
            .with("account_id", "");

        assert_eq!(attrs.str("name").unwrap(), "orders");
        assert_eq!(attrs.opt_int("num_partitions").unwrap(), Some(6));
        assert_eq!(attrs.int_or("retention_ms", 0).unwrap(), 3_600_000);
        assert_eq!(attrs.opt_bool("ready").unwrap(), Some(true));
        assert_eq!(attrs.opt_str("account_id").unwrap(), None);
        assert_eq!(attrs.str_or("durability", "LOW").unwrap(), "LOW");
    }

    #[test]
    fn test_getter_errors() {
        let attrs = Attributes::new()
            .with("name", 3i64)
            .with("num_partitions", "lots");

        assert!(matches!(
            attrs.str("name"),
            Err(Error::InvalidAttribute { ref name, .. }) if name == "name"
        ));
        assert!(matches!(
            attrs.str("region"),
            Err(Error::InvalidAttribute { .. })
        ));
        assert!(attrs.opt_int("num_partitions").is_err());
        assert!(attrs.opt_bool("name").is_err());
    }

    #[test]
    fn test_reject_change() {
        let current = Attributes::new().with("region", "eu-west-1");
        let same = Attributes::new().with("region", "eu-west-1");
        let moved = Attributes::new().with("region", "us-east-1");

        assert!(reject_change("cluster", &current, &same, "region").is_ok());
        assert!(reject_change("cluster", &current, &Attributes::new(), "region").is_ok());
        assert!(matches!(
            reject_change("cluster", &current, &moved, "region"),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_lifecycle_transitions() {
        let state = LifecycleState::NonExistent;
        let state = state.transition(LifecycleState::Creating).unwrap();
        let state = state
            .transition(LifecycleState::Existing(Readiness::Provisioning))
            .unwrap();
        let state = state.transition(LifecycleState::Updating).unwrap();
        let state = state
            .transition(LifecycleState::Existing(Readiness::Ready))
            .unwrap();
        let state = state.transition(LifecycleState::Deleting).unwrap();
        let state = state.transition(LifecycleState::NonExistent).unwrap();
        assert_eq!(state, LifecycleState::NonExistent);

        assert!(LifecycleState::NonExistent
            .transition(LifecycleState::Deleting)
            .is_err());
        assert!(LifecycleState::Creating
            .transition(LifecycleState::Updating)
            .is_err());
    }

    #[test]
    fn test_readiness_of() {
        let up = Attributes::new().with("status", "UP");
        let provisioning = Attributes::new().with("status", "PROVISIONING");

        assert_eq!(readiness_of(&up), Readiness::Ready);
        assert_eq!(readiness_of(&provisioning), Readiness::Provisioning);
        assert_eq!(readiness_of(&Attributes::new()), Readiness::Ready);
    }

    #[test]
    fn test_read_outcome() {
        let present: ReadOutcome<i32> = Some(3).into();
        let absent: ReadOutcome<i32> = None.into();

        assert_eq!(present.clone().map(|v| v * 2), ReadOutcome::Present(6));
        assert!(absent.is_absent());
        assert_eq!(present.present(), Some(3));
    }
}
