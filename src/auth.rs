//! Authorization collaborator
//!
//! Permission checks are delegated to the hosting platform; the datastore
//! only gates its public operations on the outcome. The built-in
//! implementations cover standalone deployments and tests.

use async_trait::async_trait;

use crate::{Error, Result};

/// Permission domain of a datastore operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Datastore,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Datastore => "datastore",
        }
    }
}

/// Action being authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Delete => "delete",
        }
    }
}

/// Permission-check gate consulted before every public registry operation
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Fails with [`Error::Unauthorized`] when the caller may not perform
    /// `action` in `scope_id`.
    async fn check_permission(&self, domain: Domain, action: Action, scope_id: &str)
        -> Result<()>;
}

/// Grants everything; the single-tenant/standalone default
#[derive(Debug, Default)]
pub struct AllowAllAuthorizer;

#[async_trait]
impl Authorizer for AllowAllAuthorizer {
    async fn check_permission(
        &self,
        _domain: Domain,
        _action: Action,
        _scope_id: &str,
    ) -> Result<()> {
        Ok(())
    }
}

/// Denies everything; used to exercise denial paths in tests
#[derive(Debug, Default)]
pub struct DenyAllAuthorizer;

#[async_trait]
impl Authorizer for DenyAllAuthorizer {
    async fn check_permission(
        &self,
        domain: Domain,
        action: Action,
        scope_id: &str,
    ) -> Result<()> {
        Err(Error::Unauthorized(format!(
            "{}:{} denied in scope {}",
            domain.as_str(),
            action.as_str(),
            scope_id
        )))
    }
}
