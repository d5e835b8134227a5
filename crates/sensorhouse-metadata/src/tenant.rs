//! Tenant Isolation Context
//!
//! Every tenant-scoped operation in SensorHouse runs against a [`TenantScope`].
//! A scope can only be obtained from [`IsolationGuard::enter`], and every
//! tenant-scoped method of [`SensorStore`](crate::SensorStore) takes one, so a
//! query without a tenant predicate cannot be expressed.
//!
//! ## Usage
//!
//! ```ignore
//! use sensorhouse_metadata::tenant::IsolationGuard;
//!
//! // The identifier arrives from the edge (header, CLI flag, ...)
//! let scope = IsolationGuard::enter(request.header("X-Tenant-ID"))?;
//!
//! // Every store call is filtered and stamped by the scope
//! let sensors = store.list_sensors(&scope).await?;
//! ```
//!
//! A scope is a plain value: it lives as long as the operation holding it and
//! is never stored in shared state, so concurrent operations for different
//! tenants cannot observe each other's context.

use crate::error::{MetadataError, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Globally unique, immutable tenant handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Parse a raw identifier. Surrounding whitespace is ignored; a blank
    /// identifier is treated as absent.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(MetadataError::MissingTenantContext);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Generate a fresh identifier for an administratively created tenant.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TenantId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Isolation context bound to a single operation.
///
/// Has no public constructor: obtain one through [`IsolationGuard::enter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    tenant_id: TenantId,
}

impl TenantScope {
    /// The tenant every row read or written under this scope must belong to.
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Whether a row stamped with `tenant_id` is visible under this scope.
    pub fn admits(&self, tenant_id: &TenantId) -> bool {
        &self.tenant_id == tenant_id
    }
}

/// Entry point that turns an inbound tenant identifier into a [`TenantScope`].
pub struct IsolationGuard;

impl IsolationGuard {
    /// Bind an isolation context.
    ///
    /// Fails with `MissingTenantContext` when the identifier is absent or blank;
    /// in that case no storage access can follow because no scope exists.
    pub fn enter(tenant: Option<&str>) -> Result<TenantScope> {
        let raw = tenant.ok_or(MetadataError::MissingTenantContext)?;
        let tenant_id = TenantId::parse(raw)?;
        tracing::trace!(tenant = %tenant_id, "IsolationGuard::enter");
        Ok(TenantScope { tenant_id })
    }

    /// Bind an isolation context from an already parsed identifier.
    pub fn enter_id(tenant_id: &TenantId) -> TenantScope {
        TenantScope {
            tenant_id: tenant_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_without_tenant_fails() {
        let err = IsolationGuard::enter(None).unwrap_err();
        assert!(matches!(err, MetadataError::MissingTenantContext));
    }

    #[test]
    fn test_enter_with_blank_tenant_fails() {
        for raw in ["", "   ", "\t\n"] {
            let err = IsolationGuard::enter(Some(raw)).unwrap_err();
            assert!(matches!(err, MetadataError::MissingTenantContext));
        }
    }

    #[test]
    fn test_enter_trims_identifier() {
        let scope = IsolationGuard::enter(Some("  tenant-a ")).unwrap();
        assert_eq!(scope.tenant_id().as_str(), "tenant-a");
    }

    #[test]
    fn test_scope_admits_only_own_tenant() {
        let scope = IsolationGuard::enter(Some("tenant-a")).unwrap();
        assert!(scope.admits(&TenantId::parse("tenant-a").unwrap()));
        assert!(!scope.admits(&TenantId::parse("tenant-b").unwrap()));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = TenantId::generate();
        let b = TenantId::generate();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(a.as_str()).is_ok());
    }
}
