//! Tenant-to-cluster resolution.
//!
//! The gateway never decides where a tenant's data lives; it asks a
//! [`TenantResolver`]. A fan-out task fails as a whole when its tenant cannot
//! be resolved.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use super::cluster::ClusterSettings;
use super::id::TenantId;
use crate::error::{GatewayResult, TenantError, internal_error};

/// Resolves a tenant to the connection settings of its search cluster.
#[async_trait]
pub trait TenantResolver: Send + Sync {
    /// Returns the cluster settings for `tenant`.
    ///
    /// # Errors
    ///
    /// * `TenantError::Unresolvable` - if the tenant is unknown
    async fn resolve(&self, tenant: &TenantId) -> Result<ClusterSettings, TenantError>;
}

/// A resolver over a fixed tenant map, loaded from configuration.
///
/// # Example
///
/// ```
/// use helios_search::tenant::{ClusterSettings, StaticTenantResolver, TenantId};
///
/// let resolver = StaticTenantResolver::new()
///     .with_tenant("opendes", ClusterSettings::new("es-opendes.internal"));
/// assert!(resolver.contains(&TenantId::new("opendes")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticTenantResolver {
    clusters: HashMap<TenantId, ClusterSettings>,
}

impl StaticTenantResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a tenant's cluster settings.
    pub fn with_tenant(mut self, tenant: impl Into<TenantId>, settings: ClusterSettings) -> Self {
        self.clusters.insert(tenant.into(), settings);
        self
    }

    /// Loads a resolver from a JSON object of `tenant -> ClusterSettings`.
    pub fn from_json(json: &str) -> GatewayResult<Self> {
        let clusters: HashMap<TenantId, ClusterSettings> = serde_json::from_str(json)?;
        Ok(Self { clusters })
    }

    /// Loads a resolver from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            internal_error(format!(
                "failed to read clusters file {}: {}",
                path.display(),
                e
            ))
        })?;
        let resolver = Self::from_json(&json)?;
        debug!(path = %path.display(), tenants = resolver.len(), "Loaded tenant cluster map");
        Ok(resolver)
    }

    /// Returns `true` if the tenant is known.
    pub fn contains(&self, tenant: &TenantId) -> bool {
        self.clusters.contains_key(tenant)
    }

    /// Returns the number of known tenants.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Returns `true` if no tenant is known.
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

#[async_trait]
impl TenantResolver for StaticTenantResolver {
    async fn resolve(&self, tenant: &TenantId) -> Result<ClusterSettings, TenantError> {
        self.clusters
            .get(tenant)
            .cloned()
            .ok_or_else(|| TenantError::Unresolvable {
                tenant_id: tenant.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_known_tenant() {
        let resolver =
            StaticTenantResolver::new().with_tenant("opendes", ClusterSettings::new("es-1"));
        let settings = resolver.resolve(&TenantId::new("opendes")).await.unwrap();
        assert_eq!(settings.host, "es-1");
    }

    #[tokio::test]
    async fn test_resolve_unknown_tenant() {
        let resolver = StaticTenantResolver::new();
        let err = resolver.resolve(&TenantId::new("nope")).await.unwrap_err();
        assert_eq!(
            err,
            TenantError::Unresolvable {
                tenant_id: TenantId::new("nope")
            }
        );
    }

    #[test]
    fn test_from_json() {
        let resolver = StaticTenantResolver::from_json(
            r#"{"a": {"host": "es-a", "https": false}, "b": {"host": "es-b", "port": 9243}}"#,
        )
        .unwrap();
        assert_eq!(resolver.len(), 2);
        assert!(resolver.contains(&TenantId::new("b")));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.json");
        std::fs::write(&path, r#"{"opendes": {"host": "localhost"}}"#).unwrap();
        let resolver = StaticTenantResolver::from_file(&path).unwrap();
        assert!(resolver.contains(&TenantId::new("opendes")));
    }

    #[test]
    fn test_from_missing_file() {
        let err = StaticTenantResolver::from_file("/definitely/not/here.json").unwrap_err();
        assert_eq!(err.status_code(), 500);
    }
}
