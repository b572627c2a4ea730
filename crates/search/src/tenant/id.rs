//! Tenant identifier type.
//!
//! A tenant is a data partition served by its own search cluster. Requests
//! name the partitions they target in a single comma-delimited header value;
//! [`TenantId::parse_list`] turns that value into identifiers.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::TenantError;

static PARTITION_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*,\s*").expect("partition separator pattern is valid"));

/// An opaque tenant (data partition) identifier.
///
/// # Examples
///
/// ```
/// use helios_search::tenant::TenantId;
///
/// let tenant = TenantId::new("opendes");
/// assert_eq!(tenant.as_str(), "opendes");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Creates a new tenant ID from the given string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the tenant ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits a comma-delimited partition list into tenant IDs.
    ///
    /// Whitespace around separators is ignored and empty segments are dropped.
    /// Order is preserved. A legacy single identifier yields one element.
    ///
    /// # Errors
    ///
    /// Returns [`TenantError::EmptyPartitionList`] when no identifier remains.
    ///
    /// # Examples
    ///
    /// ```
    /// use helios_search::tenant::TenantId;
    ///
    /// let tenants = TenantId::parse_list(" opendes , common").unwrap();
    /// assert_eq!(tenants, vec![TenantId::new("opendes"), TenantId::new("common")]);
    /// ```
    pub fn parse_list(raw: &str) -> Result<Vec<TenantId>, TenantError> {
        let tenants: Vec<TenantId> = PARTITION_SEPARATOR
            .split(raw.trim())
            .filter(|segment| !segment.is_empty())
            .map(TenantId::new)
            .collect();

        if tenants.is_empty() {
            return Err(TenantError::EmptyPartitionList);
        }
        Ok(tenants)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TenantId({})", self.0)
    }
}

impl FromStr for TenantId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TenantId::new(s))
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        TenantId::new(s)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        TenantId::new(s)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_id_creation() {
        let tenant = TenantId::new("my-tenant");
        assert_eq!(tenant.as_str(), "my-tenant");
        assert_eq!(tenant.to_string(), "my-tenant");
        assert_eq!(format!("{:?}", tenant), "TenantId(my-tenant)");
    }

    #[test]
    fn test_parse_single_partition() {
        let tenants = TenantId::parse_list("opendes").unwrap();
        assert_eq!(tenants, vec![TenantId::new("opendes")]);
    }

    #[test]
    fn test_parse_list_trims_separators() {
        let tenants = TenantId::parse_list("a ,b,  c").unwrap();
        let ids: Vec<&str> = tenants.iter().map(|t| t.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_list_drops_empty_segments() {
        let tenants = TenantId::parse_list("a,,b,").unwrap();
        assert_eq!(tenants.len(), 2);
    }

    #[test]
    fn test_parse_empty_list_fails() {
        assert_eq!(
            TenantId::parse_list("  "),
            Err(TenantError::EmptyPartitionList)
        );
        assert_eq!(
            TenantId::parse_list(" , "),
            Err(TenantError::EmptyPartitionList)
        );
    }

    #[test]
    fn test_serde_transparent() {
        let tenant = TenantId::new("opendes");
        assert_eq!(serde_json::to_string(&tenant).unwrap(), "\"opendes\"");
    }
}
