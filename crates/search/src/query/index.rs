//! Index name resolution from record kinds.
//!
//! | Kind | Partitions | Index expression |
//! |------|------------|------------------|
//! | `opendes:wks:well:1.0.0` | any | `opendes-wks-well-1.0.0,-.*` |
//! | `*:wks:well:1.0.0` | `opendes` | `opendes*-wks-well-1.0.0,-.*` |
//! | `*:wks:well:1.0.0` | `opendes,common` | `*-wks-well-1.0.0,-.*` |
//!
//! The trailing `-.*` excludes system indices from wildcard kinds.

use crate::tenant::TenantId;

/// Suffix excluding system (dot-prefixed) indices.
const SYSTEM_INDEX_EXCLUSION: &str = "-.*";

/// Converts a kind into its index name.
pub fn index_name_for_kind(kind: &str) -> String {
    kind.trim().replace(':', "-").to_lowercase()
}

/// Resolves the index expression searched for `kinds`.
///
/// A wildcard-authority kind (`*:...`) is pinned to `partition` when the
/// request targets exactly one partition.
pub fn resolve_index(kinds: &[String], partitions: &[TenantId]) -> String {
    let single_partition = match partitions {
        [only] => Some(only),
        _ => None,
    };

    let mut indices: Vec<String> = kinds
        .iter()
        .flat_map(|k| k.split(','))
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|kind| {
            let index = index_name_for_kind(kind);
            match single_partition {
                Some(partition) if kind.starts_with("*:") => format!("{}{}", partition, index),
                _ => index,
            }
        })
        .collect();

    indices.push(SYSTEM_INDEX_EXCLUSION.to_string());
    indices.join(",")
}
