//! Search request types.

use serde::{Deserialize, Serialize};

use super::spatial::SpatialFilter;
use crate::error::QueryError;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    #[default]
    Desc,
}

impl SortOrder {
    /// Returns the engine's spelling of this order.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// A multi-field sort request.
///
/// `field[i]` is sorted by `order[i]`; `filter[i]`, when present, restricts
/// which nested documents contribute to a nested sort on `field[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SortQuery {
    /// Sort fields, possibly `nested(...)` expressions.
    pub field: Vec<String>,
    /// One order per field.
    pub order: Vec<SortOrder>,
    /// Optional per-field nested filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<Option<String>>>,
}

impl SortQuery {
    /// Creates a sort on a single field.
    pub fn by(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: vec![field.into()],
            order: vec![order],
            filter: None,
        }
    }

    /// Appends another sort key.
    pub fn then_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.field.push(field.into());
        self.order.push(order);
        if let Some(filters) = self.filter.as_mut() {
            filters.push(None);
        }
        self
    }

    /// Attaches a nested filter to the most recently added field.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        let len = self.field.len();
        let filters = self.filter.get_or_insert_with(|| vec![None; len]);
        filters.resize(len, None);
        if let Some(last) = filters.last_mut() {
            *last = Some(filter.into());
        }
        self
    }

    /// Returns the filter for the field at `index`, if any.
    pub fn filter_at(&self, index: usize) -> Option<&str> {
        self.filter
            .as_ref()
            .and_then(|f| f.get(index))
            .and_then(|f| f.as_deref())
    }

    /// Checks field, order and filter counts.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.field.is_empty() {
            return Err(QueryError::InvalidSort {
                message: "'sort.field' can not be empty".to_string(),
            });
        }
        if self.field.iter().any(|f| f.trim().is_empty()) {
            return Err(QueryError::InvalidSort {
                message: "'sort.field' can not contain empty or blank values".to_string(),
            });
        }
        if self.field.len() != self.order.len() {
            return Err(QueryError::InvalidSort {
                message: "'sort.field' and 'sort.order' size do not match".to_string(),
            });
        }
        if let Some(filters) = &self.filter {
            if filters.len() != self.field.len() {
                return Err(QueryError::InvalidSort {
                    message: "'sort.field' and 'sort.filter' size do not match".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A search request.
///
/// Immutable once handed to the gateway. The same type serves plain
/// (offset-paged) and cursor-paged queries; `offset` is ignored for the
/// latter and `cursor` for the former.
///
/// # Example
///
/// ```
/// use helios_search::types::{Query, SortOrder, SortQuery};
///
/// let query = Query::new("opendes:wks:master-data--Well:1.0.0")
///     .with_query("data.Name:\"WELL-1\" AND nested(data.Markers, (Depth:>100))")
///     .with_sort(SortQuery::by("data.Name", SortOrder::Asc))
///     .with_limit(50);
///
/// assert_eq!(query.limit, Some(50));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Target kinds, e.g. `authority:source:entity:1.0.0`. May contain wildcards.
    pub kind: Vec<String>,

    /// Free-text expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// Spatial constraint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_filter: Option<SpatialFilter>,

    /// Sort specification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortQuery>,

    /// Page size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Start offset for plain queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,

    /// Fields to return. All fields are returned when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returned_fields: Option<Vec<String>>,

    /// Fields to highlight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlighted_fields: Option<Vec<String>>,

    /// Aggregation expression, a field or `nested(...)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_by: Option<String>,

    /// Phrase for autocomplete suggestions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggest_phrase: Option<String>,

    /// Restrict to documents the caller owns rather than can view.
    #[serde(default)]
    pub query_as_owner: bool,

    /// Ask the engine for an exact total count.
    #[serde(default)]
    pub track_total_count: bool,

    /// Cursor token from a previous page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl Query {
    /// Creates a query over one kind.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: vec![kind.into()],
            ..Default::default()
        }
    }

    /// Creates a query over several kinds.
    pub fn for_kinds<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: kinds.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Sets the free-text expression.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Sets the spatial filter.
    pub fn with_spatial_filter(mut self, filter: SpatialFilter) -> Self {
        self.spatial_filter = Some(filter);
        self
    }

    /// Sets the sort.
    pub fn with_sort(mut self, sort: SortQuery) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Sets the page size.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Sets the returned fields.
    pub fn with_returned_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returned_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the highlighted fields.
    pub fn with_highlighted_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.highlighted_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the aggregation expression.
    pub fn with_aggregate_by(mut self, aggregate_by: impl Into<String>) -> Self {
        self.aggregate_by = Some(aggregate_by.into());
        self
    }

    /// Sets the suggest phrase.
    pub fn with_suggest_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.suggest_phrase = Some(phrase.into());
        self
    }

    /// Restricts results to owned documents.
    pub fn as_owner(mut self, as_owner: bool) -> Self {
        self.query_as_owner = as_owner;
        self
    }

    /// Requests an exact total count.
    pub fn with_track_total_count(mut self, track: bool) -> Self {
        self.track_total_count = track;
        self
    }

    /// Sets the cursor token.
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Returns the cursor token when present and non-blank.
    pub fn cursor_token(&self) -> Option<&str> {
        self.cursor.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Returns the free-text expression when present and non-blank.
    pub fn text(&self) -> Option<&str> {
        self.query.as_deref().filter(|q| !q.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_deserialization() {
        let query: Query = serde_json::from_str(
            r#"{
                "kind": ["opendes:wks:well:1.0.0"],
                "query": "data.Name:A*",
                "limit": 20,
                "sort": {"field": ["data.Name"], "order": ["ASC"]},
                "queryAsOwner": true,
                "trackTotalCount": true
            }"#,
        )
        .unwrap();
        assert_eq!(query.kind, vec!["opendes:wks:well:1.0.0".to_string()]);
        assert_eq!(query.limit, Some(20));
        assert!(query.query_as_owner);
        assert!(query.track_total_count);
        assert_eq!(query.sort.unwrap().order, vec![SortOrder::Asc]);
    }

    #[test]
    fn test_blank_cursor_is_none() {
        let query = Query::new("k").with_cursor("  ");
        assert!(query.cursor_token().is_none());
        let query = Query::new("k").with_cursor("ABC");
        assert_eq!(query.cursor_token(), Some("ABC"));
    }

    #[test]
    fn test_sort_query_validation() {
        assert!(SortQuery::by("a", SortOrder::Asc).validate().is_ok());

        let mismatch = SortQuery {
            field: vec!["a".into(), "b".into()],
            order: vec![SortOrder::Asc],
            filter: None,
        };
        assert!(matches!(
            mismatch.validate(),
            Err(QueryError::InvalidSort { .. })
        ));

        let empty = SortQuery::default();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_sort_filter_alignment() {
        let sort = SortQuery::by("a", SortOrder::Asc)
            .then_by("nested(data.X, Y, min)", SortOrder::Desc)
            .with_filter("nested(data.X, (Z:1))");
        assert!(sort.validate().is_ok());
        assert_eq!(sort.filter_at(0), None);
        assert_eq!(sort.filter_at(1), Some("nested(data.X, (Z:1))"));
    }
}
