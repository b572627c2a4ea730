//! Aggregation expression parser.
//!
//! Aggregations are terms buckets on a single field, optionally scoped by
//! `nested(<path>, <field>)` calls. The terms aggregation is always named
//! `agg` and each nesting level is named `nested`, so bucket extraction can
//! walk `nested` until it reaches `agg`.

use serde_json::{Map, Value, json};

use super::nested::{contains_nested, nested_call, split_top_level, starts_with_nested};
use crate::error::{ParseResult, QueryError};

/// Name of the terms aggregation in every request.
pub const TERMS_AGGREGATION: &str = "agg";

/// Name of each nested aggregation level.
pub const NESTED_AGGREGATION: &str = "nested";

/// Builds the `aggs` section for an aggregate-by expression.
///
/// # Errors
///
/// Returns [`QueryError::MalformedAggregation`] when a nested call does not
/// match `nested(<path>, <field>)` or its multi-level form.
pub fn build_aggregation(expression: &str, size: usize) -> ParseResult<Map<String, Value>> {
    let expression = expression.trim();
    let mut aggs = Map::new();

    if !contains_nested(expression) {
        aggs.insert(
            TERMS_AGGREGATION.to_string(),
            json!({ "terms": { "field": expression, "size": size } }),
        );
        return Ok(aggs);
    }

    aggs.insert(NESTED_AGGREGATION.to_string(), nested_level(expression, expression, size)?);
    Ok(aggs)
}

fn nested_level(current: &str, expression: &str, size: usize) -> ParseResult<Value> {
    let malformed = || QueryError::MalformedAggregation {
        fragment: expression.to_string(),
    };

    let (arguments, trailing) = nested_call(current).ok_or_else(malformed)?;
    if !trailing.trim().is_empty() {
        return Err(malformed());
    }

    let args = split_top_level(arguments, ',', usize::MAX);
    let [path, inner] = args.as_slice() else {
        return Err(malformed());
    };
    if path.is_empty() || inner.is_empty() {
        return Err(malformed());
    }

    let child = if starts_with_nested(inner) {
        json!({ NESTED_AGGREGATION: nested_level(inner, expression, size)? })
    } else {
        json!({
            TERMS_AGGREGATION: {
                "terms": {
                    "field": format!("{path}.{inner}"),
                    "size": size,
                    "min_doc_count": 1,
                    "order": [{ "_count": "desc" }, { "_key": "asc" }],
                }
            }
        })
    };

    Ok(json!({
        "nested": { "path": path },
        "aggs": child,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_aggregation() {
        let aggs = build_aggregation("kind", 1000).unwrap();
        assert_eq!(
            Value::Object(aggs),
            json!({ "agg": { "terms": { "field": "kind", "size": 1000 } } })
        );
    }

    #[test]
    fn test_single_level_nested_aggregation() {
        let aggs = build_aggregation("nested(data.Markers, Name)", 50).unwrap();
        let nested = &aggs["nested"];
        assert_eq!(nested["nested"]["path"], "data.Markers");
        let terms = &nested["aggs"]["agg"]["terms"];
        assert_eq!(terms["field"], "data.Markers.Name");
        assert_eq!(terms["size"], 50);
        assert_eq!(terms["min_doc_count"], 1);
        assert_eq!(terms["order"][0]["_count"], "desc");
    }

    #[test]
    fn test_multi_level_nested_aggregation() {
        let aggs = build_aggregation("nested(data.A, nested(data.A.B, Kind))", 10).unwrap();
        let outer = &aggs["nested"];
        assert_eq!(outer["nested"]["path"], "data.A");
        let inner = &outer["aggs"]["nested"];
        assert_eq!(inner["nested"]["path"], "data.A.B");
        assert_eq!(inner["aggs"]["agg"]["terms"]["field"], "data.A.B.Kind");
    }

    #[test]
    fn test_malformed_nested_aggregation() {
        for expression in ["nested(data.Markers)", "nested(data.Markers, Name", "nested(a, b, c)"] {
            let err = build_aggregation(expression, 10).unwrap_err();
            assert!(
                matches!(err, QueryError::MalformedAggregation { ref fragment } if fragment == expression),
                "{expression}"
            );
        }
    }
}
