//! Sort expression parser.
//!
//! A sort field is either a plain field name, `_score`, or a nested call:
//!
//! ```text
//! nested(<path>, <field>, <mode>)
//! nested(<parent_path>, nested(<child_path>, <field>, <mode>))
//! ```
//!
//! `<mode>` is one of `min`, `max`, `sum`, `avg` or `median`. The resolved
//! sort field is `<innermost path>.<field>`.

use serde_json::{Map, Value, json};

use super::nested::{contains_nested, nested_call, split_top_level, starts_with_nested};
use super::query::{QueryNode, parse_query_nodes};
use crate::error::{ParseResult, QueryError};
use crate::types::{SortOrder, SortQuery};

const SORT_MODES: [&str; 5] = ["min", "max", "sum", "avg", "median"];

/// Builds the engine sort list for a sort request.
///
/// # Errors
///
/// Returns [`QueryError::InvalidSort`] for count mismatches, and the parse
/// errors of [`parse_sort_field`] for each field.
pub fn build_sort(sort: &SortQuery) -> ParseResult<Vec<Value>> {
    sort.validate()?;
    sort.field
        .iter()
        .zip(&sort.order)
        .enumerate()
        .map(|(i, (field, order))| parse_sort_field(field, *order, sort.filter_at(i)))
        .collect()
}

/// Builds the engine sort clause for one field.
pub fn parse_sort_field(field: &str, order: SortOrder, filter: Option<&str>) -> ParseResult<Value> {
    let field = field.trim();

    if !contains_nested(field) {
        if field.eq_ignore_ascii_case("_score") {
            return Ok(json!({ "_score": { "order": order.as_str() } }));
        }
        return Ok(json!({
            field: {
                "order": order.as_str(),
                "missing": "_last",
                "unmapped_type": "keyword",
            }
        }));
    }

    let chain = parse_chain(field)?;
    let leaf = chain.last().ok_or_else(|| malformed(field))?;
    let (Some(leaf_field), Some(mode)) = (&leaf.field, &leaf.mode) else {
        return Err(malformed(field));
    };
    let sort_field = format!("{}.{}", leaf.path, leaf_field);

    let mut nested = nested_descriptor(&chain);
    if let Some(filter) = filter.filter(|f| !f.trim().is_empty()) {
        nested.insert("filter".to_string(), sort_filter(filter)?);
    }

    Ok(json!({
        sort_field: {
            "order": order.as_str(),
            "mode": mode,
            "nested": nested,
            "missing": "_last",
            "unmapped_type": "keyword",
        }
    }))
}

/// One level of a nested sort call.
struct NestedLevel {
    path: String,
    field: Option<String>,
    mode: Option<String>,
}

/// Flattens `nested(a, nested(b, f, m))` into levels from outermost to innermost.
fn parse_chain(expression: &str) -> ParseResult<Vec<NestedLevel>> {
    let mut levels = Vec::new();
    let mut current = expression;

    loop {
        let (arguments, trailing) = nested_call(current).ok_or_else(|| malformed(expression))?;
        if !trailing.trim().is_empty() {
            return Err(malformed(expression));
        }

        let args = split_top_level(arguments, ',', usize::MAX);
        match args.as_slice() {
            [path, inner] if starts_with_nested(inner) && !path.is_empty() => {
                levels.push(NestedLevel {
                    path: path.to_string(),
                    field: None,
                    mode: None,
                });
                current = inner;
            }
            [path, field, mode] if !path.is_empty() && !field.is_empty() => {
                let mode = mode.to_ascii_lowercase();
                if !SORT_MODES.contains(&mode.as_str()) {
                    return Err(malformed(expression));
                }
                levels.push(NestedLevel {
                    path: path.to_string(),
                    field: Some(field.to_string()),
                    mode: Some(mode),
                });
                return Ok(levels);
            }
            _ => return Err(malformed(expression)),
        }
    }
}

/// Builds `{ path, nested: { path, ... } }` for the chain.
fn nested_descriptor(chain: &[NestedLevel]) -> Map<String, Value> {
    let mut descriptor: Option<Map<String, Value>> = None;
    for level in chain.iter().rev() {
        let mut map = Map::new();
        map.insert("path".to_string(), Value::String(level.path.clone()));
        if let Some(inner) = descriptor.take() {
            map.insert("nested".to_string(), Value::Object(inner));
        }
        descriptor = Some(map);
    }
    descriptor.unwrap_or_default()
}

/// Resolves a sort filter, which must be exactly one nested clause.
fn sort_filter(filter: &str) -> ParseResult<Value> {
    let not_nested = || QueryError::SortFilterNotNested {
        filter: filter.to_string(),
    };
    let nodes = parse_query_nodes(filter)?;
    match nodes.as_slice() {
        [node @ QueryNode::Nested { .. }] => node.nested_query().ok_or_else(not_nested),
        _ => Err(not_nested()),
    }
}

fn malformed(fragment: &str) -> QueryError {
    QueryError::MalformedSort {
        fragment: fragment.to_string(),
    }
}
