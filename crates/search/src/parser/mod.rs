//! Expression parsers for query text, sort fields and aggregations.
//!
//! The three grammars share one convention: a field inside nested documents
//! is written as `nested(<path>, ...)`, and the parser restores the full
//! field path in the generated engine request.
//!
//! | Input | Parser | Output |
//! |-------|--------|--------|
//! | query text | [`build_text_query`] | bool query |
//! | sort field | [`parse_sort_field`] | sort clause |
//! | aggregate-by | [`build_aggregation`] | `aggs` section |

mod aggregation;
mod nested;
mod query;
mod sort;

pub use aggregation::{NESTED_AGGREGATION, TERMS_AGGREGATION, build_aggregation};
pub use query::{NestedBody, Operator, QueryNode, build_text_query, parse_query_nodes, scope_fields};
pub use sort::{build_sort, parse_sort_field};
