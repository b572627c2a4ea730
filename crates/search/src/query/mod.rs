//! Engine query construction.
//!
//! - [`builder`]: the bool query with text, spatial, collaboration and
//!   authorization clauses
//! - [`geo`]: spatial clauses in point or shape mode
//! - [`index`]: kind to index name resolution
//! - [`request`]: the full request body (paging, highlight, source filter,
//!   suggestions, aggregations, sort)

pub mod builder;
pub mod geo;
pub mod index;
pub mod request;

pub use builder::{
    ACL_FIELD, COLLABORATION_FIELD, OWNERS_FIELD, PolicyService, QueryBuilder,
    authorization_filter,
};
pub use geo::{GeometryMode, build_spatial_query, validate_polygon};
pub use index::{index_name_for_kind, resolve_index};
pub use request::{RequestBodyBuilder, check_result_window, page_size};
