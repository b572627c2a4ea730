//! Request and response types.
//!
//! - [`Query`] - A search request (plain or cursor-paged)
//! - [`SortQuery`] - Multi-field sort with optional nested filters
//! - [`SpatialFilter`] - One geometry constraint on a geo field
//! - [`QueryResponse`] - Results, totals, cursor, aggregations and suggestions

mod request;
mod response;
mod spatial;

pub use request::{Query, SortOrder, SortQuery};
pub use response::{AggregationResponse, CursorQueryResponse, Document, QueryResponse};
pub use spatial::{
    BoundingBox, Distance, Intersection, Point, Polygon, SpatialFilter, SpatialShape,
};
