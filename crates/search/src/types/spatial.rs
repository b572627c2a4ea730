//! Spatial filter types.
//!
//! A [`SpatialFilter`] targets one geo field with exactly one geometry. On the
//! wire the geometry is keyed by its variant name:
//!
//! ```json
//! { "field": "data.SpatialLocation.Wgs84Coordinates",
//!   "byBoundingBox": { "topLeft": {...}, "bottomRight": {...} } }
//! ```

use serde::{Deserialize, Serialize};

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Point {
    /// Creates a point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Rectangle given by its top-left and bottom-right corners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    /// Top-left corner.
    pub top_left: Point,
    /// Bottom-right corner.
    pub bottom_right: Point,
}

/// Circle given by a center and a radius in meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distance {
    /// Center.
    pub point: Point,
    /// Radius in meters.
    pub distance: f64,
}

/// A closed ring of points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    /// Ring points; the first and last must be equal.
    pub points: Vec<Point>,
}

/// A set of polygons, matched by intersection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intersection {
    /// The polygons.
    pub polygons: Vec<Polygon>,
}

/// The geometry of a spatial filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpatialShape {
    /// Documents inside a rectangle.
    ByBoundingBox(BoundingBox),
    /// Documents within a radius of a point.
    ByDistance(Distance),
    /// Documents inside a polygon.
    ByGeoPolygon(Polygon),
    /// Documents intersecting any of several polygons.
    ByIntersection(Intersection),
}

/// A spatial constraint on one geo field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialFilter {
    /// The geo field, e.g. `data.SpatialLocation.Wgs84Coordinates`.
    pub field: String,
    /// The geometry.
    #[serde(flatten)]
    pub shape: SpatialShape,
}

impl SpatialFilter {
    /// Creates a bounding-box filter.
    pub fn bounding_box(field: impl Into<String>, top_left: Point, bottom_right: Point) -> Self {
        Self {
            field: field.into(),
            shape: SpatialShape::ByBoundingBox(BoundingBox {
                top_left,
                bottom_right,
            }),
        }
    }

    /// Creates a distance filter; `meters` is the radius.
    pub fn distance(field: impl Into<String>, point: Point, meters: f64) -> Self {
        Self {
            field: field.into(),
            shape: SpatialShape::ByDistance(Distance {
                point,
                distance: meters,
            }),
        }
    }

    /// Creates a polygon filter.
    pub fn polygon(field: impl Into<String>, points: Vec<Point>) -> Self {
        Self {
            field: field.into(),
            shape: SpatialShape::ByGeoPolygon(Polygon { points }),
        }
    }

    /// Creates an intersection filter.
    pub fn intersection(field: impl Into<String>, polygons: Vec<Polygon>) -> Self {
        Self {
            field: field.into(),
            shape: SpatialShape::ByIntersection(Intersection { polygons }),
        }
    }
}
