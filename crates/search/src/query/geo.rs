//! Spatial clause builder.
//!
//! A spatial filter compiles to one of two query families depending on how
//! the target field is indexed:
//!
//! | Filter | Point mode | Shape mode |
//! |--------|------------|------------|
//! | bounding box | `geo_bounding_box` | `geo_shape` within envelope |
//! | distance | `geo_distance` | rejected |
//! | polygon | `geo_polygon` | `geo_shape` within polygon |
//! | intersection | `geo_shape` intersects | `geo_shape` intersects |
//!
//! Shape mode is used only when every target index maps the field as
//! `geo_shape`; mixed or unknown mappings fall back to point mode.

use std::collections::HashSet;

use serde_json::{Value, json};

use crate::error::{ParseResult, QueryError};
use crate::types::{Point, Polygon, SpatialFilter, SpatialShape};

/// Minimum number of points in a closed polygon ring.
pub const MINIMUM_POLYGON_POINTS: usize = 4;

/// Mapped type of shape-indexed geo fields.
pub const GEO_SHAPE_TYPE: &str = "geo_shape";

/// How the target geo field is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryMode {
    /// `geo_point`, mixed, or unresolved mappings.
    Point,
    /// `geo_shape` in every target index.
    Shape,
}

impl GeometryMode {
    /// Chooses the mode from the set of mapped types of a field.
    pub fn from_field_types(types: &HashSet<String>) -> Self {
        if types.len() == 1 && types.contains(GEO_SHAPE_TYPE) {
            GeometryMode::Shape
        } else {
            GeometryMode::Point
        }
    }
}

/// Builds the spatial clause for `filter`.
///
/// # Errors
///
/// Returns [`QueryError::InvalidSpatialFilter`] for open or undersized
/// polygons and [`QueryError::UnsupportedSpatialQuery`] for a distance filter
/// on a shape-indexed field.
pub fn build_spatial_query(filter: &SpatialFilter, mode: GeometryMode) -> ParseResult<Value> {
    let field = filter.field.as_str();

    match (&filter.shape, mode) {
        (SpatialShape::ByBoundingBox(bbox), GeometryMode::Point) => Ok(json!({
            "geo_bounding_box": {
                field: {
                    "top_left": lat_lon(&bbox.top_left),
                    "bottom_right": lat_lon(&bbox.bottom_right),
                },
                "ignore_unmapped": true,
            }
        })),
        (SpatialShape::ByBoundingBox(bbox), GeometryMode::Shape) => Ok(geo_shape(
            field,
            json!({
                "type": "envelope",
                "coordinates": [lon_lat(&bbox.top_left), lon_lat(&bbox.bottom_right)],
            }),
            "within",
        )),
        (SpatialShape::ByDistance(distance), GeometryMode::Point) => Ok(json!({
            "geo_distance": {
                "distance": format!("{}m", distance.distance),
                field: lat_lon(&distance.point),
                "ignore_unmapped": true,
            }
        })),
        (SpatialShape::ByDistance(_), GeometryMode::Shape) => {
            Err(QueryError::UnsupportedSpatialQuery {
                message: format!(
                    "Distance queries are not supported on geo_shape field '{}'",
                    field
                ),
            })
        }
        (SpatialShape::ByGeoPolygon(polygon), GeometryMode::Point) => {
            validate_polygon(polygon)?;
            Ok(json!({
                "geo_polygon": {
                    field: {
                        "points": polygon.points.iter().map(lat_lon).collect::<Vec<_>>(),
                    },
                    "ignore_unmapped": true,
                }
            }))
        }
        (SpatialShape::ByGeoPolygon(polygon), GeometryMode::Shape) => {
            Ok(geo_shape(field, polygon_shape(polygon)?, "within"))
        }
        (SpatialShape::ByIntersection(intersection), _) => {
            let geometries = intersection
                .polygons
                .iter()
                .map(polygon_shape)
                .collect::<ParseResult<Vec<_>>>()?;
            Ok(geo_shape(
                field,
                json!({ "type": "geometrycollection", "geometries": geometries }),
                "intersects",
            ))
        }
    }
}

/// Checks that a polygon is a closed ring of at least four points.
pub fn validate_polygon(polygon: &Polygon) -> ParseResult<()> {
    let points = &polygon.points;
    if points.len() < MINIMUM_POLYGON_POINTS {
        return Err(QueryError::InvalidSpatialFilter {
            message: format!("Polygons must have at least {MINIMUM_POLYGON_POINTS} points"),
        });
    }
    if points.first() != points.last() {
        return Err(QueryError::InvalidSpatialFilter {
            message: "The first point must match the last point to close the polygon".to_string(),
        });
    }
    Ok(())
}

fn polygon_shape(polygon: &Polygon) -> ParseResult<Value> {
    validate_polygon(polygon)?;
    let ring: Vec<Value> = polygon.points.iter().map(lon_lat).collect();
    Ok(json!({ "type": "polygon", "coordinates": [ring] }))
}

fn geo_shape(field: &str, shape: Value, relation: &str) -> Value {
    json!({
        "geo_shape": {
            field: { "shape": shape, "relation": relation },
            "ignore_unmapped": true,
        }
    })
}

fn lat_lon(point: &Point) -> Value {
    json!({ "lat": point.latitude, "lon": point.longitude })
}

// GeoJSON coordinate order
fn lon_lat(point: &Point) -> Value {
    json!([point.longitude, point.latitude])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, 1.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 0.0),
        ]
    }

    fn types(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mode_from_field_types() {
        assert_eq!(GeometryMode::from_field_types(&types(&["geo_shape"])), GeometryMode::Shape);
        assert_eq!(
            GeometryMode::from_field_types(&types(&["geo_shape", "geo_point"])),
            GeometryMode::Point
        );
        assert_eq!(GeometryMode::from_field_types(&types(&[])), GeometryMode::Point);
    }

    #[test]
    fn test_bounding_box_point_mode() {
        let filter = SpatialFilter::bounding_box("loc", Point::new(10.0, -5.0), Point::new(-10.0, 5.0));
        let query = build_spatial_query(&filter, GeometryMode::Point).unwrap();
        assert_eq!(query["geo_bounding_box"]["loc"]["top_left"]["lat"], 10.0);
        assert_eq!(query["geo_bounding_box"]["ignore_unmapped"], true);
    }

    #[test]
    fn test_bounding_box_shape_mode() {
        let filter = SpatialFilter::bounding_box("loc", Point::new(10.0, -5.0), Point::new(-10.0, 5.0));
        let query = build_spatial_query(&filter, GeometryMode::Shape).unwrap();
        let shape = &query["geo_shape"]["loc"];
        assert_eq!(shape["relation"], "within");
        assert_eq!(shape["shape"]["type"], "envelope");
        assert_eq!(shape["shape"]["coordinates"][0], json!([-5.0, 10.0]));
    }

    #[test]
    fn test_distance_point_mode() {
        let filter = SpatialFilter::distance("loc", Point::new(1.0, 2.0), 1500.0);
        let query = build_spatial_query(&filter, GeometryMode::Point).unwrap();
        assert_eq!(query["geo_distance"]["distance"], "1500m");
        assert_eq!(query["geo_distance"]["loc"]["lon"], 2.0);
    }

    #[test]
    fn test_distance_shape_mode_is_rejected() {
        let filter = SpatialFilter::distance("loc", Point::new(1.0, 2.0), 1500.0);
        let err = build_spatial_query(&filter, GeometryMode::Shape).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedSpatialQuery { .. }));
    }

    #[test]
    fn test_polygon_modes() {
        let filter = SpatialFilter::polygon("loc", square());
        let point = build_spatial_query(&filter, GeometryMode::Point).unwrap();
        assert_eq!(point["geo_polygon"]["loc"]["points"].as_array().unwrap().len(), 4);

        let shape = build_spatial_query(&filter, GeometryMode::Shape).unwrap();
        assert_eq!(shape["geo_shape"]["loc"]["shape"]["type"], "polygon");
    }

    #[test]
    fn test_intersection_is_always_shape() {
        let filter = SpatialFilter::intersection(
            "loc",
            vec![Polygon { points: square() }, Polygon { points: square() }],
        );
        let query = build_spatial_query(&filter, GeometryMode::Point).unwrap();
        let shape = &query["geo_shape"]["loc"];
        assert_eq!(shape["relation"], "intersects");
        assert_eq!(shape["shape"]["type"], "geometrycollection");
        assert_eq!(shape["shape"]["geometries"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_polygon_validation() {
        let short = Polygon {
            points: square()[..3].to_vec(),
        };
        assert_eq!(
            validate_polygon(&short).unwrap_err().to_string(),
            "Polygons must have at least 4 points"
        );

        let mut open = square();
        open[3] = Point::new(2.0, 2.0);
        assert_eq!(
            validate_polygon(&Polygon { points: open }).unwrap_err().to_string(),
            "The first point must match the last point to close the polygon"
        );
    }
}
