//! GeoJSON 输出结构与要素写出。圆形在写出前一律近似为多边形，
//! 因此 [`GeoJsonGeometry`] 没有圆形变体。

use mfprint_core::feature::{Feature, FeatureId};
use mfprint_core::geometry::{Geometry, Point2};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeoJsonGeometry {
    Point { coordinates: [f64; 2] },
    LineString { coordinates: Vec<[f64; 2]> },
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
    MultiPoint { coordinates: Vec<[f64; 2]> },
    MultiLineString { coordinates: Vec<Vec<[f64; 2]>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<[f64; 2]>>> },
    GeometryCollection { geometries: Vec<GeoJsonGeometry> },
}

impl GeoJsonGeometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            GeoJsonGeometry::Point { .. } => "Point",
            GeoJsonGeometry::LineString { .. } => "LineString",
            GeoJsonGeometry::Polygon { .. } => "Polygon",
            GeoJsonGeometry::MultiPoint { .. } => "MultiPoint",
            GeoJsonGeometry::MultiLineString { .. } => "MultiLineString",
            GeoJsonGeometry::MultiPolygon { .. } => "MultiPolygon",
            GeoJsonGeometry::GeometryCollection { .. } => "GeometryCollection",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct GeoJsonFeature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FeatureId>,
    pub geometry: Option<GeoJsonGeometry>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl GeoJsonFeature {
    /// 排序用：仅单点几何视为点要素。
    #[inline]
    pub fn is_point(&self) -> bool {
        matches!(self.geometry, Some(GeoJsonGeometry::Point { .. }))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct FeatureCollection {
    pub features: Vec<GeoJsonFeature>,
}

fn coords(points: &[Point2]) -> Vec<[f64; 2]> {
    points.iter().map(|point| point.to_array()).collect()
}

fn rings(rings: &[Vec<Point2>]) -> Vec<Vec<[f64; 2]>> {
    rings.iter().map(|ring| coords(ring)).collect()
}

/// 将圆形替换为 `sides` 边多边形，其余几何原样返回。
pub fn normalize_geometry(geometry: &Geometry, sides: usize) -> Geometry {
    match geometry {
        Geometry::Circle { center, radius } => Geometry::circle_to_polygon(*center, *radius, sides),
        Geometry::GeometryCollection(children) => Geometry::GeometryCollection(
            children
                .iter()
                .map(|child| normalize_geometry(child, sides))
                .collect(),
        ),
        other => other.clone(),
    }
}

pub fn write_geometry(geometry: &Geometry, circle_sides: usize) -> GeoJsonGeometry {
    match geometry {
        Geometry::Point(point) => GeoJsonGeometry::Point {
            coordinates: point.to_array(),
        },
        Geometry::LineString(points) => GeoJsonGeometry::LineString {
            coordinates: coords(points),
        },
        Geometry::Polygon(polygon) => GeoJsonGeometry::Polygon {
            coordinates: rings(polygon),
        },
        Geometry::MultiPoint(points) => GeoJsonGeometry::MultiPoint {
            coordinates: coords(points),
        },
        Geometry::MultiLineString(lines) => GeoJsonGeometry::MultiLineString {
            coordinates: rings(lines),
        },
        Geometry::MultiPolygon(polygons) => GeoJsonGeometry::MultiPolygon {
            coordinates: polygons.iter().map(|polygon| rings(polygon)).collect(),
        },
        Geometry::Circle { center, radius } => write_geometry(
            &Geometry::circle_to_polygon(*center, *radius, circle_sides),
            circle_sides,
        ),
        Geometry::GeometryCollection(children) => GeoJsonGeometry::GeometryCollection {
            geometries: children
                .iter()
                .map(|child| write_geometry(child, circle_sides))
                .collect(),
        },
    }
}

pub fn write_feature(feature: &Feature, circle_sides: usize) -> GeoJsonFeature {
    GeoJsonFeature {
        id: feature.id.clone(),
        geometry: feature
            .geometry
            .as_ref()
            .map(|geometry| write_geometry(geometry, circle_sides)),
        properties: feature.properties.clone(),
    }
}
