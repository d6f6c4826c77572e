//! 演示地图：OSM 底图加一组带样式的矢量要素。

use std::sync::Arc;

use mfprint_core::color::Color;
use mfprint_core::feature::{Feature, FeatureId};
use mfprint_core::geometry::{Geometry, Point2};
use mfprint_core::layer::{
    BaseRasterSource, Layer, LayerState, MapSnapshot, MapView, Source, VectorSource,
};
use mfprint_core::style::{
    CircleMarker, Fill, ImageStyle, LineCap, Stroke, Style, StyleLike, StyleResult, TextStyle,
};

/// 伯尔尼附近，EPSG:3857。
pub const CENTER: [f64; 2] = [828_000.0, 5_934_000.0];
pub const PROJECTION: &str = "EPSG:3857";
pub const SCALE: f64 = 25_000.0;

pub fn center() -> Point2 {
    Point2::new(CENTER[0], CENTER[1])
}

pub fn build_map() -> MapSnapshot {
    let background = Layer::new(Source::BaseRaster(BaseRasterSource::osm())).with_name("osm");
    let drawing = Layer::new(Source::VectorFeatures(drawing_features()))
        .with_name("drawing")
        .with_style(StyleLike::function(drawing_style));

    MapSnapshot::new(MapView::new(center(), PROJECTION))
        .with_layer(LayerState::new(Arc::new(background)))
        .with_layer(
            LayerState::new(Arc::new(drawing))
                .with_opacity(0.8)
                .with_z_index(1),
        )
}

fn drawing_features() -> VectorSource {
    let [x, y] = CENTER;
    VectorSource::new(vec![
        Feature::new(Geometry::Polygon(vec![vec![
            Point2::new(x - 400.0, y - 300.0),
            Point2::new(x + 200.0, y - 300.0),
            Point2::new(x + 200.0, y + 250.0),
            Point2::new(x - 400.0, y + 250.0),
            Point2::new(x - 400.0, y - 300.0),
        ]]))
        .with_id(FeatureId::Number(1))
        .with_property("label", "Perimeter"),
        Feature::new(Geometry::Circle {
            center: Point2::new(x + 500.0, y + 400.0),
            radius: 150.0,
        })
        .with_id(FeatureId::Number(2))
        .with_property("label", "Buffer"),
        Feature::new(Geometry::LineString(vec![
            Point2::new(x - 600.0, y - 500.0),
            Point2::new(x, y),
            Point2::new(x + 700.0, y + 100.0),
        ]))
        .with_id(FeatureId::Number(3))
        .with_property("label", "Route"),
        Feature::new(Geometry::Point(Point2::new(x + 50.0, y - 50.0)))
            .with_id(FeatureId::Number(4))
            .with_property("label", "Start"),
    ])
}

fn drawing_style(feature: &Feature, _resolution: f64) -> StyleResult {
    let fill = Arc::new(Fill::new(Color::rgba(255.0, 140.0, 0.0, 0.35)));
    let stroke = Arc::new(
        Stroke::new(Color::rgb(200.0, 60.0, 0.0), 2.0)
            .with_line_dash(vec![6.0, 4.0])
            .with_line_cap(LineCap::Round),
    );
    let marker = Arc::new(ImageStyle::Circle(
        CircleMarker::new(7.0)
            .with_fill(Arc::new(Fill::new(Color::css("#1e64c8"))))
            .with_stroke(Arc::new(Stroke::new(Color::rgb(255.0, 255.0, 255.0), 1.5))),
    ));
    let mut style = Style::new()
        .with_fill(fill)
        .with_stroke(stroke)
        .with_image(marker);
    if let Some(label) = feature.properties.get("label").and_then(|value| value.as_str()) {
        style = style.with_text(Arc::new(
            TextStyle::new(label)
                .with_font("bold 12px sans-serif")
                .with_offset(0.0, -14.0),
        ));
    }
    StyleResult::One(Arc::new(style))
}
