use std::cell::Cell;
use std::sync::Arc;

use base64::Engine;
use mfprint_core::color::Color;
use mfprint_core::feature::Feature;
use mfprint_core::geometry::{Extent, Geometry, Point2};
use mfprint_core::layer::{
    Layer, LayerState, MapSnapshot, MapView, RendererHint, Source, TileMatrix, TileMatrixSet,
    TileRange, VectorSource, WmsSource, WmtsSource,
};
use mfprint_core::style::{
    CircleMarker, Fill, ImageStyle, Stroke, Style, StyleLike, StyleResult, TextStyle,
};
use mfprint_core::units;
use mfprint_engine::Customizer;
use mfprint_engine::geojson::GeoJsonFeature;
use mfprint_engine::spec::{
    ImageLayerSpec, LayerSpec, LineSymbolizer, PointSymbolizer, PrintSpec, Symbolizer,
    TextSymbolizer, WmsLayerSpec, WmtsLayerSpec,
};
use mfprint_engine::{EncodeOptions, PrintEncoder, SpecOptions};
use serde_json::{Value, json};
use tiny_skia::{Paint, Pixmap, Rect, Transform};

const CENTER: [f64; 2] = [2_600_000.0, 1_200_000.0];
const SCALE: f64 = 10_000.0;

/// 每个后处理钩子都留下可观察的修改。
struct Retouch {
    extent: Extent,
    decorated: Cell<usize>,
}

impl Retouch {
    fn new() -> Self {
        Self {
            extent: units::print_extent([555.0, 675.0], center(), SCALE),
            decorated: Cell::new(0),
        }
    }
}

impl Customizer for Retouch {
    fn print_extent(&self) -> Extent {
        self.extent
    }

    fn feature(&self, _layer: &LayerState, feature: &mut GeoJsonFeature) {
        feature.properties.insert("checked".into(), json!(true));
    }

    fn line(&self, _layer: &LayerState, symbolizer: &mut LineSymbolizer, stroke: &Stroke) {
        symbolizer.stroke.stroke_width = stroke.width.map(|width| width * 3.0);
    }

    fn point(&self, _layer: &LayerState, symbolizer: &mut PointSymbolizer, _image: &ImageStyle) {
        symbolizer.graphic_opacity = Some(0.25);
    }

    fn text(&self, _layer: &LayerState, symbolizer: &mut TextSymbolizer, text: &TextStyle) {
        symbolizer.label = format!("{}!", text.text.as_deref().unwrap_or_default());
    }

    fn wmts_layer(&self, _layer: &LayerState, spec: &mut WmtsLayerSpec, source: &WmtsSource) {
        spec.layer = format!("{}-night", source.layer);
    }

    fn wms_layer(&self, _layer: &LayerState, spec: &mut WmsLayerSpec, _source: &WmsSource) {
        spec.custom_params.insert("TIME".into(), "2024-05-01".into());
    }

    fn image_layer(&self, _layer: &LayerState, spec: &mut ImageLayerSpec) {
        spec.name = Some("retouched".into());
    }

    fn decorate_raster(&self, pixmap: &mut Pixmap, _geometry: &Geometry) {
        self.decorated.set(self.decorated.get() + 1);
        let mut paint = Paint::default();
        paint.set_color_rgba8(255, 0, 255, 255);
        if let Some(rect) = Rect::from_xywh(0.0, 0.0, 2.0, 2.0) {
            pixmap.fill_rect(rect, &paint, Transform::identity(), None);
        }
    }
}

fn center() -> Point2 {
    Point2::new(CENTER[0], CENTER[1])
}

fn create(map: &MapSnapshot, resolution: f64, customizer: &Retouch) -> PrintSpec {
    PrintEncoder::new().create_spec(
        map,
        &EncodeOptions::new(SCALE, resolution, 254.0),
        SpecOptions::new("A4 portrait", "pdf"),
        customizer,
    )
}

fn map_with(layer: Layer) -> MapSnapshot {
    MapSnapshot::new(MapView::new(center(), "EPSG:2056"))
        .with_layer(LayerState::new(Arc::new(layer)))
}

/// 每个要素各得一个新样式，点与线因此各自产生规则。
fn fresh_style(_feature: &Feature, _resolution: f64) -> StyleResult {
    let stroke = Arc::new(Stroke::new(Color::rgb(0.0, 0.0, 255.0), 2.0));
    StyleResult::One(Arc::new(
        Style::new()
            .with_stroke(stroke.clone())
            .with_image(Arc::new(ImageStyle::Circle(
                CircleMarker::new(5.0).with_fill(Arc::new(Fill::new(Color::css("#ff0000")))),
            )))
            .with_text(Arc::new(TextStyle::new("Gate"))),
    ))
}

#[test]
fn vector_hooks_edit_symbolizers_and_features() {
    let [cx, cy] = CENTER;
    let features = VectorSource::new(vec![
        Feature::new(Geometry::Point(center())),
        Feature::new(Geometry::LineString(vec![
            Point2::new(cx - 40.0, cy),
            Point2::new(cx + 40.0, cy),
        ])),
    ]);
    let layer = Layer::new(Source::VectorFeatures(features))
        .with_name("drawing")
        .with_style(StyleLike::function(fresh_style));
    let customizer = Retouch::new();
    let spec = create(&map_with(layer), 1.0, &customizer);

    let LayerSpec::Geojson(geojson) = &spec.attributes.map.layers[0] else {
        panic!("应输出 geojson 片段");
    };
    assert_eq!(geojson.geo_json.features.len(), 2);
    assert!(
        geojson
            .geo_json
            .features
            .iter()
            .all(|feature| feature.properties["checked"] == Value::Bool(true))
    );

    let symbolizers: Vec<&Symbolizer> = geojson
        .style
        .rules()
        .flat_map(|(_, list)| list.symbolizers.iter())
        .collect();
    let lines: Vec<_> = symbolizers
        .iter()
        .filter_map(|symbolizer| match symbolizer {
            Symbolizer::Line(line) => Some(line),
            _ => None,
        })
        .collect();
    assert!(!lines.is_empty());
    assert!(lines.iter().all(|line| line.stroke.stroke_width == Some(6.0)));

    let points: Vec<_> = symbolizers
        .iter()
        .filter_map(|symbolizer| match symbolizer {
            Symbolizer::Point(point) => Some(point),
            _ => None,
        })
        .collect();
    assert!(!points.is_empty());
    assert!(points.iter().all(|point| point.graphic_opacity == Some(0.25)));

    let labels: Vec<_> = symbolizers
        .iter()
        .filter_map(|symbolizer| match symbolizer {
            Symbolizer::Text(text) => Some(text.label.as_str()),
            _ => None,
        })
        .collect();
    assert!(!labels.is_empty());
    assert!(labels.iter().all(|label| *label == "Gate!"));
}

#[test]
fn wmts_hook_rewrites_the_layer_name() {
    let source = WmtsSource {
        urls: vec!["https://tiles.example.org/wmts".into()],
        layer: "ortho".into(),
        matrix_set: "2056".into(),
        format: "image/jpeg".into(),
        style: "default".into(),
        version: "1.0.0".into(),
        tile_grid: Some(TileMatrixSet {
            meters_per_unit: 1.0,
            matrices: vec![TileMatrix {
                identifier: "20".into(),
                resolution: 0.28,
                tile_size: [256, 256],
                origin: Point2::new(2_420_000.0, 1_350_000.0),
                tile_range: TileRange {
                    min_x: 0,
                    max_x: 3,
                    min_y: 0,
                    max_y: 1,
                },
            }],
        }),
        ..WmtsSource::default()
    };
    let layer = Layer::new(Source::TiledMatrixSet(source)).with_name("ortho");
    let spec = create(&map_with(layer), 1.0, &Retouch::new());
    let value = serde_json::to_value(&spec).expect("序列化打印规格");
    let fragment = &value["attributes"]["map"]["layers"][0];
    assert_eq!(fragment["type"], json!("wmts"));
    assert_eq!(fragment["layer"], json!("ortho-night"));
}

#[test]
fn wms_hook_adds_custom_params() {
    let source = WmsSource::new("https://maps.example.org/wms")
        .with_param("LAYERS", "roads,rivers")
        .with_param("TRANSPARENT", "true");
    let layer = Layer::new(Source::DynamicImage(source)).with_name("overlay");
    let spec = create(&map_with(layer), 1.0, &Retouch::new());
    let value = serde_json::to_value(&spec).expect("序列化打印规格");
    let fragment = &value["attributes"]["map"]["layers"][0];
    assert_eq!(fragment["type"], json!("wms"));
    assert_eq!(fragment["layers"], json!(["roads", "rivers"]));
    assert_eq!(
        fragment["customParams"],
        json!({ "TRANSPARENT": "true", "TIME": "2024-05-01" })
    );
}

#[test]
fn raster_hooks_decorate_pixels_and_rename_the_image() {
    let [cx, cy] = CENTER;
    let features = VectorSource::new(vec![Feature::new(Geometry::Polygon(vec![vec![
        Point2::new(cx - 20.0, cy - 20.0),
        Point2::new(cx + 20.0, cy - 20.0),
        Point2::new(cx + 20.0, cy + 20.0),
        Point2::new(cx - 20.0, cy - 20.0),
    ]]))]);
    let fill = Arc::new(Style::new().with_fill(Arc::new(Fill::new(Color::rgb(0.0, 128.0, 0.0)))));
    let layer = Layer::new(Source::VectorFeatures(features))
        .with_name("heat")
        .with_style(fill.into())
        .with_renderer_hint(RendererHint {
            rasterize: true,
            ..RendererHint::default()
        });
    let customizer = Retouch::new();
    let spec = create(&map_with(layer), 10.0, &customizer);

    let LayerSpec::Image(image) = &spec.attributes.map.layers[0] else {
        panic!("应输出 image 片段");
    };
    assert_eq!(image.name.as_deref(), Some("retouched"));
    assert_eq!(customizer.decorated.get(), 1);

    let encoded = image
        .base_url
        .strip_prefix("data:image/png;base64,")
        .expect("PNG 数据地址");
    let png = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .expect("解码 base64");
    let pixmap = Pixmap::decode_png(&png).expect("解码 PNG");
    let corner = pixmap.pixel(0, 0).expect("左上角像素");
    assert_eq!(
        (corner.red(), corner.green(), corner.blue(), corner.alpha()),
        (255, 0, 255, 255)
    );
    // 装饰之外的角落保持透明
    let far = pixmap
        .pixel(pixmap.width() - 1, pixmap.height() - 1)
        .expect("右下角像素");
    assert_eq!(far.alpha(), 0);
}
