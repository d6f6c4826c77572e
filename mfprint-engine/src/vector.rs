use std::sync::Arc;

use mfprint_core::feature::Feature;
use mfprint_core::geometry::{Geometry, GeometryKind};
use mfprint_core::layer::{LayerState, VectorSource};
use mfprint_core::style::{Style, StyleLike};
use mfprint_core::units::CIRCLE_TO_POLYGON_SIDES;
use serde_json::Value;
use tracing::{debug, trace};

use crate::customizer::Customizer;
use crate::geojson::{self, FeatureCollection, GeoJsonFeature};
use crate::spec::{GeoJsonLayerSpec, STYLE_PROPERTY, StyleRuleTable, rule_key};
use crate::symbolizer::{StyleCategory, StyleIdentityCache, SymbolizerEncoder};

/// 解析要素样式：优先要素自身的样式，其次图层默认样式；空项被丢弃。
pub fn resolve_styles(
    feature: &Feature,
    layer_style: Option<&StyleLike>,
    resolution: f64,
) -> Vec<Arc<Style>> {
    feature
        .style
        .as_ref()
        .or(layer_style)
        .map(|style| style.resolve(feature, resolution).into_styles())
        .unwrap_or_default()
}

/// 单个矢量图层的编码器。标识缓存只在本实例内有效。
pub struct VectorEncoder<'a> {
    layer: &'a LayerState,
    customizer: &'a dyn Customizer,
    identities: StyleIdentityCache,
    circle_sides: usize,
}

impl<'a> VectorEncoder<'a> {
    pub fn new(layer: &'a LayerState, customizer: &'a dyn Customizer) -> Self {
        Self {
            layer,
            customizer,
            identities: StyleIdentityCache::new(),
            circle_sides: CIRCLE_TO_POLYGON_SIDES,
        }
    }

    pub fn with_circle_sides(mut self, sides: usize) -> Self {
        self.circle_sides = sides;
        self
    }

    /// 编码打印范围内的要素。没有任何可输出的要素或样式规则时返回 `None`，
    /// 打印服务不接受空的样式表。
    pub fn encode(&mut self, source: &VectorSource, resolution: f64) -> Option<GeoJsonLayerSpec> {
        let extent = self.customizer.print_extent();
        let features = source.features_in_extent(&extent);

        let mut table = StyleRuleTable::new();
        let mut output: Vec<GeoJsonFeature> = Vec::new();

        for feature in &features {
            self.encode_feature(feature, resolution, &mut output, &mut table);
        }

        if output.is_empty() || table.is_empty() {
            debug!(
                layer = ?self.layer.name(),
                features = output.len(),
                rules = table.len(),
                "矢量图层无可输出内容"
            );
            return None;
        }

        output.sort_by_key(GeoJsonFeature::is_point);

        Some(GeoJsonLayerSpec {
            geo_json: FeatureCollection { features: output },
            opacity: self.layer.opacity,
            style: table,
            name: self.layer.name().map(str::to_owned),
            render_as_svg: self.layer.layer.renderer_hint.render_as_svg,
        })
    }

    fn encode_feature(
        &mut self,
        feature: &Feature,
        resolution: f64,
        output: &mut Vec<GeoJsonFeature>,
        table: &mut StyleRuleTable,
    ) {
        let styles = resolve_styles(feature, self.layer.layer.style.as_ref(), resolution);
        if styles.is_empty() {
            trace!(layer = ?self.layer.name(), "要素无样式，跳过");
            return;
        }

        let normalized;
        let feature = match &feature.geometry {
            Some(circle @ Geometry::Circle { .. }) => {
                normalized =
                    feature.with_geometry(geojson::normalize_geometry(circle, self.circle_sides));
                &normalized
            }
            _ => feature,
        };

        let original = geojson::write_feature(feature, self.circle_sides);
        let mut original_index: Option<usize> = None;

        for style in &styles {
            let (index, kind) = match &style.geometry {
                Some(geometry) => {
                    let geometry = geojson::normalize_geometry(geometry, self.circle_sides);
                    let kind = geometry.kind();
                    output.push(geojson::write_feature(
                        &feature.with_geometry(geometry),
                        self.circle_sides,
                    ));
                    (output.len() - 1, kind)
                }
                None => {
                    let Some(geometry) = feature.geometry.as_ref() else {
                        continue;
                    };
                    if !self.customizer.geometry_filter(geometry) {
                        continue;
                    }
                    let index = *original_index.get_or_insert_with(|| {
                        output.push(original.clone());
                        output.len() - 1
                    });
                    (index, geometry.kind())
                }
            };
            self.add_style(table, &mut output[index], kind, style);
        }
    }

    /// 为 (要素, 样式) 记录规则。同一要素命中多个样式时，合并规则键为逗号拼接的编号，
    /// 其符号列表为已有组合与新样式符号的顺序拼接。
    fn add_style(
        &mut self,
        table: &mut StyleRuleTable,
        feature: &mut GeoJsonFeature,
        kind: GeometryKind,
        style: &Style,
    ) {
        let id = self.identities.id_for(style);
        let key = rule_key(&id);

        let has_symbolizer = if table.contains(&key) {
            true
        } else {
            let symbolizers = match StyleCategory::try_from(kind) {
                Ok(category) => {
                    SymbolizerEncoder::new(self.layer, self.customizer).encode(category, style)
                }
                Err(err) => {
                    debug!(layer = ?self.layer.name(), error = %err, "几何类别不受支持");
                    Vec::new()
                }
            };
            if symbolizers.is_empty() {
                false
            } else {
                table.insert(key.clone(), symbolizers);
                true
            }
        };
        if !has_symbolizer {
            return;
        }

        self.customizer.feature(self.layer, feature);

        let existing = feature
            .properties
            .get(STYLE_PROPERTY)
            .and_then(Value::as_str)
            .map(str::to_owned);
        let joined = match existing {
            Some(existing) => {
                let merged_ids = format!("{existing},{id}");
                let mut merged = table
                    .get(&rule_key(&existing))
                    .map(|list| list.symbolizers.clone())
                    .unwrap_or_default();
                if let Some(list) = table.get(&key) {
                    merged.extend(list.symbolizers.iter().cloned());
                }
                table.insert(rule_key(&merged_ids), merged);
                merged_ids
            }
            None => id,
        };
        feature
            .properties
            .insert(STYLE_PROPERTY.to_string(), Value::String(joined));
    }
}

#[cfg(test)]
mod tests {
    use mfprint_core::color::Color;
    use mfprint_core::feature::FeatureId;
    use mfprint_core::geometry::{Extent, Point2};
    use mfprint_core::layer::{Layer, Source};
    use mfprint_core::style::{Fill, Stroke, StyleResult, TextStyle};

    use super::*;
    use crate::customizer::BaseCustomizer;
    use crate::geojson::GeoJsonGeometry;
    use crate::spec::rule_ids;

    fn square(offset: f64) -> Geometry {
        Geometry::Polygon(vec![vec![
            Point2::new(offset, offset),
            Point2::new(offset + 1.0, offset),
            Point2::new(offset + 1.0, offset + 1.0),
            Point2::new(offset, offset),
        ]])
    }

    fn state(style: Option<StyleLike>) -> LayerState {
        let mut layer =
            Layer::new(Source::VectorFeatures(VectorSource::default())).with_name("vector");
        layer.style = style;
        LayerState::new(Arc::new(layer)).with_opacity(0.8)
    }

    fn customizer() -> BaseCustomizer {
        BaseCustomizer::new(Extent::new(0.0, 0.0, 100.0, 100.0))
    }

    #[test]
    fn points_are_sorted_after_other_geometries() {
        let style = Arc::new(
            Style::new()
                .with_fill(Arc::new(Fill::new(Color::rgb(0.0, 0.0, 0.0))))
                .with_stroke(Arc::new(Stroke::new(Color::rgb(0.0, 0.0, 0.0), 1.0)))
                .with_text(Arc::new(TextStyle::new("x"))),
        );
        let layer = state(Some(style.into()));
        let source = VectorSource::new(vec![
            Feature::new(Geometry::Point(Point2::new(1.0, 1.0))).with_id(FeatureId::Number(1)),
            Feature::new(square(2.0)).with_id(FeatureId::Number(2)),
            Feature::new(Geometry::Point(Point2::new(3.0, 3.0))).with_id(FeatureId::Number(3)),
            Feature::new(Geometry::LineString(vec![Point2::new(0.0, 0.0), Point2::new(5.0, 5.0)]))
                .with_id(FeatureId::Number(4)),
        ]);

        let customizer = customizer();
        let spec = VectorEncoder::new(&layer, &customizer)
            .encode(&source, 1.0)
            .expect("图层应有输出");
        let ids: Vec<_> = spec
            .geo_json
            .features
            .iter()
            .map(|feature| feature.id.clone())
            .collect();
        assert_eq!(
            ids,
            vec![
                Some(FeatureId::Number(2)),
                Some(FeatureId::Number(4)),
                Some(FeatureId::Number(1)),
                Some(FeatureId::Number(3)),
            ]
        );
        assert_eq!(spec.opacity, 0.8);
        assert_eq!(spec.name.as_deref(), Some("vector"));
    }

    #[test]
    fn layer_without_styled_features_yields_nothing() {
        let customizer = customizer();
        let empty = state(None);
        assert!(VectorEncoder::new(&empty, &customizer)
            .encode(&VectorSource::default(), 1.0)
            .is_none());

        let unstyled = state(Some(StyleLike::Static(StyleResult::None)));
        let source = VectorSource::new(vec![Feature::new(square(1.0))]);
        assert!(VectorEncoder::new(&unstyled, &customizer)
            .encode(&source, 1.0)
            .is_none());

        // 样式存在但对该几何类别没有任何符号
        let stroke_only = state(Some(
            Arc::new(
                Style::new().with_stroke(Arc::new(Stroke::new(Color::rgb(1.0, 1.0, 1.0), 1.0))),
            )
            .into(),
        ));
        let points = VectorSource::new(vec![Feature::new(Geometry::Point(Point2::new(1.0, 1.0)))]);
        assert!(VectorEncoder::new(&stroke_only, &customizer)
            .encode(&points, 1.0)
            .is_none());
    }

    #[test]
    fn multiple_styles_merge_rule_keys() {
        let outline = Arc::new(
            Style::new().with_stroke(Arc::new(Stroke::new(Color::rgb(255.0, 0.0, 0.0), 2.0))),
        );
        let label = Arc::new(Style::new().with_text(Arc::new(TextStyle::new("river"))));
        let styles = StyleLike::Static(StyleResult::Many(vec![
            Some(outline.clone()),
            None,
            Some(label.clone()),
        ]));
        let layer = state(Some(styles));
        let source = VectorSource::new(vec![
            Feature::new(Geometry::LineString(vec![Point2::new(0.0, 0.0), Point2::new(1.0, 1.0)])),
            Feature::new(Geometry::MultiLineString(vec![vec![
                Point2::new(2.0, 2.0),
                Point2::new(3.0, 3.0),
            ]])),
        ]);

        let customizer = customizer();
        let spec = VectorEncoder::new(&layer, &customizer)
            .encode(&source, 1.0)
            .expect("图层应有输出");
        assert_eq!(spec.geo_json.features.len(), 2);
        for feature in &spec.geo_json.features {
            assert_eq!(feature.properties[STYLE_PROPERTY], Value::String("1,2".into()));
        }

        assert_eq!(spec.style.len(), 3);
        for (key, list) in spec.style.rules() {
            let ids = rule_ids(key).expect("规则键格式");
            let expected: Vec<_> = ids
                .iter()
                .flat_map(|id| spec.style.get(&rule_key(id)).expect("单样式规则").symbolizers.clone())
                .collect();
            assert_eq!(list.symbolizers, expected);
        }
    }

    #[test]
    fn style_geometry_adds_a_separate_feature() {
        let fill = Arc::new(Fill::new(Color::rgb(0.0, 255.0, 0.0)));
        let body = Arc::new(Style::new().with_fill(fill));
        let anchor = Arc::new(
            Style::new()
                .with_geometry(Geometry::Point(Point2::new(0.5, 0.5)))
                .with_text(Arc::new(TextStyle::new("label"))),
        );
        let layer = state(Some(StyleLike::Static(StyleResult::from(vec![body, anchor]))));
        let source = VectorSource::new(vec![Feature::new(square(0.0)).with_property("name", "a")]);

        let customizer = customizer();
        let spec = VectorEncoder::new(&layer, &customizer)
            .encode(&source, 1.0)
            .expect("图层应有输出");
        let features = &spec.geo_json.features;
        assert_eq!(features.len(), 2);
        assert!(matches!(features[0].geometry, Some(GeoJsonGeometry::Polygon { .. })));
        assert!(features[1].is_point());
        assert_eq!(features[1].properties["name"], Value::String("a".into()));
        assert_eq!(features[0].properties[STYLE_PROPERTY], Value::String("1".into()));
        assert_eq!(features[1].properties[STYLE_PROPERTY], Value::String("2".into()));
    }

    struct RejectPolygons(BaseCustomizer);

    impl Customizer for RejectPolygons {
        fn print_extent(&self) -> Extent {
            self.0.print_extent()
        }

        fn geometry_filter(&self, geometry: &Geometry) -> bool {
            geometry.kind() != GeometryKind::Polygon
        }
    }

    #[test]
    fn geometry_filter_skips_rejected_originals() {
        let style = Arc::new(
            Style::new()
                .with_fill(Arc::new(Fill::new(Color::rgb(0.0, 0.0, 0.0))))
                .with_stroke(Arc::new(Stroke::new(Color::rgb(0.0, 0.0, 0.0), 1.0))),
        );
        let layer = state(Some(style.into()));
        let source = VectorSource::new(vec![
            Feature::new(square(1.0)),
            Feature::new(Geometry::LineString(vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)])),
        ]);
        let customizer = RejectPolygons(customizer());
        let spec = VectorEncoder::new(&layer, &customizer)
            .encode(&source, 1.0)
            .expect("图层应有输出");
        assert_eq!(spec.geo_json.features.len(), 1);
        assert_eq!(
            spec.geo_json.features[0].geometry.as_ref().map(GeoJsonGeometry::type_name),
            Some("LineString")
        );
    }

    #[test]
    fn circles_become_polygons_with_configured_sides() {
        let style =
            Arc::new(Style::new().with_fill(Arc::new(Fill::new(Color::rgb(9.0, 9.0, 9.0)))));
        let layer = state(Some(style.into()));
        let source = VectorSource::new(vec![Feature::new(Geometry::Circle {
            center: Point2::new(10.0, 10.0),
            radius: 3.0,
        })]);
        let customizer = customizer();
        let spec = VectorEncoder::new(&layer, &customizer)
            .with_circle_sides(6)
            .encode(&source, 1.0)
            .expect("图层应有输出");
        match &spec.geo_json.features[0].geometry {
            Some(GeoJsonGeometry::Polygon { coordinates }) => assert_eq!(coordinates[0].len(), 7),
            other => panic!("unexpected geometry {other:?}"),
        }
        let json = serde_json::to_string(&spec).expect("序列化图层");
        assert!(!json.contains("Circle"));
    }
}
