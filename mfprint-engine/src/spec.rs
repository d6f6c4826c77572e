//! 打印服务所消费的 JSON 结构。字段名与服务端协议保持一致。

use std::fmt;

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::geojson::FeatureCollection;

/// 要素属性中记录样式规则编号的私有字段名。
pub const STYLE_PROPERTY: &str = "_mfp_style";
pub const STYLE_TABLE_VERSION: u32 = 2;
pub const PNG_FORMAT: &str = "image/png";

/// 由一个或多个样式编号（逗号拼接）构造规则键。
pub fn rule_key(joined_ids: &str) -> String {
    format!("[{STYLE_PROPERTY} = '{joined_ids}']")
}

/// 解析规则键，返回其中按序排列的样式编号。
pub fn rule_ids(key: &str) -> Option<Vec<&str>> {
    let joined = key
        .strip_prefix('[')?
        .strip_prefix(STYLE_PROPERTY)?
        .strip_prefix(" = '")?
        .strip_suffix("']")?;
    Some(joined.split(',').collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintSpec {
    pub attributes: Attributes,
    pub format: String,
    pub layout: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    pub map: MapSpec,
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSpec {
    #[serde(rename = "box", default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    pub center: [f64; 2],
    pub dpi: f64,
    pub layers: Vec<LayerSpec>,
    #[serde(rename = "pdfA", default, skip_serializing_if = "Option::is_none")]
    pub pdf_a: Option<bool>,
    pub projection: String,
    /// 以度为单位。
    pub rotation: f64,
    pub scale: f64,
    #[serde(
        rename = "useNearestScale",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub use_nearest_scale: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerSpec {
    Osm(OsmLayerSpec),
    Wmts(WmtsLayerSpec),
    Wms(WmsLayerSpec),
    Geojson(GeoJsonLayerSpec),
    Image(ImageLayerSpec),
}

impl LayerSpec {
    pub fn type_name(&self) -> &'static str {
        match self {
            LayerSpec::Osm(_) => "osm",
            LayerSpec::Wmts(_) => "wmts",
            LayerSpec::Wms(_) => "wms",
            LayerSpec::Geojson(_) => "geojson",
            LayerSpec::Image(_) => "image",
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            LayerSpec::Osm(spec) => spec.name.as_deref(),
            LayerSpec::Wmts(spec) => spec.name.as_deref(),
            LayerSpec::Wms(spec) => spec.name.as_deref(),
            LayerSpec::Geojson(spec) => spec.name.as_deref(),
            LayerSpec::Image(spec) => spec.name.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsmLayerSpec {
    #[serde(rename = "baseURL")]
    pub base_url: String,
    pub opacity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WmtsMatrix {
    pub identifier: String,
    pub scale_denominator: f64,
    pub tile_size: [u32; 2],
    pub top_left_corner: [f64; 2],
    pub matrix_size: [i64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WmtsLayerSpec {
    #[serde(rename = "baseURL")]
    pub base_url: String,
    pub dimensions: Vec<String>,
    pub dimension_params: IndexMap<String, String>,
    pub image_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub layer: String,
    pub matrices: Vec<WmtsMatrix>,
    pub matrix_set: String,
    pub opacity: f64,
    pub request_encoding: String,
    pub style: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WmsLayerSpec {
    #[serde(rename = "baseURL")]
    pub base_url: String,
    pub layers: Vec<String>,
    pub styles: Vec<String>,
    pub image_format: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub custom_params: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_type: Option<String>,
    pub use_native_angle: bool,
    pub opacity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoJsonLayerSpec {
    pub geo_json: FeatureCollection,
    pub opacity: f64,
    pub style: StyleRuleTable,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_as_svg: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLayerSpec {
    pub extent: [f64; 4],
    pub image_format: String,
    pub opacity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "baseURL")]
    pub base_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillProps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_opacity: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeProps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_dashstyle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_linecap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_linejoin: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointSymbolizer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_graphic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphic_opacity: Option<f64>,
    /// 打印服务将该字段解释为图标高度。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphic_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphic_x_offset: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphic_y_offset: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(flatten)]
    pub fill: FillProps,
    #[serde(flatten)]
    pub stroke: StrokeProps,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineSymbolizer {
    #[serde(flatten)]
    pub stroke: StrokeProps,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolygonSymbolizer {
    #[serde(flatten)]
    pub fill: FillProps,
    #[serde(flatten)]
    pub stroke: StrokeProps,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSymbolizer {
    pub label: String,
    pub font_family: String,
    pub label_x_offset: f64,
    pub label_y_offset: f64,
    pub label_align: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_rotation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halo_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halo_opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halo_radius: Option<f64>,
    #[serde(flatten)]
    pub fill: FillProps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Symbolizer {
    Point(PointSymbolizer),
    Line(LineSymbolizer),
    Polygon(PolygonSymbolizer),
    Text(TextSymbolizer),
}

impl Symbolizer {
    pub fn type_name(&self) -> &'static str {
        match self {
            Symbolizer::Point(_) => "point",
            Symbolizer::Line(_) => "line",
            Symbolizer::Polygon(_) => "polygon",
            Symbolizer::Text(_) => "text",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolizerList {
    pub symbolizers: Vec<Symbolizer>,
}

/// 样式规则表：`{"version": 2, "<规则键>": {"symbolizers": [...]}, ...}`，按插入顺序输出。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleRuleTable {
    rules: IndexMap<String, SymbolizerList>,
}

impl StyleRuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.rules.contains_key(key)
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&SymbolizerList> {
        self.rules.get(key)
    }

    /// 插入或覆盖规则，覆盖时保留原有位置。
    pub fn insert(&mut self, key: String, symbolizers: Vec<Symbolizer>) {
        self.rules.insert(key, SymbolizerList { symbolizers });
    }

    /// 除版本标记外是否没有任何规则。
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> impl Iterator<Item = (&str, &SymbolizerList)> {
        self.rules.iter().map(|(key, list)| (key.as_str(), list))
    }
}

impl Serialize for StyleRuleTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.rules.len() + 1))?;
        map.serialize_entry("version", &STYLE_TABLE_VERSION)?;
        for (key, list) in &self.rules {
            map.serialize_entry(key, list)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StyleRuleTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = IndexMap::<String, Value>::deserialize(deserializer)?;
        let mut table = StyleRuleTable::new();
        for (key, value) in raw {
            if key == "version" {
                let version = value
                    .as_u64()
                    .ok_or_else(|| D::Error::custom("style version must be an integer"))?;
                if version != u64::from(STYLE_TABLE_VERSION) {
                    return Err(D::Error::custom(UnsupportedVersion(version)));
                }
                continue;
            }
            let list: SymbolizerList = serde_json::from_value(value).map_err(D::Error::custom)?;
            table.rules.insert(key, list);
        }
        Ok(table)
    }
}

struct UnsupportedVersion(u64);

impl fmt::Display for UnsupportedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported style table version {}", self.0)
    }
}
