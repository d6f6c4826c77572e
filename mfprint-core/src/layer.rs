//! 图层、数据源与地图快照。

use std::sync::Arc;

use indexmap::IndexMap;

use crate::feature::Feature;
use crate::geometry::{Extent, Point2};
use crate::style::StyleLike;

/// 渲染器提示：是否以 SVG 渲染矢量，是否将矢量栅格化为图片。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RendererHint {
    pub render_as_svg: Option<bool>,
    pub rasterize: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Layer {
    pub name: Option<String>,
    pub source: Option<Source>,
    pub style: Option<StyleLike>,
    pub renderer_hint: RendererHint,
}

impl Layer {
    pub fn new(source: Source) -> Self {
        Self {
            source: Some(source),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_style(mut self, style: StyleLike) -> Self {
        self.style = Some(style);
        self
    }

    pub fn with_renderer_hint(mut self, hint: RendererHint) -> Self {
        self.renderer_hint = hint;
        self
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// 图层在地图中的有效状态（已合并组的可见性、透明度与分辨率范围）。
#[derive(Debug, Clone)]
pub struct LayerState {
    pub layer: Arc<Layer>,
    pub visible: bool,
    pub opacity: f64,
    pub z_index: Option<i32>,
    pub min_resolution: f64,
    pub max_resolution: f64,
}

impl LayerState {
    pub fn new(layer: Arc<Layer>) -> Self {
        Self {
            layer,
            visible: true,
            opacity: 1.0,
            z_index: None,
            min_resolution: 0.0,
            max_resolution: f64::INFINITY,
        }
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_z_index(mut self, z_index: i32) -> Self {
        self.z_index = Some(z_index);
        self
    }

    pub fn with_resolution_range(mut self, min: f64, max: f64) -> Self {
        self.min_resolution = min;
        self.max_resolution = max;
        self
    }

    /// 半开区间 `[min, max)`。
    #[inline]
    pub fn is_within_resolution(&self, resolution: f64) -> bool {
        resolution >= self.min_resolution && resolution < self.max_resolution
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.layer.name()
    }
}

#[derive(Debug, Clone)]
pub enum Source {
    /// 公共底图瓦片（如 OpenStreetMap）。
    BaseRaster(BaseRasterSource),
    TiledMatrixSet(WmtsSource),
    DynamicImage(WmsSource),
    VectorFeatures(VectorSource),
    VectorTile(VectorTileSource),
}

impl Source {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Source::BaseRaster(_) => "base-raster",
            Source::TiledMatrixSet(_) => "tiled-matrix-set",
            Source::DynamicImage(_) => "dynamic-image",
            Source::VectorFeatures(_) => "vector-features",
            Source::VectorTile(_) => "vector-tile",
        }
    }
}

pub const OSM_TILE_URL: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";

#[derive(Debug, Clone, PartialEq)]
pub struct BaseRasterSource {
    pub urls: Vec<String>,
}

impl BaseRasterSource {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }

    pub fn osm() -> Self {
        Self::new(vec![OSM_TILE_URL.to_string()])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestEncoding {
    #[default]
    Kvp,
    Rest,
}

impl RequestEncoding {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestEncoding::Kvp => "KVP",
            RequestEncoding::Rest => "REST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub min_x: i64,
    pub max_x: i64,
    pub min_y: i64,
    pub max_y: i64,
}

impl TileRange {
    /// 闭区间内的瓦片行列数 `[列, 行]`。
    pub fn size(&self) -> [i64; 2] {
        [self.max_x - self.min_x + 1, self.max_y - self.min_y + 1]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileMatrix {
    pub identifier: String,
    pub resolution: f64,
    pub tile_size: [u32; 2],
    pub origin: Point2,
    pub tile_range: TileRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileMatrixSet {
    pub meters_per_unit: f64,
    pub matrices: Vec<TileMatrix>,
}

#[derive(Debug, Clone, Default)]
pub struct WmtsSource {
    pub urls: Vec<String>,
    pub layer: String,
    pub matrix_set: String,
    pub format: String,
    pub style: String,
    pub version: String,
    pub request_encoding: RequestEncoding,
    pub dimensions: IndexMap<String, String>,
    pub tile_grid: Option<TileMatrixSet>,
}

#[derive(Debug, Clone, Default)]
pub struct WmsSource {
    pub url: String,
    pub params: IndexMap<String, String>,
    pub server_type: Option<String>,
    pub tiled: bool,
}

impl WmsSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_server_type(mut self, server_type: impl Into<String>) -> Self {
        self.server_type = Some(server_type.into());
        self
    }

    pub fn with_tiled(mut self, tiled: bool) -> Self {
        self.tiled = tiled;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct VectorSource {
    features: Vec<Arc<Feature>>,
}

impl VectorSource {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            features: features.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn add_feature(&mut self, feature: Feature) {
        self.features.push(Arc::new(feature));
    }

    #[inline]
    pub fn features(&self) -> &[Arc<Feature>] {
        &self.features
    }

    /// 几何范围与 `extent` 相交的要素，保持插入顺序；无几何的要素不返回。
    pub fn features_in_extent(&self, extent: &Extent) -> Vec<Arc<Feature>> {
        self.features
            .iter()
            .filter(|feature| {
                feature
                    .geometry
                    .as_ref()
                    .and_then(|geometry| geometry.extent())
                    .is_some_and(|bounds| bounds.intersects(extent))
            })
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorTileSource {
    pub urls: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LayerGroup {
    pub visible: bool,
    pub opacity: f64,
    pub z_index: Option<i32>,
    pub min_resolution: f64,
    pub max_resolution: f64,
    pub children: Vec<LayerTree>,
}

impl LayerGroup {
    pub fn new(children: Vec<LayerTree>) -> Self {
        Self {
            visible: true,
            opacity: 1.0,
            z_index: None,
            min_resolution: 0.0,
            max_resolution: f64::INFINITY,
            children,
        }
    }
}

/// 图层树。打印只关心展平后的叶子图层。
#[derive(Debug, Clone)]
pub enum LayerTree {
    Layer(LayerState),
    Group(LayerGroup),
}

impl LayerTree {
    /// 按文档顺序展平：透明度相乘、可见性取与、分辨率范围取交集，子项未设置层级时继承组层级。
    pub fn flatten(&self) -> Vec<LayerState> {
        let mut out = Vec::new();
        self.flatten_into(None, &mut out);
        out
    }

    fn flatten_into(&self, parent: Option<&LayerGroup>, out: &mut Vec<LayerState>) {
        match self {
            LayerTree::Layer(state) => {
                let mut state = state.clone();
                if let Some(group) = parent {
                    state.visible &= group.visible;
                    state.opacity *= group.opacity;
                    state.min_resolution = state.min_resolution.max(group.min_resolution);
                    state.max_resolution = state.max_resolution.min(group.max_resolution);
                    if state.z_index.is_none() {
                        state.z_index = group.z_index;
                    }
                }
                out.push(state);
            }
            LayerTree::Group(group) => {
                let merged = match parent {
                    Some(outer) => LayerGroup {
                        visible: group.visible && outer.visible,
                        opacity: group.opacity * outer.opacity,
                        z_index: group.z_index.or(outer.z_index),
                        min_resolution: group.min_resolution.max(outer.min_resolution),
                        max_resolution: group.max_resolution.min(outer.max_resolution),
                        children: Vec::new(),
                    },
                    None => LayerGroup {
                        children: Vec::new(),
                        ..group.clone()
                    },
                };
                for child in &group.children {
                    child.flatten_into(Some(&merged), out);
                }
            }
        }
    }
}

impl From<LayerState> for LayerTree {
    fn from(value: LayerState) -> Self {
        LayerTree::Layer(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapView {
    pub center: Point2,
    pub rotation: f64,
    pub projection: String,
}

impl MapView {
    pub fn new(center: Point2, projection: impl Into<String>) -> Self {
        Self {
            center,
            rotation: 0.0,
            projection: projection.into(),
        }
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }
}

/// 打印时刻的地图快照：视图参数加图层树。
#[derive(Debug, Clone)]
pub struct MapSnapshot {
    pub view: MapView,
    pub layers: Vec<LayerTree>,
}

impl MapSnapshot {
    pub fn new(view: MapView) -> Self {
        Self {
            view,
            layers: Vec::new(),
        }
    }

    pub fn with_layer(mut self, layer: impl Into<LayerTree>) -> Self {
        self.layers.push(layer.into());
        self
    }

    pub fn layer_states(&self) -> Vec<LayerState> {
        self.layers.iter().flat_map(LayerTree::flatten).collect()
    }
}
