//! 图层分派：按层级排序、过滤并逐层编码，最终拼装打印规格。

use mfprint_core::geometry::Extent;
use mfprint_core::layer::{LayerState, MapSnapshot, Source, VectorTileSource};
use mfprint_core::units::CIRCLE_TO_POLYGON_SIDES;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::customizer::Customizer;
use crate::errors::EncodeError;
use crate::raster::RasterRenderer;
use crate::spec::{
    Attributes, ImageLayerSpec, LayerSpec, MapSpec, OsmLayerSpec, PNG_FORMAT, PrintSpec,
};
use crate::vector::VectorEncoder;
use crate::wmts;

/// 模板的数据源属性；未自定义时输出空数组。
pub const DATASOURCE_ATTRIBUTE: &str = "datasource";

/// 矢量瓦片的合成参数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorTileRequest {
    pub print_extent: Extent,
    pub tile_resolution: f64,
    pub style_resolution: f64,
    pub canvas_size: [f64; 2],
}

/// 合成结果：一幅覆盖 `extent` 的图片。
#[derive(Debug, Clone, PartialEq)]
pub struct VectorTileImage {
    pub extent: [f64; 4],
    pub base_url: String,
}

/// 外部的矢量瓦片合成器。
pub trait VectorTileCompositor {
    fn compose(
        &self,
        layer: &LayerState,
        source: &VectorTileSource,
        request: &VectorTileRequest,
    ) -> Result<Vec<VectorTileImage>, EncodeError>;
}

/// 比这更短的 data URL 不含图像数据。
const MIN_IMAGE_URL_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeOptions {
    pub scale: f64,
    pub print_resolution: f64,
    pub dpi: f64,
    pub pdf_a: Option<bool>,
}

impl EncodeOptions {
    pub fn new(scale: f64, print_resolution: f64, dpi: f64) -> Self {
        Self {
            scale,
            print_resolution,
            dpi,
            pdf_a: None,
        }
    }

    pub fn with_pdf_a(mut self, pdf_a: bool) -> Self {
        self.pdf_a = Some(pdf_a);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecOptions {
    pub layout: String,
    pub format: String,
    pub custom_attributes: Map<String, Value>,
}

impl SpecOptions {
    pub fn new(layout: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            layout: layout.into(),
            format: format.into(),
            custom_attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom_attributes.insert(key.into(), value.into());
        self
    }
}

pub struct PrintEncoder {
    circle_sides: usize,
    raster: RasterRenderer,
    compositor: Option<Box<dyn VectorTileCompositor>>,
}

impl Default for PrintEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PrintEncoder {
    pub fn new() -> Self {
        Self {
            circle_sides: CIRCLE_TO_POLYGON_SIDES,
            raster: RasterRenderer::new(),
            compositor: None,
        }
    }

    pub fn with_circle_sides(mut self, sides: usize) -> Self {
        self.circle_sides = sides;
        self
    }

    pub fn with_compositor(mut self, compositor: Box<dyn VectorTileCompositor>) -> Self {
        self.compositor = Some(compositor);
        self
    }

    /// 生成完整打印规格，自定义属性与 `map` 并列放入 `attributes`。
    pub fn create_spec(
        &mut self,
        map: &MapSnapshot,
        options: &EncodeOptions,
        spec: SpecOptions,
        customizer: &dyn Customizer,
    ) -> PrintSpec {
        let map_spec = self.encode_map(map, options, customizer);
        let mut custom = spec.custom_attributes;
        if custom.remove("map").is_some() {
            warn!("自定义属性中的 map 与地图规格冲突，已忽略");
        }
        custom
            .entry(DATASOURCE_ATTRIBUTE)
            .or_insert_with(|| Value::Array(Vec::new()));
        PrintSpec {
            attributes: Attributes {
                map: map_spec,
                custom,
            },
            format: spec.format,
            layout: spec.layout,
        }
    }

    pub fn encode_map(
        &mut self,
        map: &MapSnapshot,
        options: &EncodeOptions,
        customizer: &dyn Customizer,
    ) -> MapSpec {
        let layers = self.encode_layers(&map.layer_states(), options.print_resolution, customizer);
        info!(
            layers = layers.len(),
            scale = options.scale,
            dpi = options.dpi,
            "地图规格已生成"
        );
        MapSpec {
            bbox: None,
            center: map.view.center.to_array(),
            dpi: options.dpi,
            layers,
            pdf_a: options.pdf_a,
            projection: map.view.projection.clone(),
            rotation: map.view.rotation.to_degrees(),
            scale: options.scale,
            use_nearest_scale: None,
        }
    }

    /// 按层级升序稳定排序后整体反转，逐层顺序编码；单层失败只记录日志并跳过。
    pub fn encode_layers(
        &mut self,
        layers: &[LayerState],
        print_resolution: f64,
        customizer: &dyn Customizer,
    ) -> Vec<LayerSpec> {
        let mut accepted: Vec<&LayerState> = layers
            .iter()
            .filter(|layer| customizer.layer_filter(layer))
            .collect();
        accepted.sort_by_key(|layer| layer.z_index.unwrap_or(0));
        accepted.reverse();

        let mut out = Vec::new();
        for layer in accepted {
            match self.encode_layer(layer, print_resolution, customizer) {
                Ok(fragments) => out.extend(fragments),
                Err(err) => {
                    warn!(layer = ?layer.name(), error = %err, "图层编码失败，已跳过");
                }
            }
        }
        out
    }

    /// 编码单个图层，可能产生零个或多个片段。
    pub fn encode_layer(
        &mut self,
        layer: &LayerState,
        print_resolution: f64,
        customizer: &dyn Customizer,
    ) -> Result<Vec<LayerSpec>, EncodeError> {
        if !layer.visible || !layer.is_within_resolution(print_resolution) {
            debug!(layer = ?layer.name(), "图层不可见或超出分辨率范围");
            return Ok(Vec::new());
        }
        let Some(source) = layer.layer.source.as_ref() else {
            debug!(layer = ?layer.name(), "图层没有数据源");
            return Ok(Vec::new());
        };

        let fragments = match source {
            Source::BaseRaster(raster) => {
                let base_url = raster.urls.first().cloned().ok_or_else(|| {
                    EncodeError::MissingUrl {
                        layer: layer.name().map(str::to_owned),
                    }
                })?;
                vec![LayerSpec::Osm(OsmLayerSpec {
                    base_url,
                    opacity: layer.opacity,
                    name: layer.name().map(str::to_owned),
                })]
            }
            Source::TiledMatrixSet(tiled) => {
                vec![LayerSpec::Wmts(wmts::encode_wmts_layer(layer, tiled, customizer)?)]
            }
            Source::DynamicImage(dynamic) => {
                vec![LayerSpec::Wms(wmts::encode_wms_layer(layer, dynamic, customizer)?)]
            }
            Source::VectorTile(tiles) => {
                self.encode_vector_tiles(layer, tiles, print_resolution, customizer)?
            }
            Source::VectorFeatures(features) if layer.layer.renderer_hint.rasterize => {
                vec![LayerSpec::Image(self.raster.render_layer(
                    layer,
                    features,
                    print_resolution,
                    customizer,
                )?)]
            }
            Source::VectorFeatures(features) => VectorEncoder::new(layer, customizer)
                .with_circle_sides(self.circle_sides)
                .encode(features, print_resolution)
                .map(LayerSpec::Geojson)
                .into_iter()
                .collect(),
        };
        debug!(
            layer = ?layer.name(),
            source = source.kind_name(),
            fragments = fragments.len(),
            "图层编码完成"
        );
        Ok(fragments)
    }

    fn encode_vector_tiles(
        &self,
        layer: &LayerState,
        source: &VectorTileSource,
        print_resolution: f64,
        customizer: &dyn Customizer,
    ) -> Result<Vec<LayerSpec>, EncodeError> {
        let Some(compositor) = self.compositor.as_deref() else {
            warn!(layer = ?layer.name(), "未配置矢量瓦片合成器，跳过图层");
            return Ok(Vec::new());
        };
        let extent = customizer.print_extent();
        let request = VectorTileRequest {
            print_extent: extent,
            tile_resolution: print_resolution,
            style_resolution: print_resolution,
            canvas_size: [
                extent.width() / print_resolution,
                extent.height() / print_resolution,
            ],
        };
        let images = compositor.compose(layer, source, &request)?;
        Ok(images
            .into_iter()
            .filter(|image| image.base_url.len() > MIN_IMAGE_URL_LEN)
            .map(|image| {
                let mut spec = ImageLayerSpec {
                    extent: image.extent,
                    image_format: PNG_FORMAT.to_string(),
                    opacity: 1.0,
                    name: layer.name().map(str::to_owned),
                    base_url: image.base_url,
                };
                customizer.image_layer(layer, &mut spec);
                LayerSpec::Image(spec)
            })
            .collect())
    }
}
