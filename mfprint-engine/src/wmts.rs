//! 瓦片矩阵描述与 WMTS / WMS 片段组装。

use indexmap::IndexMap;
use mfprint_core::layer::{LayerState, TileMatrixSet, WmsSource, WmtsSource};
use mfprint_core::units::WMTS_PIXEL_SIZE;
use tracing::debug;

use crate::customizer::Customizer;
use crate::errors::EncodeError;
use crate::spec::{PNG_FORMAT, WmsLayerSpec, WmtsLayerSpec, WmtsMatrix};

const DEFAULT_WMS_VERSION: &str = "1.3.0";

/// 每一级矩阵生成一个描述。比例尺分母按 0.28 mm 标准像素换算。
pub fn wmts_matrices(grid: &TileMatrixSet) -> Vec<WmtsMatrix> {
    grid.matrices
        .iter()
        .map(|matrix| WmtsMatrix {
            identifier: matrix.identifier.clone(),
            scale_denominator: matrix.resolution * grid.meters_per_unit / WMTS_PIXEL_SIZE,
            tile_size: matrix.tile_size,
            top_left_corner: matrix.origin.to_array(),
            matrix_size: matrix.tile_range.size(),
        })
        .collect()
}

pub fn encode_wmts_layer(
    layer: &LayerState,
    source: &WmtsSource,
    customizer: &dyn Customizer,
) -> Result<WmtsLayerSpec, EncodeError> {
    let name = layer.name().map(str::to_owned);
    let grid = source
        .tile_grid
        .as_ref()
        .ok_or_else(|| EncodeError::MissingMatrixDescriptor { layer: name.clone() })?;
    let base_url = source
        .urls
        .first()
        .cloned()
        .ok_or_else(|| EncodeError::MissingUrl { layer: name.clone() })?;

    let mut spec = WmtsLayerSpec {
        base_url,
        dimensions: source.dimensions.keys().cloned().collect(),
        dimension_params: source.dimensions.clone(),
        image_format: source.format.clone(),
        name,
        layer: source.layer.clone(),
        matrices: wmts_matrices(grid),
        matrix_set: source.matrix_set.clone(),
        opacity: layer.opacity,
        request_encoding: source.request_encoding.as_str().to_string(),
        style: source.style.clone(),
        version: source.version.clone(),
    };
    customizer.wmts_layer(layer, &mut spec, source);
    Ok(spec)
}

/// WMS 片段：`LAYERS`/`STYLES`/`FORMAT`/`VERSION` 参数（不区分大小写）转为专用字段，
/// 其余参数原样放入 `customParams`。
pub fn encode_wms_layer(
    layer: &LayerState,
    source: &WmsSource,
    customizer: &dyn Customizer,
) -> Result<WmsLayerSpec, EncodeError> {
    if source.url.is_empty() {
        return Err(EncodeError::MissingUrl {
            layer: layer.name().map(str::to_owned),
        });
    }

    let mut layers = Vec::new();
    let mut styles = Vec::new();
    let mut image_format = PNG_FORMAT.to_string();
    let mut version = DEFAULT_WMS_VERSION.to_string();
    let mut custom_params = IndexMap::new();

    for (key, value) in &source.params {
        match key.to_ascii_uppercase().as_str() {
            "LAYERS" => layers = split_list(value),
            "STYLES" => styles = split_list(value),
            "FORMAT" => image_format = value.clone(),
            "VERSION" => version = value.clone(),
            _ => {
                custom_params.insert(key.clone(), value.clone());
            }
        }
    }
    if source.tiled {
        debug!(layer = ?layer.name(), "分块 WMS 以单幅图片方式输出");
    }

    let mut spec = WmsLayerSpec {
        base_url: source.url.clone(),
        layers,
        styles,
        image_format,
        version,
        custom_params,
        server_type: source.server_type.clone(),
        use_native_angle: true,
        opacity: layer.opacity,
        name: layer.name().map(str::to_owned),
    };
    customizer.wms_layer(layer, &mut spec, source);
    Ok(spec)
}

fn split_list(value: &str) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }
    value.split(',').map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mfprint_core::geometry::{Extent, Point2};
    use mfprint_core::layer::{Layer, RequestEncoding, Source, TileMatrix, TileRange};
    use serde_json::json;

    use super::*;
    use crate::customizer::BaseCustomizer;

    fn grid() -> TileMatrixSet {
        TileMatrixSet {
            meters_per_unit: 1.0,
            matrices: vec![
                TileMatrix {
                    identifier: "0".into(),
                    resolution: 4000.0,
                    tile_size: [256, 256],
                    origin: Point2::new(2_420_000.0, 1_350_000.0),
                    tile_range: TileRange { min_x: 0, max_x: 0, min_y: 0, max_y: 0 },
                },
                TileMatrix {
                    identifier: "1".into(),
                    resolution: 2.8,
                    tile_size: [512, 256],
                    origin: Point2::new(2_420_000.0, 1_350_000.0),
                    tile_range: TileRange { min_x: 3, max_x: 10, min_y: 5, max_y: 6 },
                },
            ],
        }
    }

    fn state(source: Source) -> LayerState {
        LayerState::new(Arc::new(Layer::new(source).with_name("tiles"))).with_opacity(0.5)
    }

    #[test]
    fn matrices_use_inclusive_tile_ranges() {
        let matrices = wmts_matrices(&grid());
        assert_eq!(matrices.len(), 2);
        assert_eq!(matrices[0].matrix_size, [1, 1]);
        assert_eq!(matrices[1].matrix_size, [8, 2]);
        assert!((matrices[1].scale_denominator - 10_000.0).abs() < 1e-6);
        assert_eq!(matrices[1].tile_size, [512, 256]);
        assert_eq!(matrices[1].top_left_corner, [2_420_000.0, 1_350_000.0]);
    }

    #[test]
    fn wmts_fragment_lists_dimension_keys() {
        let mut dimensions = IndexMap::new();
        dimensions.insert("TIME".to_string(), "2024".to_string());
        let source = WmtsSource {
            urls: vec!["https://wmts.example.org/{TileMatrix}/{TileCol}/{TileRow}.png".into()],
            layer: "relief".into(),
            matrix_set: "2056".into(),
            format: "image/png".into(),
            style: "default".into(),
            version: "1.0.0".into(),
            request_encoding: RequestEncoding::Rest,
            dimensions,
            tile_grid: Some(grid()),
        };
        let layer = state(Source::TiledMatrixSet(source.clone()));
        let customizer = BaseCustomizer::new(Extent::new(0.0, 0.0, 1.0, 1.0));
        let spec = encode_wmts_layer(&layer, &source, &customizer).expect("WMTS 片段");
        let value = serde_json::to_value(&spec).expect("序列化片段");
        assert_eq!(value["dimensions"], json!(["TIME"]));
        assert_eq!(value["dimensionParams"], json!({ "TIME": "2024" }));
        assert_eq!(value["requestEncoding"], json!("REST"));
        assert_eq!(value["matrixSet"], json!("2056"));
        assert_eq!(value["opacity"], json!(0.5));
        assert_eq!(value["name"], json!("tiles"));
    }

    #[test]
    fn missing_tile_grid_is_an_error() {
        let source = WmtsSource {
            urls: vec!["https://wmts.example.org".into()],
            ..WmtsSource::default()
        };
        let layer = state(Source::TiledMatrixSet(source.clone()));
        let customizer = BaseCustomizer::new(Extent::new(0.0, 0.0, 1.0, 1.0));
        assert!(matches!(
            encode_wmts_layer(&layer, &source, &customizer),
            Err(EncodeError::MissingMatrixDescriptor { .. })
        ));
    }

    #[test]
    fn wms_params_are_split_into_fields() {
        let source = WmsSource::new("https://wms.example.org/ows")
            .with_param("layers", "roads,rivers")
            .with_param("FORMAT", "image/jpeg")
            .with_param("TRANSPARENT", "true")
            .with_server_type("mapserver");
        let layer = state(Source::DynamicImage(source.clone()));
        let customizer = BaseCustomizer::new(Extent::new(0.0, 0.0, 1.0, 1.0));
        let spec = encode_wms_layer(&layer, &source, &customizer).expect("WMS 片段");
        assert_eq!(spec.layers, vec!["roads", "rivers"]);
        assert!(spec.styles.is_empty());
        assert_eq!(spec.image_format, "image/jpeg");
        assert_eq!(spec.version, "1.3.0");
        assert_eq!(spec.custom_params.get("TRANSPARENT").map(String::as_str), Some("true"));
        assert!(spec.use_native_angle);
        assert_eq!(spec.server_type.as_deref(), Some("mapserver"));
    }
}
