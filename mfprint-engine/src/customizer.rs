use mfprint_core::geometry::{Extent, Geometry};
use mfprint_core::layer::{LayerState, WmsSource, WmtsSource};
use mfprint_core::style::{ImageStyle, Stroke, TextStyle};
use tiny_skia::Pixmap;

use crate::geojson::GeoJsonFeature;
use crate::spec::{
    ImageLayerSpec, LineSymbolizer, PointSymbolizer, TextSymbolizer, WmsLayerSpec, WmtsLayerSpec,
};

/// 编码过程的扩展点。除打印范围外，所有方法默认放行或不做任何修改；
/// 后处理钩子在对应片段构建完成后调用，可以原地修改该片段。
pub trait Customizer {
    /// 与页面地图框对应的地理范围，用于筛选要素。
    fn print_extent(&self) -> Extent;

    fn layer_filter(&self, _layer: &LayerState) -> bool {
        true
    }

    fn geometry_filter(&self, _geometry: &Geometry) -> bool {
        true
    }

    fn feature(&self, _layer: &LayerState, _feature: &mut GeoJsonFeature) {}

    fn line(&self, _layer: &LayerState, _symbolizer: &mut LineSymbolizer, _stroke: &Stroke) {}

    fn point(&self, _layer: &LayerState, _symbolizer: &mut PointSymbolizer, _image: &ImageStyle) {}

    fn text(&self, _layer: &LayerState, _symbolizer: &mut TextSymbolizer, _text: &TextStyle) {}

    fn wmts_layer(&self, _layer: &LayerState, _spec: &mut WmtsLayerSpec, _source: &WmtsSource) {}

    fn wms_layer(&self, _layer: &LayerState, _spec: &mut WmsLayerSpec, _source: &WmsSource) {}

    fn image_layer(&self, _layer: &LayerState, _spec: &mut ImageLayerSpec) {}

    /// 栅格回退渲染时，在要素主体绘制完成后追加绘制。`geometry` 已处于像素坐标。
    fn decorate_raster(&self, _pixmap: &mut Pixmap, _geometry: &Geometry) {}
}

/// 只提供打印范围的默认实现。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseCustomizer {
    print_extent: Extent,
}

impl BaseCustomizer {
    pub fn new(print_extent: Extent) -> Self {
        Self { print_extent }
    }
}

impl Customizer for BaseCustomizer {
    fn print_extent(&self) -> Extent {
        self.print_extent
    }
}
