//! 矢量图层的栅格回退渲染。
//!
//! 画布与透明度合成用的暂存画布由 [`RasterRenderer`] 持有并跨调用复用，
//! `&mut self` 保证同一时刻只有一次渲染在使用它们。

use base64::Engine;
use glam::{DAffine2, DVec2};
use mfprint_core::color::{Color, rgb_array_to_hex};
use mfprint_core::geometry::{Extent, Geometry, Point2};
use mfprint_core::layer::{LayerState, VectorSource};
use mfprint_core::style::{self, ImageStyle, Style};
use tiny_skia::{
    FillRule, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap, PixmapPaint, StrokeDash,
    Transform,
};
use tracing::{debug, trace, warn};

use crate::customizer::Customizer;
use crate::errors::EncodeError;
use crate::spec::{ImageLayerSpec, PNG_FORMAT};
use crate::vector::resolve_styles;

/// 地图坐标到像素坐标的仿射变换：先平移到范围中心，再按 `1/resolution` 缩放并翻转 Y 轴，
/// 最后平移半个画布。
pub fn coordinate_to_pixel_transform(extent: &Extent, resolution: f64, size: [f64; 2]) -> DAffine2 {
    let center = extent.center().as_vec2();
    DAffine2::from_translation(DVec2::new(size[0] / 2.0, size[1] / 2.0))
        * DAffine2::from_scale(DVec2::new(1.0 / resolution, -1.0 / resolution))
        * DAffine2::from_translation(-center)
}

/// 打印范围在给定分辨率下对应的像素尺寸。
pub fn canvas_size(extent: &Extent, resolution: f64) -> Result<[u32; 2], EncodeError> {
    let width = (extent.width() / resolution).round();
    let height = (extent.height() / resolution).round();
    if !(width.is_finite() && height.is_finite()) || width < 1.0 || height < 1.0 {
        return Err(EncodeError::Raster(format!(
            "invalid canvas size {width}x{height} at resolution {resolution}"
        )));
    }
    Ok([width as u32, height as u32])
}

#[derive(Default)]
pub struct RasterRenderer {
    canvas: Option<Pixmap>,
    scratch: Option<Pixmap>,
}

impl RasterRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 将图层绘制为一幅 PNG 图片片段。图层不透明度直接合成进像素，片段自身不透明度固定为 1。
    pub fn render_layer(
        &mut self,
        layer: &LayerState,
        source: &VectorSource,
        resolution: f64,
        customizer: &dyn Customizer,
    ) -> Result<ImageLayerSpec, EncodeError> {
        let extent = customizer.print_extent();
        let [width, height] = canvas_size(&extent, resolution)?;
        let transform =
            coordinate_to_pixel_transform(&extent, resolution, [width as f64, height as f64]);

        let canvas = prepare(&mut self.canvas, width, height)?;
        let mut painted = 0usize;
        for feature in source.features() {
            let Some(geometry) = &feature.geometry else {
                continue;
            };
            let styles = resolve_styles(feature, layer.layer.style.as_ref(), resolution);
            if styles.is_empty() {
                continue;
            }
            let geometry = geometry.transformed(&transform);
            for style in &styles {
                paint_geometry(canvas, &geometry, style);
            }
            customizer.decorate_raster(canvas, &geometry);
            painted += 1;
        }

        let scratch = prepare(&mut self.scratch, width, height)?;
        let canvas = self
            .canvas
            .as_ref()
            .ok_or_else(|| EncodeError::Raster("canvas was released during rendering".into()))?;
        let mut paint = PixmapPaint::default();
        paint.opacity = layer.opacity.clamp(0.0, 1.0) as f32;
        scratch.draw_pixmap(0, 0, canvas.as_ref(), &paint, Transform::identity(), None);

        let png = scratch
            .encode_png()
            .map_err(|err| EncodeError::Raster(format!("png encode failed: {err}")))?;
        debug!(
            layer = ?layer.name(),
            width,
            height,
            features = painted,
            bytes = png.len(),
            "矢量图层已栅格化"
        );

        let mut spec = ImageLayerSpec {
            extent: extent.to_array(),
            image_format: PNG_FORMAT.to_string(),
            opacity: 1.0,
            name: layer.name().map(str::to_owned),
            base_url: format!(
                "data:image/png;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(png)
            ),
        };
        customizer.image_layer(layer, &mut spec);
        Ok(spec)
    }
}

/// 取出可复用的画布；尺寸不符时重新分配，否则清空。
fn prepare(slot: &mut Option<Pixmap>, width: u32, height: u32) -> Result<&mut Pixmap, EncodeError> {
    let reusable = slot
        .as_ref()
        .is_some_and(|pixmap| pixmap.width() == width && pixmap.height() == height);
    if !reusable {
        let pixmap = Pixmap::new(width, height).ok_or_else(|| {
            EncodeError::Raster(format!("unable to allocate {width}x{height} canvas"))
        })?;
        *slot = Some(pixmap);
    }
    let pixmap = slot
        .as_mut()
        .ok_or_else(|| EncodeError::Raster("canvas unavailable".into()))?;
    if reusable {
        pixmap.fill(tiny_skia::Color::TRANSPARENT);
    }
    Ok(pixmap)
}

fn paint_geometry(pixmap: &mut Pixmap, geometry: &Geometry, style: &Style) {
    match geometry {
        Geometry::Polygon(rings) => {
            if let Some(path) = rings_path(rings, true) {
                fill_and_stroke(pixmap, &path, style);
            }
        }
        Geometry::MultiPolygon(polygons) => {
            for rings in polygons {
                if let Some(path) = rings_path(rings, true) {
                    fill_and_stroke(pixmap, &path, style);
                }
            }
        }
        Geometry::LineString(points) => {
            if let Some(path) = rings_path(std::slice::from_ref(points), false) {
                stroke_path(pixmap, &path, style.stroke.as_deref());
            }
        }
        Geometry::MultiLineString(lines) => {
            if let Some(path) = rings_path(lines, false) {
                stroke_path(pixmap, &path, style.stroke.as_deref());
            }
        }
        Geometry::Circle { center, radius } => {
            let (x, y) = (center.x() as f32, center.y() as f32);
            if let Some(path) = PathBuilder::from_circle(x, y, *radius as f32) {
                fill_and_stroke(pixmap, &path, style);
            }
        }
        Geometry::Point(point) => paint_marker(pixmap, *point, style),
        Geometry::MultiPoint(points) => {
            for point in points {
                paint_marker(pixmap, *point, style);
            }
        }
        Geometry::GeometryCollection(children) => {
            for child in children {
                paint_geometry(pixmap, child, style);
            }
        }
    }
    if style.text.is_some() {
        trace!("文字样式不参与栅格化");
    }
}

fn paint_marker(pixmap: &mut Pixmap, point: Point2, style: &Style) {
    match style.image.as_deref() {
        Some(ImageStyle::Circle(circle)) => {
            let radius = circle.radius * circle.scale.average();
            let (x, y) = (point.x() as f32, point.y() as f32);
            let Some(path) = PathBuilder::from_circle(x, y, radius as f32) else {
                return;
            };
            if let Some(fill) = circle.fill.as_deref() {
                fill_path(pixmap, &path, fill);
            }
            stroke_path(pixmap, &path, circle.stroke.as_deref());
        }
        Some(ImageStyle::Icon(_)) => {
            debug!("图标样式不参与栅格化");
        }
        None => {}
    }
}

fn rings_path(rings: &[Vec<Point2>], close: bool) -> Option<Path> {
    let mut builder = PathBuilder::new();
    for ring in rings {
        let mut points = ring.iter();
        let Some(first) = points.next() else {
            continue;
        };
        builder.move_to(first.x() as f32, first.y() as f32);
        for point in points {
            builder.line_to(point.x() as f32, point.y() as f32);
        }
        if close {
            builder.close();
        }
    }
    builder.finish()
}

fn fill_and_stroke(pixmap: &mut Pixmap, path: &Path, style: &Style) {
    if let Some(fill) = style.fill.as_deref() {
        fill_path(pixmap, path, fill);
    }
    stroke_path(pixmap, path, style.stroke.as_deref());
}

fn fill_path(pixmap: &mut Pixmap, path: &Path, fill: &style::Fill) {
    let Some(color) = &fill.color else {
        return;
    };
    match paint_for(color) {
        Ok(paint) => pixmap.fill_path(path, &paint, FillRule::EvenOdd, Transform::identity(), None),
        Err(err) => warn!(error = %err, "填充颜色无效，跳过"),
    }
}

fn stroke_path(pixmap: &mut Pixmap, path: &Path, stroke: Option<&style::Stroke>) {
    let Some(stroke) = stroke else {
        return;
    };
    let Some(color) = &stroke.color else {
        return;
    };
    let paint = match paint_for(color) {
        Ok(paint) => paint,
        Err(err) => {
            warn!(error = %err, "描边颜色无效，跳过");
            return;
        }
    };
    pixmap.stroke_path(path, &paint, &build_stroke(stroke), Transform::identity(), None);
}

fn build_stroke(stroke: &style::Stroke) -> tiny_skia::Stroke {
    let mut out = tiny_skia::Stroke::default();
    out.width = stroke.width.unwrap_or(1.0).max(0.0) as f32;
    out.line_cap = match stroke.line_cap {
        Some(style::LineCap::Round) => LineCap::Round,
        Some(style::LineCap::Square) => LineCap::Square,
        Some(style::LineCap::Butt) | None => LineCap::Butt,
    };
    out.line_join = match stroke.line_join {
        Some(style::LineJoin::Round) => LineJoin::Round,
        Some(style::LineJoin::Bevel) => LineJoin::Bevel,
        Some(style::LineJoin::Miter) | None => LineJoin::Miter,
    };
    if let Some(dash) = &stroke.line_dash {
        let mut pattern: Vec<f32> = dash.iter().map(|value| value.abs() as f32).collect();
        if pattern.len() % 2 == 1 {
            let copy = pattern.clone();
            pattern.extend(copy);
        }
        if pattern.len() >= 2 {
            out.dash = StrokeDash::new(pattern, 0.0);
        }
    }
    out
}

fn paint_for(color: &Color) -> Result<Paint<'static>, EncodeError> {
    let rgba = color.to_rgba()?;
    rgb_array_to_hex(&rgba)?;
    let alpha = (rgba[3].clamp(0.0, 1.0) * 255.0).round() as u8;
    let mut paint = Paint::default();
    paint.set_color(tiny_skia::Color::from_rgba8(
        rgba[0] as u8,
        rgba[1] as u8,
        rgba[2] as u8,
        alpha,
    ));
    paint.anti_alias = true;
    Ok(paint)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mfprint_core::feature::Feature;
    use mfprint_core::layer::{Layer, Source};
    use mfprint_core::style::{CircleMarker, Fill};

    use super::*;
    use crate::customizer::BaseCustomizer;

    fn decode(spec: &ImageLayerSpec) -> Pixmap {
        let payload = spec
            .base_url
            .strip_prefix("data:image/png;base64,")
            .expect("应为 PNG data URL");
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .expect("base64 解码");
        Pixmap::decode_png(&bytes).expect("PNG 解码")
    }

    #[test]
    fn transform_maps_extent_corners_to_pixels() {
        let extent = Extent::new(100.0, 200.0, 300.0, 300.0);
        let transform = coordinate_to_pixel_transform(&extent, 2.0, [100.0, 50.0]);
        let top_left = transform.transform_point2(DVec2::new(100.0, 300.0));
        let bottom_right = transform.transform_point2(DVec2::new(300.0, 200.0));
        assert!((top_left - DVec2::new(0.0, 0.0)).length() < 1e-9);
        assert!((bottom_right - DVec2::new(100.0, 50.0)).length() < 1e-9);
    }

    #[test]
    fn zero_sized_canvas_is_rejected() {
        let extent = Extent::new(0.0, 0.0, 0.0, 10.0);
        assert!(matches!(canvas_size(&extent, 1.0), Err(EncodeError::Raster(_))));
    }

    #[test]
    fn layer_opacity_is_baked_into_pixels() {
        let style = Arc::new(
            Style::new()
                .with_fill(Arc::new(Fill::new(Color::rgb(255.0, 0.0, 0.0))))
                .with_image(Arc::new(ImageStyle::Circle(CircleMarker::new(2.0).with_fill(
                    Arc::new(Fill::new(Color::rgb(0.0, 0.0, 255.0))),
                )))),
        );
        let source = VectorSource::new(vec![
            Feature::new(Geometry::Polygon(vec![vec![
                Point2::new(2.0, 2.0),
                Point2::new(8.0, 2.0),
                Point2::new(8.0, 8.0),
                Point2::new(2.0, 8.0),
                Point2::new(2.0, 2.0),
            ]])),
            Feature::new(Geometry::Point(Point2::new(1.0, 9.0))),
        ]);
        let mut layer = Layer::new(Source::VectorFeatures(source.clone())).with_name("raster");
        layer.style = Some(style.into());
        let state = LayerState::new(Arc::new(layer)).with_opacity(0.5);
        let customizer = BaseCustomizer::new(Extent::new(0.0, 0.0, 10.0, 10.0));

        let mut renderer = RasterRenderer::new();
        let spec = renderer
            .render_layer(&state, &source, 1.0, &customizer)
            .expect("栅格化");
        assert_eq!(spec.opacity, 1.0);
        assert_eq!(spec.image_format, "image/png");
        assert_eq!(spec.extent, [0.0, 0.0, 10.0, 10.0]);
        assert_eq!(spec.name.as_deref(), Some("raster"));

        let pixmap = decode(&spec);
        assert_eq!((pixmap.width(), pixmap.height()), (10, 10));
        let center = pixmap.pixel(5, 5).expect("中心像素");
        assert!((120..=135).contains(&center.alpha()));
        assert!(center.red() > 100);
        assert_eq!(center.blue(), 0);
        let corner = pixmap.pixel(9, 9).expect("角落像素");
        assert_eq!(corner.alpha(), 0);
        let marker = pixmap.pixel(1, 1).expect("点符号像素");
        assert!(marker.blue() > 0);

        // 复用画布时旧内容应被清空
        let empty = VectorSource::default();
        let again = renderer
            .render_layer(&state, &empty, 1.0, &customizer)
            .expect("再次栅格化");
        let pixmap = decode(&again);
        assert_eq!(pixmap.pixel(5, 5).expect("中心像素").alpha(), 0);
    }
}
