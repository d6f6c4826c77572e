//! 样式标识与符号化编码。
//!
//! 标识按深度优先遍历样式对象图得到：嵌套对象贡献 `_k<uid>`，标量字段贡献
//! `_<字段>:<值>`。根样式自身的实例号不参与拼接，因此标量相同且嵌套对象为同一实例
//! 的两个样式会得到相同标识。

use std::collections::HashMap;
use std::fmt::Write as _;

use mfprint_core::color::{Color, rgb_array_to_hex};
use mfprint_core::geometry::GeometryKind;
use mfprint_core::layer::LayerState;
use mfprint_core::style::{CircleMarker, Fill, Icon, ImageStyle, Stroke, Style, TextStyle};
use tracing::{debug, warn};

use crate::customizer::Customizer;
use crate::errors::EncodeError;
use crate::spec::{
    FillProps, LineSymbolizer, PointSymbolizer, PolygonSymbolizer, StrokeProps, Symbolizer,
    TextSymbolizer,
};

const DEFAULT_FONT: &str = "sans-serif";
const LABEL_ALIGN_CENTER: &str = "cm";

/// 可参与标识计算的样式节点。
pub trait StyleNode {
    fn node_uid(&self) -> u64;

    /// 写出本节点的标量字段，并把嵌套节点压入 `children`。
    fn describe<'a>(
        &'a self,
        scalars: &mut Vec<(&'static str, String)>,
        children: &mut Vec<&'a dyn StyleNode>,
    );
}

fn join_numbers(values: &[f64]) -> String {
    values
        .iter()
        .map(f64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl StyleNode for Fill {
    fn node_uid(&self) -> u64 {
        self.uid().get()
    }

    fn describe<'a>(
        &'a self,
        scalars: &mut Vec<(&'static str, String)>,
        _children: &mut Vec<&'a dyn StyleNode>,
    ) {
        if let Some(color) = &self.color {
            scalars.push(("color", color.describe()));
        }
    }
}

impl StyleNode for Stroke {
    fn node_uid(&self) -> u64 {
        self.uid().get()
    }

    fn describe<'a>(
        &'a self,
        scalars: &mut Vec<(&'static str, String)>,
        _children: &mut Vec<&'a dyn StyleNode>,
    ) {
        if let Some(color) = &self.color {
            scalars.push(("color", color.describe()));
        }
        if let Some(width) = self.width {
            scalars.push(("width", width.to_string()));
        }
        if let Some(dash) = &self.line_dash {
            scalars.push(("lineDash", join_numbers(dash)));
        }
        if let Some(cap) = self.line_cap {
            scalars.push(("lineCap", cap.as_str().to_string()));
        }
        if let Some(join) = self.line_join {
            scalars.push(("lineJoin", join.as_str().to_string()));
        }
    }
}

impl StyleNode for CircleMarker {
    fn node_uid(&self) -> u64 {
        self.uid().get()
    }

    fn describe<'a>(
        &'a self,
        scalars: &mut Vec<(&'static str, String)>,
        children: &mut Vec<&'a dyn StyleNode>,
    ) {
        scalars.push(("radius", self.radius.to_string()));
        scalars.push(("scale", self.scale.describe()));
        if let Some(fill) = &self.fill {
            children.push(fill.as_ref());
        }
        if let Some(stroke) = &self.stroke {
            children.push(stroke.as_ref());
        }
    }
}

impl StyleNode for Icon {
    fn node_uid(&self) -> u64 {
        self.uid().get()
    }

    fn describe<'a>(
        &'a self,
        scalars: &mut Vec<(&'static str, String)>,
        _children: &mut Vec<&'a dyn StyleNode>,
    ) {
        if let Some(src) = &self.src {
            scalars.push(("src", src.clone()));
        }
        if let Some(size) = self.size {
            scalars.push(("size", join_numbers(&size)));
        }
        scalars.push(("scale", self.scale.describe()));
        scalars.push(("opacity", self.opacity.to_string()));
        scalars.push(("rotation", self.rotation.to_string()));
        scalars.push(("anchor", self.anchor.describe()));
    }
}

impl StyleNode for ImageStyle {
    fn node_uid(&self) -> u64 {
        self.uid().get()
    }

    fn describe<'a>(
        &'a self,
        scalars: &mut Vec<(&'static str, String)>,
        children: &mut Vec<&'a dyn StyleNode>,
    ) {
        match self {
            ImageStyle::Circle(circle) => {
                scalars.push(("kind", "circle".to_string()));
                circle.describe(scalars, children);
            }
            ImageStyle::Icon(icon) => {
                scalars.push(("kind", "icon".to_string()));
                icon.describe(scalars, children);
            }
        }
    }
}

impl StyleNode for TextStyle {
    fn node_uid(&self) -> u64 {
        self.uid().get()
    }

    fn describe<'a>(
        &'a self,
        scalars: &mut Vec<(&'static str, String)>,
        children: &mut Vec<&'a dyn StyleNode>,
    ) {
        if let Some(text) = &self.text {
            scalars.push(("text", text.clone()));
        }
        if let Some(font) = &self.font {
            scalars.push(("font", font.clone()));
        }
        scalars.push(("offsetX", self.offset_x.to_string()));
        scalars.push(("offsetY", self.offset_y.to_string()));
        scalars.push(("rotation", self.rotation.to_string()));
        if let Some(fill) = &self.fill {
            children.push(fill.as_ref());
        }
        if let Some(stroke) = &self.stroke {
            children.push(stroke.as_ref());
        }
    }
}

impl StyleNode for Style {
    fn node_uid(&self) -> u64 {
        self.uid().get()
    }

    fn describe<'a>(
        &'a self,
        scalars: &mut Vec<(&'static str, String)>,
        children: &mut Vec<&'a dyn StyleNode>,
    ) {
        if let Some(geometry) = &self.geometry {
            scalars.push(("geometry", format!("{geometry:?}")));
        }
        if let Some(z_index) = self.z_index {
            scalars.push(("zIndex", z_index.to_string()));
        }
        if let Some(fill) = &self.fill {
            children.push(fill.as_ref());
        }
        if let Some(stroke) = &self.stroke {
            children.push(stroke.as_ref());
        }
        if let Some(image) = &self.image {
            children.push(image.as_ref());
        }
        if let Some(text) = &self.text {
            children.push(text.as_ref());
        }
    }
}

/// 计算样式的规范标识串。
pub fn canonical_key(style: &Style) -> String {
    let mut key = String::new();
    let mut scalars = Vec::new();
    let mut todo: Vec<&dyn StyleNode> = Vec::new();

    style.describe(&mut scalars, &mut todo);
    append_scalars(&mut key, &mut scalars);

    while let Some(node) = todo.pop() {
        let _ = write!(key, "_k{}", node.node_uid());
        node.describe(&mut scalars, &mut todo);
        append_scalars(&mut key, &mut scalars);
    }
    key
}

fn append_scalars(key: &mut String, scalars: &mut Vec<(&'static str, String)>) {
    for (name, value) in scalars.drain(..) {
        let _ = write!(key, "_{name}:{value}");
    }
}

/// 单次图层编码内的标识缓存，把规范标识映射为从 1 开始的短编号。
#[derive(Debug, Default)]
pub struct StyleIdentityCache {
    ids: HashMap<String, u64>,
    last_id: u64,
}

impl StyleIdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id_for(&mut self, style: &Style) -> String {
        let key = canonical_key(style);
        if let Some(id) = self.ids.get(&key) {
            return id.to_string();
        }
        self.last_id += 1;
        self.ids.insert(key, self.last_id);
        self.last_id.to_string()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// 符号化所针对的几何类别，多部件几何归并到对应的单部件类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleCategory {
    Point,
    LineString,
    Polygon,
}

impl TryFrom<GeometryKind> for StyleCategory {
    type Error = EncodeError;

    fn try_from(kind: GeometryKind) -> Result<Self, Self::Error> {
        match kind {
            GeometryKind::Point | GeometryKind::MultiPoint => Ok(StyleCategory::Point),
            GeometryKind::LineString | GeometryKind::MultiLineString => {
                Ok(StyleCategory::LineString)
            }
            GeometryKind::Polygon | GeometryKind::MultiPolygon => Ok(StyleCategory::Polygon),
            other => Err(EncodeError::UnsupportedGeometry(other)),
        }
    }
}

/// 颜色转为 `#rrggbb` 与独立的不透明度。
pub fn encode_color(color: &Color) -> Result<(String, f64), EncodeError> {
    let rgba = color.to_rgba()?;
    let hex = rgb_array_to_hex(&rgba)?;
    Ok((hex, rgba[3]))
}

fn encode_fill(fill: &Fill) -> Result<FillProps, EncodeError> {
    let mut props = FillProps::default();
    if let Some(color) = &fill.color {
        let (hex, opacity) = encode_color(color)?;
        props.fill_color = Some(hex);
        props.fill_opacity = Some(opacity);
    }
    Ok(props)
}

fn encode_stroke(stroke: &Stroke) -> Result<StrokeProps, EncodeError> {
    let mut props = StrokeProps::default();
    if let Some(color) = &stroke.color {
        let (hex, opacity) = encode_color(color)?;
        props.stroke_color = Some(hex);
        props.stroke_opacity = Some(opacity);
    }
    if let Some(dash) = &stroke.line_dash {
        props.stroke_dashstyle = Some(
            dash.iter()
                .map(f64::to_string)
                .collect::<Vec<_>>()
                .join(" "),
        );
    }
    props.stroke_width = stroke.width;
    props.stroke_linecap = stroke.line_cap.map(|cap| cap.as_str().to_string());
    props.stroke_linejoin = stroke.line_join.map(|join| join.as_str().to_string());
    Ok(props)
}

/// 把单个样式转换为某一几何类别下的符号列表，并调用相应的后处理钩子。
pub struct SymbolizerEncoder<'a> {
    layer: &'a LayerState,
    customizer: &'a dyn Customizer,
}

impl<'a> SymbolizerEncoder<'a> {
    pub fn new(layer: &'a LayerState, customizer: &'a dyn Customizer) -> Self {
        Self { layer, customizer }
    }

    /// 颜色非法只丢弃对应的那个符号，其余符号照常输出。
    pub fn encode(&self, category: StyleCategory, style: &Style) -> Vec<Symbolizer> {
        let mut symbolizers = Vec::new();
        match category {
            StyleCategory::Polygon => {
                if let Some(fill) = &style.fill {
                    self.push(
                        &mut symbolizers,
                        self.polygon(fill, style.stroke.as_deref())
                            .map(|symbolizer| Some(Symbolizer::Polygon(symbolizer))),
                    );
                }
            }
            StyleCategory::LineString => {
                if let Some(stroke) = &style.stroke {
                    self.push(
                        &mut symbolizers,
                        self.line(stroke)
                            .map(|symbolizer| Some(Symbolizer::Line(symbolizer))),
                    );
                }
            }
            StyleCategory::Point => {
                if let Some(image) = &style.image {
                    self.push(
                        &mut symbolizers,
                        self.point(image)
                            .map(|symbolizer| symbolizer.map(Symbolizer::Point)),
                    );
                }
            }
        }
        if let Some(text) = &style.text {
            self.push(
                &mut symbolizers,
                self.text(text)
                    .map(|symbolizer| symbolizer.map(Symbolizer::Text)),
            );
        }
        symbolizers
    }

    fn push(&self, out: &mut Vec<Symbolizer>, result: Result<Option<Symbolizer>, EncodeError>) {
        match result {
            Ok(Some(symbolizer)) => out.push(symbolizer),
            Ok(None) => {}
            Err(err) => {
                warn!(layer = ?self.layer.name(), error = %err, "符号编码失败，已跳过");
            }
        }
    }

    pub fn polygon(
        &self,
        fill: &Fill,
        stroke: Option<&Stroke>,
    ) -> Result<PolygonSymbolizer, EncodeError> {
        let mut symbolizer = PolygonSymbolizer {
            fill: encode_fill(fill)?,
            stroke: StrokeProps::default(),
        };
        if let Some(stroke) = stroke {
            symbolizer.stroke = encode_stroke(stroke)?;
        }
        Ok(symbolizer)
    }

    pub fn line(&self, stroke: &Stroke) -> Result<LineSymbolizer, EncodeError> {
        let mut symbolizer = LineSymbolizer {
            stroke: encode_stroke(stroke)?,
        };
        self.customizer.line(self.layer, &mut symbolizer, stroke);
        Ok(symbolizer)
    }

    /// 缺少图片地址的图标不产生符号。
    pub fn point(&self, image: &ImageStyle) -> Result<Option<PointSymbolizer>, EncodeError> {
        let mut symbolizer = match image {
            ImageStyle::Circle(circle) => circle_symbolizer(circle)?,
            ImageStyle::Icon(icon) => match icon_symbolizer(icon) {
                Some(symbolizer) => symbolizer,
                None => {
                    debug!(layer = ?self.layer.name(), "图标缺少地址，跳过点符号");
                    return Ok(None);
                }
            },
        };
        self.customizer.point(self.layer, &mut symbolizer, image);
        Ok(Some(symbolizer))
    }

    /// 仅在标注文字非空时产生文字符号。
    pub fn text(&self, text: &TextStyle) -> Result<Option<TextSymbolizer>, EncodeError> {
        let Some(label) = text.text.as_deref().filter(|label| !label.is_empty()) else {
            return Ok(None);
        };
        let mut symbolizer = TextSymbolizer {
            label: label.to_string(),
            font_family: text
                .font
                .clone()
                .filter(|font| !font.is_empty())
                .unwrap_or_else(|| DEFAULT_FONT.to_string()),
            label_x_offset: text.offset_x,
            label_y_offset: text.offset_y,
            label_align: LABEL_ALIGN_CENTER.to_string(),
            label_rotation: (text.rotation != 0.0).then(|| text.rotation.to_degrees()),
            ..TextSymbolizer::default()
        };
        if let Some(fill) = &text.fill {
            symbolizer.fill = encode_fill(fill)?;
            symbolizer.font_color = symbolizer.fill.fill_color.clone();
        }
        if let Some(stroke) = &text.stroke {
            if let Some(color) = &stroke.color {
                let (hex, opacity) = encode_color(color)?;
                symbolizer.halo_color = Some(hex);
                symbolizer.halo_opacity = Some(opacity);
            }
            symbolizer.halo_radius = stroke.width;
        }
        self.customizer.text(self.layer, &mut symbolizer, text);
        Ok(Some(symbolizer))
    }
}

fn circle_symbolizer(circle: &CircleMarker) -> Result<PointSymbolizer, EncodeError> {
    let mut symbolizer = PointSymbolizer {
        point_radius: Some(circle.radius * circle.scale.average()),
        ..PointSymbolizer::default()
    };
    if let Some(fill) = &circle.fill {
        symbolizer.fill = encode_fill(fill)?;
    }
    if let Some(stroke) = &circle.stroke {
        symbolizer.stroke = encode_stroke(stroke)?;
    }
    Ok(symbolizer)
}

fn icon_symbolizer(icon: &Icon) -> Option<PointSymbolizer> {
    let src = icon.src.clone()?;
    let mut symbolizer = PointSymbolizer {
        external_graphic: Some(src),
        graphic_opacity: Some(icon.opacity),
        ..PointSymbolizer::default()
    };
    if let Some(size) = icon.size {
        let scale = icon.scale.average();
        let width = size[0] * scale;
        let height = size[1] * scale;
        symbolizer.graphic_width = Some(height);
        if !icon.anchor.is_default() {
            let anchor = icon.anchor.to_pixels([width, height]);
            symbolizer.graphic_x_offset = Some(width / 2.0 - anchor[0]);
            symbolizer.graphic_y_offset = Some(height / 2.0 - anchor[1]);
        }
    }
    let rotation = if icon.rotation.is_finite() { icon.rotation } else { 0.0 };
    symbolizer.rotation = Some(rotation.to_degrees());
    Some(symbolizer)
}
