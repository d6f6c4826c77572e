//! 要素样式模型。每个样式对象在构造时分配唯一的 [`ObjectUid`]；
//! 共享同一实例应通过 `Arc` 完成，`clone()` 得到的是新实例。

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::color::Color;
use crate::feature::Feature;
use crate::geometry::Geometry;

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// 进程内唯一的对象实例标识。克隆会分配新的标识。
#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectUid(u64);

impl ObjectUid {
    pub fn next() -> Self {
        Self(NEXT_UID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Clone for ObjectUid {
    fn clone(&self) -> Self {
        Self::next()
    }
}

impl Default for ObjectUid {
    fn default() -> Self {
        Self::next()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineCap {
    Butt,
    Round,
    Square,
}

impl LineCap {
    pub fn as_str(self) -> &'static str {
        match self {
            LineCap::Butt => "butt",
            LineCap::Round => "round",
            LineCap::Square => "square",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineJoin {
    Bevel,
    Round,
    Miter,
}

impl LineJoin {
    pub fn as_str(self) -> &'static str {
        match self {
            LineJoin::Bevel => "bevel",
            LineJoin::Round => "round",
            LineJoin::Miter => "miter",
        }
    }
}

/// 缩放：统一值或分别作用于 X/Y 的二元组。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scale {
    Uniform(f64),
    Xy([f64; 2]),
}

impl Scale {
    /// 二元缩放取平均值；非有限值退化为 1。
    pub fn average(self) -> f64 {
        let value = match self {
            Scale::Uniform(value) => value,
            Scale::Xy([x, y]) => (x + y) / 2.0,
        };
        if value.is_finite() { value } else { 1.0 }
    }

    pub fn describe(self) -> String {
        match self {
            Scale::Uniform(value) => value.to_string(),
            Scale::Xy([x, y]) => format!("{x},{y}"),
        }
    }
}

impl Default for Scale {
    fn default() -> Self {
        Scale::Uniform(1.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Fill {
    uid: ObjectUid,
    pub color: Option<Color>,
}

impl Fill {
    pub fn new(color: Color) -> Self {
        Self {
            uid: ObjectUid::next(),
            color: Some(color),
        }
    }

    #[inline]
    pub fn uid(&self) -> &ObjectUid {
        &self.uid
    }
}

#[derive(Debug, Clone, Default)]
pub struct Stroke {
    uid: ObjectUid,
    pub color: Option<Color>,
    pub width: Option<f64>,
    pub line_dash: Option<Vec<f64>>,
    pub line_cap: Option<LineCap>,
    pub line_join: Option<LineJoin>,
}

impl Stroke {
    pub fn new(color: Color, width: f64) -> Self {
        Self {
            color: Some(color),
            width: Some(width),
            ..Self::default()
        }
    }

    pub fn with_line_dash(mut self, dash: Vec<f64>) -> Self {
        self.line_dash = Some(dash);
        self
    }

    pub fn with_line_cap(mut self, cap: LineCap) -> Self {
        self.line_cap = Some(cap);
        self
    }

    pub fn with_line_join(mut self, join: LineJoin) -> Self {
        self.line_join = Some(join);
        self
    }

    #[inline]
    pub fn uid(&self) -> &ObjectUid {
        &self.uid
    }
}

/// 圆形点符号。
#[derive(Debug, Clone, Default)]
pub struct CircleMarker {
    uid: ObjectUid,
    pub radius: f64,
    pub scale: Scale,
    pub fill: Option<Arc<Fill>>,
    pub stroke: Option<Arc<Stroke>>,
}

impl CircleMarker {
    pub fn new(radius: f64) -> Self {
        Self {
            radius,
            ..Self::default()
        }
    }

    pub fn with_fill(mut self, fill: Arc<Fill>) -> Self {
        self.fill = Some(fill);
        self
    }

    pub fn with_stroke(mut self, stroke: Arc<Stroke>) -> Self {
        self.stroke = Some(stroke);
        self
    }

    pub fn with_scale(mut self, scale: Scale) -> Self {
        self.scale = scale;
        self
    }

    #[inline]
    pub fn uid(&self) -> &ObjectUid {
        &self.uid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnchorOrigin {
    BottomLeft,
    BottomRight,
    #[default]
    TopLeft,
    TopRight,
}

impl AnchorOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            AnchorOrigin::BottomLeft => "bottom-left",
            AnchorOrigin::BottomRight => "bottom-right",
            AnchorOrigin::TopLeft => "top-left",
            AnchorOrigin::TopRight => "top-right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnchorUnits {
    #[default]
    Fraction,
    Pixels,
}

impl AnchorUnits {
    pub fn as_str(self) -> &'static str {
        match self {
            AnchorUnits::Fraction => "fraction",
            AnchorUnits::Pixels => "pixels",
        }
    }
}

/// 图标锚点。默认值为图标中心（0.5, 0.5，左上原点，比例单位）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IconAnchor {
    pub position: [f64; 2],
    pub origin: AnchorOrigin,
    pub x_units: AnchorUnits,
    pub y_units: AnchorUnits,
}

impl IconAnchor {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// 换算为相对图标左上角的像素偏移。
    pub fn to_pixels(&self, size: [f64; 2]) -> [f64; 2] {
        let mut x = match self.x_units {
            AnchorUnits::Fraction => self.position[0] * size[0],
            AnchorUnits::Pixels => self.position[0],
        };
        let mut y = match self.y_units {
            AnchorUnits::Fraction => self.position[1] * size[1],
            AnchorUnits::Pixels => self.position[1],
        };
        if matches!(self.origin, AnchorOrigin::TopRight | AnchorOrigin::BottomRight) {
            x = size[0] - x;
        }
        if matches!(self.origin, AnchorOrigin::BottomLeft | AnchorOrigin::BottomRight) {
            y = size[1] - y;
        }
        [x, y]
    }

    pub fn describe(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.position[0],
            self.position[1],
            self.origin.as_str(),
            self.x_units.as_str(),
            self.y_units.as_str()
        )
    }
}

impl Default for IconAnchor {
    fn default() -> Self {
        Self {
            position: [0.5, 0.5],
            origin: AnchorOrigin::TopLeft,
            x_units: AnchorUnits::Fraction,
            y_units: AnchorUnits::Fraction,
        }
    }
}

/// 外部图片点符号。`size` 为原始像素尺寸，`rotation` 以弧度计。
#[derive(Debug, Clone)]
pub struct Icon {
    uid: ObjectUid,
    pub src: Option<String>,
    pub size: Option<[f64; 2]>,
    pub scale: Scale,
    pub opacity: f64,
    pub rotation: f64,
    pub anchor: IconAnchor,
}

impl Icon {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            uid: ObjectUid::next(),
            src: Some(src.into()),
            size: None,
            scale: Scale::default(),
            opacity: 1.0,
            rotation: 0.0,
            anchor: IconAnchor::default(),
        }
    }

    pub fn with_size(mut self, size: [f64; 2]) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_scale(mut self, scale: Scale) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_anchor(mut self, anchor: IconAnchor) -> Self {
        self.anchor = anchor;
        self
    }

    #[inline]
    pub fn uid(&self) -> &ObjectUid {
        &self.uid
    }
}

#[derive(Debug, Clone)]
pub enum ImageStyle {
    Circle(CircleMarker),
    Icon(Icon),
}

impl ImageStyle {
    #[inline]
    pub fn uid(&self) -> &ObjectUid {
        match self {
            ImageStyle::Circle(circle) => circle.uid(),
            ImageStyle::Icon(icon) => icon.uid(),
        }
    }
}

/// 文字标注样式；`rotation` 以弧度计。
#[derive(Debug, Clone, Default)]
pub struct TextStyle {
    uid: ObjectUid,
    pub text: Option<String>,
    pub font: Option<String>,
    pub offset_x: f64,
    pub offset_y: f64,
    pub rotation: f64,
    pub fill: Option<Arc<Fill>>,
    pub stroke: Option<Arc<Stroke>>,
}

impl TextStyle {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_font(mut self, font: impl Into<String>) -> Self {
        self.font = Some(font.into());
        self
    }

    pub fn with_offset(mut self, offset_x: f64, offset_y: f64) -> Self {
        self.offset_x = offset_x;
        self.offset_y = offset_y;
        self
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_fill(mut self, fill: Arc<Fill>) -> Self {
        self.fill = Some(fill);
        self
    }

    pub fn with_stroke(mut self, stroke: Arc<Stroke>) -> Self {
        self.stroke = Some(stroke);
        self
    }

    #[inline]
    pub fn uid(&self) -> &ObjectUid {
        &self.uid
    }
}

/// 复合样式：填充、描边、点符号与文字均为可选，并可携带覆盖几何。
#[derive(Debug, Clone, Default)]
pub struct Style {
    uid: ObjectUid,
    pub geometry: Option<Geometry>,
    pub fill: Option<Arc<Fill>>,
    pub stroke: Option<Arc<Stroke>>,
    pub image: Option<Arc<ImageStyle>>,
    pub text: Option<Arc<TextStyle>>,
    pub z_index: Option<i32>,
}

impl Style {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fill(mut self, fill: Arc<Fill>) -> Self {
        self.fill = Some(fill);
        self
    }

    pub fn with_stroke(mut self, stroke: Arc<Stroke>) -> Self {
        self.stroke = Some(stroke);
        self
    }

    pub fn with_image(mut self, image: Arc<ImageStyle>) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_text(mut self, text: Arc<TextStyle>) -> Self {
        self.text = Some(text);
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_z_index(mut self, z_index: i32) -> Self {
        self.z_index = Some(z_index);
        self
    }

    #[inline]
    pub fn uid(&self) -> &ObjectUid {
        &self.uid
    }
}

/// 样式解析结果，对应“无 / 单个 / 列表（可能含空项）”三种返回形态。
#[derive(Debug, Clone, Default)]
pub enum StyleResult {
    #[default]
    None,
    One(Arc<Style>),
    Many(Vec<Option<Arc<Style>>>),
}

impl StyleResult {
    /// 归一化为样式列表并丢弃空项。
    pub fn into_styles(self) -> Vec<Arc<Style>> {
        match self {
            StyleResult::None => Vec::new(),
            StyleResult::One(style) => vec![style],
            StyleResult::Many(styles) => styles.into_iter().flatten().collect(),
        }
    }
}

impl From<Arc<Style>> for StyleResult {
    fn from(value: Arc<Style>) -> Self {
        StyleResult::One(value)
    }
}

impl From<Vec<Arc<Style>>> for StyleResult {
    fn from(value: Vec<Arc<Style>>) -> Self {
        StyleResult::Many(value.into_iter().map(Some).collect())
    }
}

pub type StyleFunction = Arc<dyn Fn(&Feature, f64) -> StyleResult + Send + Sync>;

/// 要素或图层上的样式来源：静态样式或按 (要素, 分辨率) 求值的函数。
#[derive(Clone)]
pub enum StyleLike {
    Static(StyleResult),
    Function(StyleFunction),
}

impl StyleLike {
    pub fn function<F>(function: F) -> Self
    where
        F: Fn(&Feature, f64) -> StyleResult + Send + Sync + 'static,
    {
        StyleLike::Function(Arc::new(function))
    }

    pub fn resolve(&self, feature: &Feature, resolution: f64) -> StyleResult {
        match self {
            StyleLike::Static(result) => result.clone(),
            StyleLike::Function(function) => function(feature, resolution),
        }
    }
}

impl fmt::Debug for StyleLike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleLike::Static(result) => f.debug_tuple("Static").field(result).finish(),
            StyleLike::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl From<Arc<Style>> for StyleLike {
    fn from(value: Arc<Style>) -> Self {
        StyleLike::Static(StyleResult::One(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloning_allocates_a_fresh_uid() {
        let fill = Fill::new(Color::rgb(1.0, 2.0, 3.0));
        let copy = fill.clone();
        assert_ne!(fill.uid(), copy.uid());
        assert_eq!(fill.color, copy.color);

        let shared = Arc::new(fill);
        let alias = Arc::clone(&shared);
        assert_eq!(shared.uid(), alias.uid());
    }

    #[test]
    fn style_result_drops_empty_entries() {
        let style = Arc::new(Style::new());
        let many = StyleResult::Many(vec![None, Some(style.clone()), None]);
        let styles = many.into_styles();
        assert_eq!(styles.len(), 1);
        assert!(Arc::ptr_eq(&styles[0], &style));
        assert!(StyleResult::None.into_styles().is_empty());
    }

    #[test]
    fn anchor_to_pixels_respects_origin_and_units() {
        let anchor = IconAnchor {
            position: [4.0, 0.25],
            origin: AnchorOrigin::BottomRight,
            x_units: AnchorUnits::Pixels,
            y_units: AnchorUnits::Fraction,
        };
        assert_eq!(anchor.to_pixels([20.0, 40.0]), [16.0, 30.0]);
        assert!(IconAnchor::default().is_default());
        assert!(!anchor.is_default());
    }

    #[test]
    fn scale_average_handles_pairs_and_nan() {
        assert_eq!(Scale::Xy([1.0, 3.0]).average(), 2.0);
        assert_eq!(Scale::Uniform(f64::NAN).average(), 1.0);
    }
}
