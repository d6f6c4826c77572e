pub mod layer;
pub mod style;

pub mod units {
    use crate::geometry::{Extent, Point2};

    /// WMTS 标准渲染像素尺寸：0.28 mm。
    pub const WMTS_PIXEL_SIZE: f64 = 0.28e-3;
    /// 打印页面尺寸所用的点（pt）密度。
    pub const DOTS_PER_INCH: f64 = 72.0;
    /// 国际码定义下 1 英寸 = 2.54 cm。
    pub const METERS_PER_INCH: f64 = 0.0254;
    /// 圆形几何在输出前近似为 N 边形。
    pub const CIRCLE_TO_POLYGON_SIDES: usize = 64;

    #[inline]
    pub fn dots_per_meter() -> f64 {
        DOTS_PER_INCH / METERS_PER_INCH
    }

    /// 计算在给定比例尺下刚好覆盖页面地图框的范围。
    /// `page_size` 以点（1/72 英寸）为单位，结果以地图单位（米）表示。
    pub fn print_extent(page_size: [f64; 2], center: Point2, scale: f64) -> Extent {
        let half_width = page_size[0] / dots_per_meter() * scale / 2.0;
        let half_height = page_size[1] / dots_per_meter() * scale / 2.0;
        Extent::new(
            center.x() - half_width,
            center.y() - half_height,
            center.x() + half_width,
            center.y() + half_height,
        )
    }
}

pub mod geometry {
    use std::f64::consts::TAU;

    use glam::{DAffine2, DVec2};
    use serde::{Deserialize, Serialize};

    /// 二维坐标，内部以 `glam::DVec2` 表示。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn to_array(self) -> [f64; 2] {
            [self.0.x, self.0.y]
        }

        #[inline]
        pub fn transformed(self, transform: &DAffine2) -> Self {
            Self(transform.transform_point2(self.0))
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    impl From<[f64; 2]> for Point2 {
        fn from(value: [f64; 2]) -> Self {
            Self::new(value[0], value[1])
        }
    }

    /// 轴对齐范围（minX, minY, maxX, maxY），用于打印范围与要素筛选。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Extent {
        min: Point2,
        max: Point2,
    }

    impl Extent {
        #[inline]
        pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
            Self {
                min: Point2::new(min_x, min_y),
                max: Point2::new(max_x, max_y),
            }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            self.min = Point2::from_vec(self.min.as_vec2().min(point.as_vec2()));
            self.max = Point2::from_vec(self.max.as_vec2().max(point.as_vec2()));
        }

        pub fn include_extent(&mut self, other: &Extent) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y() - self.min.y()
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            Point2::from_vec((self.min.as_vec2() + self.max.as_vec2()) * 0.5)
        }

        /// 边界接触也视为相交。
        pub fn intersects(&self, other: &Extent) -> bool {
            if self.is_empty() || other.is_empty() {
                return false;
            }
            self.min.x() <= other.max.x()
                && self.max.x() >= other.min.x()
                && self.min.y() <= other.max.y()
                && self.max.y() >= other.min.y()
        }

        #[inline]
        pub fn to_array(&self) -> [f64; 4] {
            [self.min.x(), self.min.y(), self.max.x(), self.max.y()]
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum GeometryKind {
        Point,
        LineString,
        Polygon,
        MultiPoint,
        MultiLineString,
        MultiPolygon,
        Circle,
        GeometryCollection,
    }

    impl GeometryKind {
        pub fn as_str(self) -> &'static str {
            match self {
                GeometryKind::Point => "Point",
                GeometryKind::LineString => "LineString",
                GeometryKind::Polygon => "Polygon",
                GeometryKind::MultiPoint => "MultiPoint",
                GeometryKind::MultiLineString => "MultiLineString",
                GeometryKind::MultiPolygon => "MultiPolygon",
                GeometryKind::Circle => "Circle",
                GeometryKind::GeometryCollection => "GeometryCollection",
            }
        }
    }

    /// 要素几何。多边形以环列表表示，首环为外环。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum Geometry {
        Point(Point2),
        LineString(Vec<Point2>),
        Polygon(Vec<Vec<Point2>>),
        MultiPoint(Vec<Point2>),
        MultiLineString(Vec<Vec<Point2>>),
        MultiPolygon(Vec<Vec<Vec<Point2>>>),
        Circle { center: Point2, radius: f64 },
        GeometryCollection(Vec<Geometry>),
    }

    impl Geometry {
        pub fn kind(&self) -> GeometryKind {
            match self {
                Geometry::Point(_) => GeometryKind::Point,
                Geometry::LineString(_) => GeometryKind::LineString,
                Geometry::Polygon(_) => GeometryKind::Polygon,
                Geometry::MultiPoint(_) => GeometryKind::MultiPoint,
                Geometry::MultiLineString(_) => GeometryKind::MultiLineString,
                Geometry::MultiPolygon(_) => GeometryKind::MultiPolygon,
                Geometry::Circle { .. } => GeometryKind::Circle,
                Geometry::GeometryCollection(_) => GeometryKind::GeometryCollection,
            }
        }

        /// 以 `sides` 边正多边形近似圆，返回首尾闭合的单环多边形（共 `sides + 1` 个顶点）。
        pub fn circle_to_polygon(center: Point2, radius: f64, sides: usize) -> Geometry {
            let sides = sides.max(3);
            let ring = (0..=sides)
                .map(|index| {
                    let angle = (index % sides) as f64 * TAU / sides as f64;
                    Point2::new(
                        center.x() + radius * angle.cos(),
                        center.y() + radius * angle.sin(),
                    )
                })
                .collect();
            Geometry::Polygon(vec![ring])
        }

        pub fn extent(&self) -> Option<Extent> {
            let mut extent = Extent::empty();
            match self {
                Geometry::Circle { center, radius } => {
                    let radius = radius.abs();
                    extent.include_point(Point2::new(center.x() - radius, center.y() - radius));
                    extent.include_point(Point2::new(center.x() + radius, center.y() + radius));
                }
                _ => self.for_each_point(&mut |point| extent.include_point(point)),
            }
            if extent.is_empty() { None } else { Some(extent) }
        }

        /// 返回经仿射变换后的几何副本。圆半径按 X 轴缩放量换算。
        pub fn transformed(&self, transform: &DAffine2) -> Geometry {
            fn map_line(line: &[Point2], transform: &DAffine2) -> Vec<Point2> {
                line.iter().map(|point| point.transformed(transform)).collect()
            }
            fn map_rings(rings: &[Vec<Point2>], transform: &DAffine2) -> Vec<Vec<Point2>> {
                rings.iter().map(|ring| map_line(ring, transform)).collect()
            }

            match self {
                Geometry::Point(point) => Geometry::Point(point.transformed(transform)),
                Geometry::LineString(line) => Geometry::LineString(map_line(line, transform)),
                Geometry::MultiPoint(points) => Geometry::MultiPoint(map_line(points, transform)),
                Geometry::Polygon(rings) => Geometry::Polygon(map_rings(rings, transform)),
                Geometry::MultiLineString(lines) => {
                    Geometry::MultiLineString(map_rings(lines, transform))
                }
                Geometry::MultiPolygon(polygons) => Geometry::MultiPolygon(
                    polygons
                        .iter()
                        .map(|rings| map_rings(rings, transform))
                        .collect(),
                ),
                Geometry::Circle { center, radius } => Geometry::Circle {
                    center: center.transformed(transform),
                    radius: radius * transform.matrix2.x_axis.length(),
                },
                Geometry::GeometryCollection(children) => Geometry::GeometryCollection(
                    children.iter().map(|child| child.transformed(transform)).collect(),
                ),
            }
        }

        fn for_each_point(&self, visit: &mut dyn FnMut(Point2)) {
            match self {
                Geometry::Point(point) => visit(*point),
                Geometry::LineString(points) | Geometry::MultiPoint(points) => {
                    points.iter().copied().for_each(|p| visit(p));
                }
                Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                    rings.iter().flatten().copied().for_each(|p| visit(p));
                }
                Geometry::MultiPolygon(polygons) => {
                    polygons.iter().flatten().flatten().copied().for_each(|p| visit(p));
                }
                Geometry::Circle { center, .. } => visit(*center),
                Geometry::GeometryCollection(children) => {
                    for child in children {
                        child.for_each_point(visit);
                    }
                }
            }
        }
    }
}

pub mod color {
    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum ColorError {
        #[error("\"({r},{g},{b})\" is not a valid RGB color")]
        InvalidComponents { r: f64, g: f64, b: f64 },
        #[error("unable to parse color {0:?}")]
        Unparseable(String),
    }

    /// 颜色：RGBA 数组（r,g,b ∈ 0..=255，a ∈ 0..=1）或 CSS 颜色字符串。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum Color {
        Rgba([f64; 4]),
        Css(String),
    }

    impl Color {
        #[inline]
        pub fn rgb(r: f64, g: f64, b: f64) -> Self {
            Color::Rgba([r, g, b, 1.0])
        }

        #[inline]
        pub fn rgba(r: f64, g: f64, b: f64, a: f64) -> Self {
            Color::Rgba([r, g, b, a])
        }

        #[inline]
        pub fn css(value: impl Into<String>) -> Self {
            Color::Css(value.into())
        }

        /// 归一化为 `[r, g, b, a]`。不校验分量范围，范围校验由 [`rgb_array_to_hex`] 负责。
        pub fn to_rgba(&self) -> Result<[f64; 4], ColorError> {
            match self {
                Color::Rgba(rgba) => Ok(*rgba),
                Color::Css(value) => {
                    parse_css(value).ok_or_else(|| ColorError::Unparseable(value.clone()))
                }
            }
        }

        /// 稳定的文本形式，供样式标识拼接使用。
        pub fn describe(&self) -> String {
            match self {
                Color::Rgba([r, g, b, a]) => format!("{r},{g},{b},{a}"),
                Color::Css(value) => value.clone(),
            }
        }
    }

    /// 将 RGB(A) 数组转为 `#rrggbb`。分量必须是 0..=255 的整数。
    pub fn rgb_array_to_hex(rgba: &[f64; 4]) -> Result<String, ColorError> {
        let [r, g, b, _] = *rgba;
        let valid = |c: f64| c.fract() == 0.0 && (0.0..=255.0).contains(&c);
        if !(valid(r) && valid(g) && valid(b)) {
            return Err(ColorError::InvalidComponents { r, g, b });
        }
        Ok(format!("#{:02x}{:02x}{:02x}", r as u8, g as u8, b as u8))
    }

    fn parse_css(value: &str) -> Option<[f64; 4]> {
        let value = value.trim().to_ascii_lowercase();
        if let Some(hex) = value.strip_prefix('#') {
            return parse_hex(hex);
        }
        if let Some(body) = value
            .strip_prefix("rgba(")
            .or_else(|| value.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let parts: Vec<f64> = body
                .split(',')
                .map(|part| part.trim().parse::<f64>())
                .collect::<Result<_, _>>()
                .ok()?;
            return match parts.as_slice() {
                [r, g, b] => Some([*r, *g, *b, 1.0]),
                [r, g, b, a] => Some([*r, *g, *b, *a]),
                _ => None,
            };
        }
        named(&value)
    }

    fn parse_hex(hex: &str) -> Option<[f64; 4]> {
        let digit = |index: usize| u8::from_str_radix(hex.get(index..index + 1)?, 16).ok();
        let pair = |index: usize| u8::from_str_radix(hex.get(index..index + 2)?, 16).ok();
        match hex.len() {
            3 | 4 => {
                let r = digit(0)? * 17;
                let g = digit(1)? * 17;
                let b = digit(2)? * 17;
                let a = if hex.len() == 4 { digit(3)? * 17 } else { 255 };
                Some([r as f64, g as f64, b as f64, alpha(a)])
            }
            6 | 8 => {
                let a = if hex.len() == 8 { pair(6)? } else { 255 };
                Some([pair(0)? as f64, pair(2)? as f64, pair(4)? as f64, alpha(a)])
            }
            _ => None,
        }
    }

    fn alpha(raw: u8) -> f64 {
        (raw as f64 / 255.0 * 1000.0).round() / 1000.0
    }

    fn named(value: &str) -> Option<[f64; 4]> {
        let rgb = match value {
            "black" => [0.0, 0.0, 0.0],
            "white" => [255.0, 255.0, 255.0],
            "red" => [255.0, 0.0, 0.0],
            "green" => [0.0, 128.0, 0.0],
            "blue" => [0.0, 0.0, 255.0],
            "yellow" => [255.0, 255.0, 0.0],
            "orange" => [255.0, 165.0, 0.0],
            "gray" | "grey" => [128.0, 128.0, 128.0],
            "transparent" => return Some([0.0, 0.0, 0.0, 0.0]),
            _ => return None,
        };
        Some([rgb[0], rgb[1], rgb[2], 1.0])
    }
}

pub mod feature {
    use serde::{Deserialize, Serialize};
    use serde_json::{Map, Value};

    use crate::geometry::Geometry;
    use crate::style::StyleLike;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum FeatureId {
        Number(i64),
        Text(String),
    }

    /// 矢量要素：几何、属性以及可选的要素级样式。
    #[derive(Debug, Clone, Default)]
    pub struct Feature {
        pub id: Option<FeatureId>,
        pub geometry: Option<Geometry>,
        pub properties: Map<String, Value>,
        pub style: Option<StyleLike>,
    }

    impl Feature {
        pub fn new(geometry: Geometry) -> Self {
            Self {
                geometry: Some(geometry),
                ..Self::default()
            }
        }

        pub fn with_id(mut self, id: FeatureId) -> Self {
            self.id = Some(id);
            self
        }

        pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
            self.properties.insert(key.into(), value.into());
            self
        }

        pub fn with_style(mut self, style: StyleLike) -> Self {
            self.style = Some(style);
            self
        }

        /// 复制要素并替换几何（用于样式自带几何的情形）。
        pub fn with_geometry(&self, geometry: Geometry) -> Self {
            Self {
                geometry: Some(geometry),
                ..self.clone()
            }
        }
    }
}
