pub mod customizer;
pub mod encoder;
pub mod geojson;
pub mod raster;
pub mod spec;
pub mod symbolizer;
pub mod vector;
pub mod wmts;

pub mod errors {
    use mfprint_core::color::ColorError;
    use mfprint_core::geometry::GeometryKind;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EncodeError {
        #[error(transparent)]
        InvalidColor(#[from] ColorError),
        #[error("geometry category {} has no print symbolizer", .0.as_str())]
        UnsupportedGeometry(GeometryKind),
        #[error("tiled source of layer {layer:?} exposes no matrix set")]
        MissingMatrixDescriptor { layer: Option<String> },
        #[error("source of layer {layer:?} has no URL")]
        MissingUrl { layer: Option<String> },
        #[error("raster fallback failed: {0}")]
        Raster(String),
        #[error("vector tile compositing failed: {0}")]
        VectorTile(String),
        #[error(transparent)]
        Serialize(#[from] serde_json::Error),
    }
}

pub use customizer::{BaseCustomizer, Customizer};
pub use encoder::{
    EncodeOptions, PrintEncoder, SpecOptions, VectorTileCompositor, VectorTileImage,
    VectorTileRequest,
};
pub use errors::EncodeError;
pub use spec::PrintSpec;
