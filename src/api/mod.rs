pub mod models;
pub mod repository;
pub mod search;

pub use models::{AssetKind, Layer, Map, MapListing, Project, UploadReport, UploadRequest};
pub use repository::{AssetRepository, LocalFile};
pub use search::filter_maps;
