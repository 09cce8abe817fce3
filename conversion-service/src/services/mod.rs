pub mod conversion;
pub mod image_store;
pub mod metrics;
pub mod shaping;

pub use conversion::{validate_upload, ConversionService, UploadedFile};
pub use image_store::ImageStore;
pub use metrics::{get_metrics, init_metrics};
pub use shaping::shape_document;
