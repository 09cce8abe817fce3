pub mod document;
pub mod status;

pub use document::{
    ConversionResponse, ConversionStatus, DocumentBody, Element, PageInfo, PageSize,
    DEFAULT_PAGE_SIZE,
};
pub use status::{ServiceInfo, StatusResponse};
