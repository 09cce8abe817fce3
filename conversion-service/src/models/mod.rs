pub mod docling;

pub use docling::{DoclingDocument, ItemRef, PictureAnnotation, RefItem};
