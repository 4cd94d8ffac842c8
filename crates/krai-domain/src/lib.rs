// krai-domain library entry point
pub mod chunk;
pub mod document;
pub mod error_code;
pub mod errors;
pub mod image;
pub mod link;
pub mod part;
pub mod product;
pub use chunk::Chunk;
pub use document::{Document, DocumentType};
pub use error_code::{ErrorCode, Severity};
pub use errors::DomainError;
pub use image::{BoundingBox, ExtractedImage};
pub use link::{Link, ScrapeStatus, Video, VideoPlatform};
pub use part::Part;
pub use product::{Manufacturer, Product, ProductType, Series};
