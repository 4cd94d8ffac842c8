//! Repositorios por esquema.

mod catalog;
mod content;
mod documents;
mod intelligence;
mod parts;

pub use catalog::CatalogRepository;
pub use content::ContentRepository;
pub use documents::DocumentRepository;
pub use intelligence::IntelligenceRepository;
pub use parts::PartsRepository;
