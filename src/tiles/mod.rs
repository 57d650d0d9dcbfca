//! Raster tiles: where they come from, where they are kept, how they load.

pub mod cache;
pub mod loader;
pub mod source;

pub use cache::TileCache;
pub use loader::{TileLoader, TileResult};
pub use source::{TemplateSource, TileSource};
