//! Singer catalog handling
//!
//! The catalog selects streams and fields for a run and carries their schemas.
//! Discovery builds it from the schemas bundled with the tap.

mod discover;
mod types;

pub use discover::{catalog_entry, discover, load_schema, stream_metadata};
pub use types::{Catalog, CatalogEntry, MetadataEntry, MetadataMap};
