mod catalog;
mod merge;
mod record;
mod slug;

pub use catalog::{resolve_catalog, CatalogError};
pub use merge::{build_record, update_record};
pub use record::{PreviewRecord, RecordError, ServiceEntry, ServiceMetadata};
pub use slug::slugify;
