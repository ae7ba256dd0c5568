pub mod catalog;
pub mod index;
pub mod object_store;
pub mod publish;
pub mod snapshot;

pub use catalog::{Catalog, CatalogError, CollectionRecord, KnowledgeBaseRecord, NewKnowledgeBase};
pub use index::{DocMetadata, MetadataTable, VectorIndex};
pub use object_store::{InMemoryObjectStore, LocalObjectStore, ObjectStore, ObjectStoreError};
pub use publish::{IndexStore, IndexStoreError, INDEX_NAMESPACE};
pub use snapshot::{IndexSnapshot, IndexVersion, SnapshotError};
