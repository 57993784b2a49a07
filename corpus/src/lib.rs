pub mod dataset;
pub mod document;
pub mod error;
pub mod loader;
mod partition;
mod pinned;
mod registry;

pub use dataset::{Dataset, DistributedDataset};
pub use document::{Document, SparseVector};
pub use error::{CorpusErr, Result};
pub use loader::{load_paths, read_documents, write_documents};
pub use partition::{HashPartitioner, Keyed, Partitioner};
pub use pinned::Pinned;
pub use registry::CacheRegistry;
