mod shard;
mod store;

pub(super) use shard::ModelShard;
pub use store::ModelStore;
