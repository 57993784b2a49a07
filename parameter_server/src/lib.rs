mod checkpoint;
mod error;
mod handle;
pub mod initialization;
mod merge;
mod spec;
mod storage;

pub use checkpoint::Checkpoint;
pub use error::{PsErr, Result};
pub use handle::{MonitorPath, ServerHandle, distribute, resume};
pub use merge::{MergeRule, PriorRegion};
pub use spec::{InitSpec, ModelSpec};
