mod error;
mod gibbs;
mod hdp;
mod online;
mod optimizer;
mod params;
mod special;
mod topics;

pub use error::{InferenceErr, Result};
pub use gibbs::GibbsLda;
pub use hdp::OnlineHdp;
pub use online::OnlineLda;
pub use optimizer::{Diagnostics, DocDiagnostics, Optimizer, Score, TopicOptimizer};
pub use params::{Algorithm, InferenceParams};
pub use topics::TopicTerms;
