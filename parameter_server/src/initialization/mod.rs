mod chained;
mod constant;
mod param_gen;
mod random;
mod values;

pub use chained::ChainedParamGen;
pub use constant::ConstParamGen;
pub use param_gen::ParamGen;
pub use random::RandParamGen;
pub use values::ValuesParamGen;
