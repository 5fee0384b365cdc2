//! Method-level analyses: scope, dominators, liveness

mod dominators;
mod liveness;
mod scope;

pub use dominators::Dominators;
pub use liveness::Liveness;
pub use scope::Scope;
