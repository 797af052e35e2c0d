pub mod engine;
pub mod parser;
pub mod types;

pub use engine::{PolicyEngine, Ruleset};
pub use types::*;
