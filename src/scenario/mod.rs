//! Persisted scenarios: the YAML action list a recording produces and a
//! replay consumes.

pub mod env;
pub mod models;
pub mod parser;

pub use env::{expand_env, expand_vars, Expanded};
pub use models::*;
pub use parser::{load, parse_file, parse_yaml, save_file, to_yaml, validate};
