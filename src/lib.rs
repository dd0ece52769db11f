//! Record browser interactions as a replayable scenario, then replay it as a
//! narrated, captioned walkthrough.

pub mod browser;
pub mod config;
pub mod context;
pub mod error;
pub mod media;
pub mod models;
pub mod recording;
pub mod replay;
pub mod resolver;
pub mod scenario;
pub mod timing;

pub use config::Config;
pub use context::SessionContext;
pub use error::{AppError, Result};
