pub mod config;
pub mod error;
pub mod db;
pub mod processing;
pub mod kb;
pub mod pipeline;
pub mod walker;

pub use config::Config;
pub use error::{KbenrichError, Result};
pub use pipeline::{KnowledgePipeline, SubmitOutcome};
