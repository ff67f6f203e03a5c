pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{FileProgressLog, LocalStorage, SqliteStore};
pub use app::pipelines::TabularPipeline;
pub use config::TomlConfig;
pub use crate::core::etl::{PipelineRunner, RunOutcome};
pub use domain::model::{Cell, PipelineState, QueryResult, RecordSet, Stage};
pub use utils::error::{EtlError, Result};
