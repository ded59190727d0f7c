pub mod config;
pub mod db;
pub mod error;
pub mod eval;
pub mod execution_loop;
pub mod feedback;
pub mod prompting;
pub mod providers;
pub mod validation;

pub use config::Settings;
pub use db::{Database, SqliteDatabase};
pub use error::{PipelineError, Result};
pub use execution_loop::{PipelineOutput, TextToSqlPipeline};
pub use providers::{ProviderRegistry, SqlGenerator};
