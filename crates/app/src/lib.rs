pub mod batch;
pub mod config;
pub mod corpus;
pub mod pipeline;
pub mod watch;

pub use batch::{run_batch, BatchLedger};
pub use config::{ConfigError, PipelineConfig};
pub use corpus::load_corpus;
pub use pipeline::{Document, DocumentFailure, Pipeline, PipelineError, Stage, StatementReport};
