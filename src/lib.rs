pub mod batch;
pub mod cli;
pub mod config;
pub mod domain_utils;
pub mod export;
pub mod extraction;
pub mod fabricator;
pub mod governor;
pub mod logger;
pub mod normalizer;
pub mod outcome;
pub mod overrides;
pub mod pipeline;
pub mod reconcile;
pub mod record;
pub mod sink;
pub mod sources;

pub use outcome::Outcome;
pub use pipeline::{Pipeline, PipelineError, RunOutput};
pub use record::{Attribute, CompanyRecord, FieldProvenance, ProcessingStatus};
pub use sources::SourceId;
