//! paycheck - payslip harvester.
//!
//! Logs into a session-authenticated portal, discovers the published
//! documents, downloads them and optionally encrypts and uploads them.
//! Every stage runs through the same concurrent [`pipeline::PipelineExecutor`].

pub mod cli;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod harvest;
pub mod models;
pub mod pipeline;
pub mod portal;
pub mod report;
pub mod stages;
pub mod upload;

pub use errors::ErrorClass;
pub use models::Document;
pub use pipeline::{PipelineExecutor, PipelineResult};
