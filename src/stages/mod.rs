//! Per-document stage adapters.
//!
//! Each stage wraps one collaborator (portal download, encryption engine,
//! upload client, filesystem) and processes a single [`Document`]. The
//! [`into_action`] helper turns a stage into the closure the
//! [`PipelineExecutor`](crate::pipeline::PipelineExecutor) expects.

mod cleanup;
mod download;
mod encrypt;
mod upload;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::crypto::EncryptError;
use crate::errors::ErrorClass;
use crate::models::Document;
use crate::portal::HttpError;
use crate::upload::UploadError;

pub use cleanup::CleanupStage;
pub use download::DownloadStage;
pub use encrypt::EncryptStage;
pub use upload::UploadStage;

/// Failure of one document in one stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{document}: download failed: {source}")]
    Download {
        document: String,
        #[source]
        source: HttpError,
    },
    #[error("{document}: encryption failed: {source}")]
    Encrypt {
        document: String,
        #[source]
        source: EncryptError,
    },
    #[error("{document}: upload failed: {source}")]
    Upload {
        document: String,
        #[source]
        source: UploadError,
    },
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StageError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn class(&self) -> ErrorClass {
        ErrorClass::PerItemTransient
    }
}

/// One processing step applied to every document of a run.
#[async_trait]
pub trait Stage: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Line announcing the stage, e.g. "Start downloading 3 documents".
    fn start_message(&self, count: usize) -> String;

    /// Past-tense verb for the summary, e.g. "Downloaded".
    fn done_verb(&self) -> &'static str;

    async fn process(&self, document: &Document) -> Result<(), StageError>;
}

/// Wrap a stage as a pipeline action. Failures are left to the executor,
/// which logs each one.
pub fn into_action(
    stage: Arc<dyn Stage>,
) -> impl Fn(Document) -> BoxFuture<'static, Result<(), StageError>> + Send + Sync + 'static {
    move |document| {
        let stage = Arc::clone(&stage);
        Box::pin(async move { stage.process(&document).await })
    }
}
