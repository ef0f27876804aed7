//! Stage sequencing for one harvest run.
//!
//! login → listing → download → [encrypt] → [upload → cleanup]
//!
//! Each stage is a barrier: it starts only after every document has finished
//! the previous one.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::crypto::Encryptor;
use crate::errors::ErrorClass;
use crate::models::Document;
use crate::pipeline::{PipelineError, PipelineExecutor, PipelineResult};
use crate::portal::{AuthError, CatalogError, DocumentCatalog, SessionClient};
use crate::report::Reporter;
use crate::stages::{
    into_action, CleanupStage, DownloadStage, EncryptStage, Stage, UploadStage,
};
use crate::upload::Uploader;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl HarvestError {
    pub fn class(&self) -> ErrorClass {
        match self {
            HarvestError::Auth(e) => e.class(),
            HarvestError::Catalog(e) => e.class(),
            HarvestError::Pipeline(e) => e.class(),
        }
    }
}

/// Per-stage results of a run. Stages that did not run are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HarvestReport {
    pub documents: usize,
    pub download: PipelineResult,
    pub encrypt: Option<PipelineResult>,
    pub upload: Option<PipelineResult>,
    pub cleanup: Option<PipelineResult>,
}

struct UploadTarget {
    uploader: Arc<dyn Uploader>,
    folder_id: String,
}

/// Configured harvest: where files go and which optional stages run.
pub struct Harvest {
    work_dir: PathBuf,
    tmp_dir: PathBuf,
    reporter: Arc<dyn Reporter>,
    encryptor: Option<Arc<dyn Encryptor>>,
    upload: Option<UploadTarget>,
    max_concurrency: Option<usize>,
}

impl Harvest {
    pub fn new(
        work_dir: impl Into<PathBuf>,
        tmp_dir: impl Into<PathBuf>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            work_dir: work_dir.into(),
            tmp_dir: tmp_dir.into(),
            reporter,
            encryptor: None,
            upload: None,
            max_concurrency: None,
        }
    }

    /// Enable the encrypt stage.
    pub fn with_encryptor(mut self, encryptor: Arc<dyn Encryptor>) -> Self {
        self.encryptor = Some(encryptor);
        self
    }

    /// Enable the upload and cleanup stages. Only honoured together with
    /// an encryptor: plaintext is never uploaded.
    pub fn with_uploader(mut self, uploader: Arc<dyn Uploader>, folder_id: &str) -> Self {
        self.upload = Some(UploadTarget {
            uploader,
            folder_id: folder_id.to_string(),
        });
        self
    }

    /// Cap in-flight items per stage. `None` means one task per document.
    pub fn with_max_concurrency(mut self, limit: Option<usize>) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// Log in, list the documents and run every enabled stage.
    ///
    /// Every error returned here has already been passed to the reporter.
    pub async fn run(
        &self,
        mut client: SessionClient,
        username: &str,
        password: &str,
    ) -> Result<HarvestReport, HarvestError> {
        let login = client.login(username, password).await;
        self.reporter.outcome(
            &format!("Login to {}", client.base_url()),
            login.as_ref().err().map(|e| e as &dyn fmt::Display),
        );
        login?;

        let client = Arc::new(client);
        let listing = DocumentCatalog::new(Arc::clone(&client)).list().await;
        self.reporter.outcome(
            "Get documents to download",
            listing.as_ref().err().map(|e| e as &dyn fmt::Display),
        );
        let documents: Vec<Document> = listing?.into_iter().collect();

        let report = self.process(client, documents).await;
        if let Err(ref e) = report {
            self.reporter.error(e);
        }
        Ok(report?)
    }

    /// Run the stages over an already discovered document list.
    pub async fn process(
        &self,
        client: Arc<SessionClient>,
        documents: Vec<Document>,
    ) -> Result<HarvestReport, PipelineError> {
        let mut report = HarvestReport {
            documents: documents.len(),
            ..Default::default()
        };

        let download = DownloadStage::new(client, &self.work_dir);
        report.download = self.run_stage(Arc::new(download), &documents).await?;

        let Some(encryptor) = self.encryptor.clone() else {
            if self.upload.is_some() {
                warn!("Upload requested without encryption; skipping upload");
            }
            return Ok(report);
        };

        let encrypt = EncryptStage::new(encryptor, &self.work_dir, &self.tmp_dir);
        report.encrypt = Some(self.run_stage(Arc::new(encrypt), &documents).await?);

        if let Some(target) = &self.upload {
            let upload = UploadStage::new(
                Arc::clone(&target.uploader),
                &target.folder_id,
                &self.tmp_dir,
            );
            let uploaded = self.run_stage(Arc::new(upload), &documents).await;

            // Temporary ciphertexts go away even when the upload run broke.
            let cleanup = CleanupStage::new(&self.tmp_dir);
            report.cleanup = Some(self.run_stage(Arc::new(cleanup), &documents).await?);
            report.upload = Some(uploaded?);
        }

        info!(?report, "Harvest finished");
        Ok(report)
    }

    async fn run_stage(
        &self,
        stage: Arc<dyn Stage>,
        documents: &[Document],
    ) -> Result<PipelineResult, PipelineError> {
        self.reporter.processing(&stage.start_message(documents.len()));

        let executor =
            PipelineExecutor::new(stage.name()).with_max_concurrency(self.max_concurrency);
        let done_verb = stage.done_verb();
        let action = into_action(stage);
        let result = executor.run(documents.to_vec(), action).await?;

        self.reporter.stage_summary(done_verb, &result);
        Ok(result)
    }
}
