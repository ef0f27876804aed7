//! Upload stage: push each ciphertext to the remote folder.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Stage, StageError};
use crate::models::Document;
use crate::upload::{UploadOutcome, Uploader};

pub struct UploadStage {
    uploader: Arc<dyn Uploader>,
    folder_id: String,
    tmp_dir: PathBuf,
}

impl UploadStage {
    pub fn new(uploader: Arc<dyn Uploader>, folder_id: &str, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            uploader,
            folder_id: folder_id.to_string(),
            tmp_dir: tmp_dir.into(),
        }
    }
}

#[async_trait]
impl Stage for UploadStage {
    fn name(&self) -> &'static str {
        "upload"
    }

    fn start_message(&self, count: usize) -> String {
        format!("Start uploading {} documents", count)
    }

    fn done_verb(&self) -> &'static str {
        "Uploaded"
    }

    async fn process(&self, document: &Document) -> Result<(), StageError> {
        let ciphertext = document.ciphertext_path(&self.tmp_dir);

        let outcome = self
            .uploader
            .upload(&ciphertext, &self.folder_id)
            .await
            .map_err(|source| StageError::Upload {
                document: document.name.clone(),
                source,
            })?;

        match outcome {
            UploadOutcome::Created => debug!("Uploaded {}", document.name),
            UploadOutcome::AlreadyExists => {
                info!("{} already present in folder {}", document.name, self.folder_id)
            }
        }
        Ok(())
    }
}
