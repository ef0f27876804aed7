//! Cleanup stage: remove the temporary ciphertexts.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{Stage, StageError};
use crate::models::Document;

/// Removes `<tmp>/<name>.gpg` for every document, whatever happened to it in
/// earlier stages. A missing file counts as a failed removal.
pub struct CleanupStage {
    tmp_dir: PathBuf,
}

impl CleanupStage {
    pub fn new(tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            tmp_dir: tmp_dir.into(),
        }
    }
}

#[async_trait]
impl Stage for CleanupStage {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    fn start_message(&self, count: usize) -> String {
        format!("Removing {} files from temp folder", count)
    }

    fn done_verb(&self) -> &'static str {
        "Deleted"
    }

    async fn process(&self, document: &Document) -> Result<(), StageError> {
        let ciphertext = document.ciphertext_path(&self.tmp_dir);
        tokio::fs::remove_file(&ciphertext)
            .await
            .map_err(|e| StageError::io(&ciphertext, e))
    }
}
