//! Encrypt stage: turn each downloaded document into `<tmp>/<name>.gpg`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Stage, StageError};
use crate::crypto::Encryptor;
use crate::models::Document;

pub struct EncryptStage {
    encryptor: Arc<dyn Encryptor>,
    work_dir: PathBuf,
    tmp_dir: PathBuf,
}

impl EncryptStage {
    pub fn new(
        encryptor: Arc<dyn Encryptor>,
        work_dir: impl Into<PathBuf>,
        tmp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            encryptor,
            work_dir: work_dir.into(),
            tmp_dir: tmp_dir.into(),
        }
    }
}

#[async_trait]
impl Stage for EncryptStage {
    fn name(&self) -> &'static str {
        "encrypt"
    }

    fn start_message(&self, count: usize) -> String {
        format!("Start encrypting {} documents", count)
    }

    fn done_verb(&self) -> &'static str {
        "Encrypted"
    }

    async fn process(&self, document: &Document) -> Result<(), StageError> {
        let plaintext = document.local_path(&self.work_dir);
        let ciphertext = document.ciphertext_path(&self.tmp_dir);

        // Only a stat: a document whose download failed has nothing to
        // encrypt, and the encryptor reads the file itself.
        let metadata = tokio::fs::metadata(&plaintext)
            .await
            .map_err(|e| StageError::io(&plaintext, e))?;
        if !metadata.is_file() {
            return Err(StageError::io(
                &plaintext,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        self.encryptor
            .encrypt(&plaintext, &ciphertext)
            .await
            .map_err(|source| StageError::Encrypt {
                document: document.name.clone(),
                source,
            })?;

        debug!("Encrypted {} to {:?}", document.name, ciphertext);
        Ok(())
    }
}
