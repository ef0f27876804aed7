//! Download stage: fetch each document into the working directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{Stage, StageError};
use crate::models::Document;
use crate::portal::{HttpError, SessionClient, StatusCheck};

/// Owner-only read/write.
#[cfg(unix)]
const PRIVATE_FILE_MODE: u32 = 0o600;

pub struct DownloadStage {
    client: Arc<SessionClient>,
    work_dir: PathBuf,
}

impl DownloadStage {
    pub fn new(client: Arc<SessionClient>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            work_dir: work_dir.into(),
        }
    }
}

/// Create (or truncate) a file only the owner can read.
async fn create_private(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(PRIVATE_FILE_MODE);

    let file = options.open(path).await?;

    // mode() only applies to new files; tighten files left by earlier runs.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(PRIVATE_FILE_MODE))
            .await?;
    }

    Ok(file)
}

#[async_trait]
impl Stage for DownloadStage {
    fn name(&self) -> &'static str {
        "download"
    }

    fn start_message(&self, count: usize) -> String {
        format!("Start downloading {} documents", count)
    }

    fn done_verb(&self) -> &'static str {
        "Downloaded"
    }

    async fn process(&self, document: &Document) -> Result<(), StageError> {
        let url = document.download_url(self.client.base_url());
        let download_err = |source: HttpError| StageError::Download {
            document: document.name.clone(),
            source,
        };

        let mut response = self
            .client
            .authenticated_get(&url, StatusCheck::ExactlyOk)
            .await
            .map_err(download_err)?;

        let path = document.local_path(&self.work_dir);
        let mut file = create_private(&path)
            .await
            .map_err(|e| StageError::io(&path, e))?;

        let mut written = 0usize;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| download_err(e.into()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| StageError::io(&path, e))?;
            written += chunk.len();
        }
        file.flush().await.map_err(|e| StageError::io(&path, e))?;

        debug!("Downloaded {} ({} bytes) to {:?}", document.name, written, path);
        Ok(())
    }
}
