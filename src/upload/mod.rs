//! Upload of encrypted artifacts to Box.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Box upload API root.
pub const BOX_UPLOAD_URL: &str = "https://upload.box.com/api/2.0";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload of {name} rejected with HTTP {status}")]
    BadStatus { name: String, status: StatusCode },
    #[error("file has no usable name: {0}")]
    InvalidFileName(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("upload request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("failed to encode attributes: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What the remote did with an accepted upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Created,
    /// A file with that name already exists in the target folder.
    AlreadyExists,
}

/// Sends a local file to a remote folder.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, file: &Path, folder_id: &str) -> Result<UploadOutcome, UploadError>;
}

#[derive(Serialize)]
struct Parent<'a> {
    id: &'a str,
}

#[derive(Serialize)]
struct Attributes<'a> {
    name: &'a str,
    parent: Parent<'a>,
}

/// Minimal Box content upload client.
#[derive(Debug, Clone)]
pub struct BoxClient {
    client: Client,
    token: String,
    base_url: String,
}

impl BoxClient {
    pub fn new(token: &str, timeout: Duration) -> Result<Self, UploadError> {
        Self::with_base_url(token, BOX_UPLOAD_URL, timeout)
    }

    /// Point the client at a different API root.
    pub fn with_base_url(token: &str, base_url: &str, timeout: Duration) -> Result<Self, UploadError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token: token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn content_url(&self) -> String {
        format!("{}/files/content", self.base_url)
    }
}

/// Map an upload response status. A conflict means the file is already
/// there, which is as good as created.
fn classify_status(name: &str, status: StatusCode) -> Result<UploadOutcome, UploadError> {
    match status {
        StatusCode::CREATED => Ok(UploadOutcome::Created),
        StatusCode::CONFLICT => Ok(UploadOutcome::AlreadyExists),
        _ => Err(UploadError::BadStatus {
            name: name.to_string(),
            status,
        }),
    }
}

#[async_trait]
impl Uploader for BoxClient {
    async fn upload(&self, file: &Path, folder_id: &str) -> Result<UploadOutcome, UploadError> {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| UploadError::InvalidFileName(file.display().to_string()))?
            .to_string();

        let content = tokio::fs::read(file).await?;
        debug!("Uploading {} ({} bytes) to folder {}", name, content.len(), folder_id);

        let attributes = serde_json::to_string(&Attributes {
            name: &name,
            parent: Parent { id: folder_id },
        })?;

        let form = Form::new()
            .text("attributes", attributes)
            .part("file", Part::bytes(content).file_name(name.clone()));

        let response = self
            .client
            .post(self.content_url())
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .multipart(form)
            .send()
            .await?;

        classify_status(&name, response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_not_a_failure() {
        assert_eq!(
            classify_status("a.gpg", StatusCode::CREATED).unwrap(),
            UploadOutcome::Created
        );
        assert_eq!(
            classify_status("a.gpg", StatusCode::CONFLICT).unwrap(),
            UploadOutcome::AlreadyExists
        );
    }

    #[test]
    fn test_other_statuses_fail() {
        for status in [StatusCode::OK, StatusCode::UNAUTHORIZED, StatusCode::BAD_GATEWAY] {
            assert!(matches!(
                classify_status("a.gpg", status),
                Err(UploadError::BadStatus { .. })
            ));
        }
    }

    #[test]
    fn test_attributes_shape() {
        let json = serde_json::to_value(Attributes {
            name: "a.pdf.gpg",
            parent: Parent { id: "12345" },
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "a.pdf.gpg", "parent": {"id": "12345"}})
        );
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client =
            BoxClient::with_base_url("t", "http://localhost:1234/", Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.content_url(), "http://localhost:1234/files/content");
    }
}
