//! End-to-end harvest runs against mock portal and Box servers.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use paycheck::crypto::{EncryptError, Encryptor};
use paycheck::harvest::{Harvest, HarvestError};
use paycheck::pipeline::PipelineExecutor;
use paycheck::portal::SessionClient;
use paycheck::report::{Reporter, TracingReporter};
use paycheck::stages::{into_action, CleanupStage, UploadStage};
use paycheck::upload::BoxClient;
use paycheck::{Document, PipelineResult};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENDPOINT: &str = "/app/payslips";
const SESSION_COOKIE: &str = ".AspNet.ApplicationCookie=abc123; path=/; HttpOnly";
const TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

const LISTING: &str = r#"<table>
<tr><td data-name="Name"><a href="/app/payslips/file?id=1">2024-01.pdf</a></td></tr>
<tr><td data-name="Name"><a href="/app/payslips/file?id=2">2024-02.pdf</a></td></tr>
<tr><td data-name="Name"><a href="/app/payslips/file?id=3">2024-03.pdf</a></td></tr>
</table>"#;

/// Writes `ENC:` followed by the plaintext.
struct FakeEncryptor;

#[async_trait]
impl Encryptor for FakeEncryptor {
    async fn encrypt(&self, plaintext: &Path, ciphertext: &Path) -> Result<(), EncryptError> {
        let mut data = b"ENC:".to_vec();
        data.extend(tokio::fs::read(plaintext).await?);
        tokio::fs::write(ciphertext, data).await?;
        Ok(())
    }
}

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl Recorder {
    fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl Reporter for Recorder {
    fn processing(&self, message: &str) {
        self.0.lock().unwrap().push(format!(".. {}", message));
    }
    fn ok(&self, message: &str) {
        self.0.lock().unwrap().push(format!("OK {}", message));
    }
    fn nok(&self, message: &str) {
        self.0.lock().unwrap().push(format!("KO {}", message));
    }
    fn warning(&self, message: &str) {
        self.0.lock().unwrap().push(format!("!! {}", message));
    }
    fn error(&self, _error: &dyn fmt::Display) {
        self.0.lock().unwrap().push("ERR".to_string());
    }
}

async fn mock_portal(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(302).insert_header("set-cookie", SESSION_COOKIE))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
        .mount(server)
        .await;
    for id in ["1", "2"] {
        Mock::given(method("GET"))
            .and(path("/app/payslips/file"))
            .and(query_param("id", id))
            .and(query_param("download", "True"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(format!("payslip {}", id)))
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/app/payslips/file"))
        .and(query_param("id", "3"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

fn stats(total: usize, success: usize) -> PipelineResult {
    PipelineResult {
        total,
        success,
        fails: total - success,
    }
}

fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

#[tokio::test]
async fn test_full_run_with_one_missing_document() {
    let portal = MockServer::start().await;
    mock_portal(&portal).await;

    let box_api = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files/content"))
        .and(header("authorization", "Bearer box-token"))
        .respond_with(ResponseTemplate::new(201))
        .expect(2)
        .mount(&box_api)
        .await;

    let repo = TempDir::new().unwrap();
    let tmp = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    let uploader = BoxClient::with_base_url("box-token", &box_api.uri(), TIMEOUT).unwrap();

    let harvest = Harvest::new(repo.path(), tmp.path(), recorder.clone())
        .with_encryptor(Arc::new(FakeEncryptor))
        .with_uploader(Arc::new(uploader), "12345");

    let client = SessionClient::new(&portal.uri(), ENDPOINT).unwrap();
    let report = harvest.run(client, "alice", "secret").await.unwrap();

    assert_eq!(report.documents, 3);
    assert_eq!(report.download, stats(3, 2));
    assert_eq!(report.encrypt, Some(stats(3, 2)));
    assert_eq!(report.upload, Some(stats(3, 2)));
    // The failed download never produced a ciphertext to remove.
    assert_eq!(report.cleanup, Some(stats(3, 2)));

    let saved = std::fs::read(repo.path().join("2024-01.pdf")).unwrap();
    assert_eq!(saved, b"payslip 1");
    assert!(!repo.path().join("2024-03.pdf").exists());
    assert_eq!(file_count(tmp.path()), 0);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(repo.path().join("2024-02.pdf"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    let lines = recorder.lines();
    assert_eq!(lines[0], format!("OK Login to {}", portal.uri()));
    assert_eq!(lines[1], "OK Get documents to download");
    assert_eq!(lines[2], ".. Start downloading 3 documents");
    assert!(lines.contains(&"OK Downloaded 2 files".to_string()));
    assert!(lines.contains(&"KO 1 files failed".to_string()));
    assert!(lines.contains(&".. Removing 3 files from temp folder".to_string()));
    assert!(lines.contains(&"OK Deleted 2 files".to_string()));
    // Item failures are logged by the executor, not reported.
    assert!(!lines.contains(&"ERR".to_string()));
}

#[tokio::test]
async fn test_download_only_run() {
    let portal = MockServer::start().await;
    mock_portal(&portal).await;

    let repo = TempDir::new().unwrap();
    let tmp = TempDir::new().unwrap();
    let harvest = Harvest::new(repo.path(), tmp.path(), Arc::new(TracingReporter));

    let client = SessionClient::new(&portal.uri(), ENDPOINT).unwrap();
    let report = harvest.run(client, "alice", "secret").await.unwrap();

    assert_eq!(report.download, stats(3, 2));
    assert_eq!(report.encrypt, None);
    assert_eq!(report.upload, None);
    assert_eq!(report.cleanup, None);
    assert_eq!(file_count(repo.path()), 2);
    assert_eq!(file_count(tmp.path()), 0);
}

#[tokio::test]
async fn test_failed_login_stops_before_downloads() {
    let portal = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(403))
        .mount(&portal)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&portal)
        .await;

    let repo = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    let harvest = Harvest::new(repo.path(), repo.path(), recorder.clone());

    let client = SessionClient::new(&portal.uri(), ENDPOINT).unwrap();
    let err = harvest.run(client, "alice", "nope").await.unwrap_err();

    assert!(matches!(err, HarvestError::Auth(_)));
    assert!(err.class().is_fatal());
    assert_eq!(
        recorder.lines(),
        vec![format!("KO Login to {}", portal.uri()), "ERR".to_string()]
    );
}

#[tokio::test]
async fn test_stage_setup_error_is_reported() {
    let portal = MockServer::start().await;
    mock_portal(&portal).await;

    let repo = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    let harvest =
        Harvest::new(repo.path(), repo.path(), recorder.clone()).with_max_concurrency(Some(0));

    let client = SessionClient::new(&portal.uri(), ENDPOINT).unwrap();
    let err = harvest.run(client, "alice", "secret").await.unwrap_err();

    assert!(matches!(err, HarvestError::Pipeline(_)));
    let lines = recorder.lines();
    assert_eq!(lines.last().map(String::as_str), Some("ERR"));
    assert_eq!(lines.iter().filter(|l| *l == "ERR").count(), 1);
}

#[tokio::test]
async fn test_upload_conflict_counts_as_success() {
    let box_api = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files/content"))
        .respond_with(ResponseTemplate::new(409))
        .expect(2)
        .mount(&box_api)
        .await;

    let tmp = TempDir::new().unwrap();
    let documents = vec![
        Document::new("a.pdf", "/file?id=a"),
        Document::new("b.pdf", "/file?id=b"),
    ];
    for document in &documents {
        std::fs::write(document.ciphertext_path(tmp.path()), b"ciphertext").unwrap();
    }

    let uploader = BoxClient::with_base_url("box-token", &box_api.uri(), TIMEOUT).unwrap();
    let stage = UploadStage::new(Arc::new(uploader), "12345", tmp.path());
    let action = into_action(Arc::new(stage));

    let result = PipelineExecutor::new("upload")
        .run(documents, action)
        .await
        .unwrap();
    assert_eq!(result, stats(2, 2));
}

#[tokio::test]
async fn test_cleanup_after_partial_encryption() {
    let tmp = TempDir::new().unwrap();
    let documents: Vec<Document> = (1..=5)
        .map(|i| Document::new(format!("doc{}.pdf", i), format!("/file?id={}", i)))
        .collect();
    // Encryption failed for the last two documents.
    for document in &documents[..3] {
        std::fs::write(document.ciphertext_path(tmp.path()), b"ciphertext").unwrap();
    }

    let stage = CleanupStage::new(tmp.path());
    let action = into_action(Arc::new(stage));
    let result = PipelineExecutor::new("cleanup")
        .run(documents, action)
        .await
        .unwrap();

    assert_eq!(result, stats(5, 3));
    assert_eq!(file_count(tmp.path()), 0);
}
