//! Public-key encryption of downloaded documents.
//!
//! The pipeline only sees the [`Encryptor`] trait. [`GpgEncryptor`] drives
//! the system `gpg` binary, encrypting for the recipient key stored in the
//! configured public key file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum EncryptError {
    #[error("encryption backend not available: {0}")]
    BackendNotAvailable(String),
    #[error("public key not found: {}", .0.display())]
    MissingKey(PathBuf),
    #[error("encryption failed: {0}")]
    Failed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encrypts a plaintext file into a ciphertext file.
#[async_trait]
pub trait Encryptor: Send + Sync {
    async fn encrypt(&self, plaintext: &Path, ciphertext: &Path) -> Result<(), EncryptError>;
}

/// OpenPGP encryption through the `gpg` command line tool.
#[derive(Debug, Clone)]
pub struct GpgEncryptor {
    program: PathBuf,
    public_key: PathBuf,
}

impl GpgEncryptor {
    /// Locate `gpg` on the PATH and bind it to `public_key`.
    pub fn new(public_key: &Path) -> Result<Self, EncryptError> {
        let program = which::which("gpg").map_err(|_| {
            EncryptError::BackendNotAvailable(
                "gpg not found (install gnupg)".to_string(),
            )
        })?;
        Self::with_program(program, public_key)
    }

    /// Use a specific `gpg` executable.
    pub fn with_program(program: PathBuf, public_key: &Path) -> Result<Self, EncryptError> {
        if !public_key.is_file() {
            return Err(EncryptError::MissingKey(public_key.to_path_buf()));
        }
        Ok(Self {
            program,
            public_key: public_key.to_path_buf(),
        })
    }

    pub fn public_key(&self) -> &Path {
        &self.public_key
    }

    /// Arguments for one encryption. The key file is used directly, so the
    /// user's keyring is neither consulted nor modified.
    fn encrypt_args(&self, plaintext: &Path, ciphertext: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "--batch",
            "--yes",
            "--quiet",
            "--no-tty",
            "--trust-model",
            "always",
            "--recipient-file",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(self.public_key.clone().into_os_string());
        args.push("--output".into());
        args.push(ciphertext.as_os_str().to_os_string());
        args.push("--encrypt".into());
        args.push(plaintext.as_os_str().to_os_string());
        args
    }
}

#[async_trait]
impl Encryptor for GpgEncryptor {
    async fn encrypt(&self, plaintext: &Path, ciphertext: &Path) -> Result<(), EncryptError> {
        debug!("Encrypting {:?} -> {:?}", plaintext, ciphertext);

        let output = Command::new(&self.program)
            .args(self.encrypt_args(plaintext, ciphertext))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(EncryptError::Failed(format!(
                    "gpg exited with {}: {}",
                    output.status,
                    stderr.trim()
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                EncryptError::BackendNotAvailable(format!("{} not found", self.program.display())),
            ),
            Err(e) => Err(EncryptError::Io(e)),
        }
    }
}
