//! Documents discovered on the portal listing page.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Extension appended to a document name for its encrypted artifact.
pub const CIPHERTEXT_EXTENSION: &str = "gpg";

/// Query suffix the portal expects on download links.
const DOWNLOAD_SUFFIX: &str = "&download=True";

/// A document published on the portal.
///
/// The name is unique within a run and seeds the local file paths used by
/// every pipeline stage. Documents are read-only once the catalog built them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Document {
    /// Visible link text, used as the local file name.
    pub name: String,
    /// Link target as found in the listing, relative to the portal base URL.
    pub remote_path: String,
}

impl Document {
    pub fn new(name: impl Into<String>, remote_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remote_path: remote_path.into(),
        }
    }

    /// Check that the name can be used as a single path component.
    pub fn has_valid_name(&self) -> bool {
        !self.name.is_empty()
            && self.name != "."
            && self.name != ".."
            && !self.name.contains(['/', '\\', '\0'])
    }

    /// URL the document body is downloaded from.
    pub fn download_url(&self, base_url: &str) -> String {
        format!("{}{}{}", base_url, self.remote_path, DOWNLOAD_SUFFIX)
    }

    /// Where the plaintext lands in the working directory.
    pub fn local_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(&self.name)
    }

    /// File name of the encrypted artifact.
    pub fn ciphertext_name(&self) -> String {
        format!("{}.{}", self.name, CIPHERTEXT_EXTENSION)
    }

    /// Where the encrypted artifact lands in the temporary directory.
    pub fn ciphertext_path(&self, tmp_dir: &Path) -> PathBuf {
        tmp_dir.join(self.ciphertext_name())
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_url_appends_suffix() {
        let doc = Document::new("2024-01.pdf", "/Documents/Get?id=42");
        assert_eq!(
            doc.download_url("https://portal.example.com"),
            "https://portal.example.com/Documents/Get?id=42&download=True"
        );
    }

    #[test]
    fn test_local_paths() {
        let doc = Document::new("2024-01.pdf", "/x");
        assert_eq!(
            doc.local_path(Path::new("/srv/repo")),
            PathBuf::from("/srv/repo/2024-01.pdf")
        );
        assert_eq!(
            doc.ciphertext_path(Path::new("/tmp")),
            PathBuf::from("/tmp/2024-01.pdf.gpg")
        );
    }

    #[test]
    fn test_name_validation() {
        assert!(Document::new("payslip.pdf", "/x").has_valid_name());
        assert!(!Document::new("", "/x").has_valid_name());
        assert!(!Document::new("..", "/x").has_valid_name());
        assert!(!Document::new("../etc/passwd", "/x").has_valid_name());
        assert!(!Document::new("a\\b", "/x").has_valid_name());
    }
}
