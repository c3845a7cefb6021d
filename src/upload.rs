use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::error::ConvertError;

/// Decides which uploads are read and where they are staged while reading
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    dir: PathBuf,
    allowed_extensions: Vec<String>,
}

impl UploadPolicy {
    pub fn new(dir: PathBuf, allowed_extensions: Vec<String>) -> Self {
        Self {
            dir,
            allowed_extensions,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True when `filename` has an extension on the allow-list (case-insensitive)
    pub fn is_allowed(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) => {
                let ext = ext.to_lowercase();
                self.allowed_extensions.iter().any(|allowed| *allowed == ext)
            }
            None => false,
        }
    }

    /// Stage the upload on disk, read it back once and decode it as UTF-8.
    /// The staged file is removed on every path out of this function.
    pub async fn read_upload(&self, filename: &str, data: &[u8]) -> Result<String, ConvertError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let staged = StagedFile {
            path: self
                .dir
                .join(format!("{}-{}", Uuid::new_v4(), secure_filename(filename))),
        };

        tokio::fs::write(&staged.path, data).await?;
        let bytes = tokio::fs::read(&staged.path).await?;
        debug!("Read {} bytes from upload {}", bytes.len(), filename);

        decode_utf8(&bytes).ok_or_else(|| {
            ConvertError::Unexpected(format!("uploaded file {} is not valid UTF-8", filename))
        })
    }
}

struct StagedFile {
    path: PathBuf,
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed staged upload: {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove staged upload {}: {}", self.path.display(), e),
        }
    }
}

/// Strict UTF-8 decoding with a leading byte order mark removed
pub fn decode_utf8(bytes: &[u8]) -> Option<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    encoding_rs::UTF_8
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
}

fn unsafe_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("valid filename pattern"))
}

/// Reduce a client-supplied filename to a safe, flat ASCII name.
/// Accented letters are decomposed and keep their ASCII base.
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename.nfkd().filter(char::is_ascii).collect();
    let flattened = ascii.replace(['/', '\\'], " ");
    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = unsafe_chars().replace_all(&joined, "");
    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c == '_');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}
