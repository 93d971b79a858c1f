// Disk storage for assignment attachments and submission files

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// URL prefix under which stored files are served.
pub const PUBLIC_PREFIX: &str = "/uploads/";

#[derive(Clone, Debug)]
pub struct UploadStore {
    base_path: PathBuf,
}

impl UploadStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create upload directory: {e}")))?;
        Ok(())
    }

    /// Writes `data` under a collision-free name and returns its public path.
    pub async fn save(&self, original_name: &str, data: &[u8]) -> Result<String> {
        let stored_name = stored_file_name(original_name);
        let path = self.base_path.join(&stored_name);

        fs::write(&path, data)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write upload: {e}")))?;

        tracing::debug!(file = %stored_name, bytes = data.len(), "upload stored");
        Ok(format!("{PUBLIC_PREFIX}{stored_name}"))
    }

    /// Maps a public `/uploads/<name>` path back onto disk. Anything that is
    /// not a plain file name inside the store resolves to `None`.
    pub fn resolve(&self, public_path: &str) -> Option<PathBuf> {
        let name = public_path.strip_prefix(PUBLIC_PREFIX)?;
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return None;
        }
        Some(self.base_path.join(name))
    }

    /// Best-effort delete; a failure leaves an orphaned file and is only logged.
    pub async fn remove(&self, public_path: &str) {
        let Some(path) = self.resolve(public_path) else {
            tracing::warn!(path = %public_path, "refusing to remove path outside upload store");
            return;
        };

        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove upload");
            }
        }
    }

    pub async fn remove_all<I, S>(&self, public_paths: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in public_paths {
            self.remove(path.as_ref()).await;
        }
    }
}

/// `<timestamp_ms>-<random>-<sanitized original name>`
pub fn stored_file_name(original_name: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        Utc::now().timestamp_millis(),
        &random[..8],
        sanitize_file_name(original_name)
    )
}

/// Keeps the final path component and replaces anything outside
/// `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}
