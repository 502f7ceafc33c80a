//! Filesystem store. Implements EntrySourcePort, ReportSinkPort and PolicyPort.
//!
//! Entries: `{data_dir}/residents/{resident}.jsonl`, one JSON object per line.
//! Outputs: `{reports_dir}/report_{resident}_{start}_{end}.md` and `segments_{name}.json`,
//! written with the temp-file + rename pattern so a crash never leaves half a document.

use crate::domain::{DomainError, Entry, ReportPeriod, SegmentResult};
use crate::ports::{EntrySourcePort, PolicyPort, ReportSinkPort};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Distinguishes temp files of concurrent writes within one process.
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// File-system adapter. One JSONL file per resident.
pub struct FsStore {
    data_dir: PathBuf,
    reports_dir: PathBuf,
    rules_path: Option<PathBuf>,
}

impl FsStore {
    pub fn new(
        data_dir: impl AsRef<Path>,
        reports_dir: impl AsRef<Path>,
        rules_path: Option<PathBuf>,
    ) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            reports_dir: reports_dir.as_ref().to_path_buf(),
            rules_path,
        }
    }

    fn resident_path(&self, resident_id: &str) -> PathBuf {
        self.data_dir
            .join("residents")
            .join(format!("{}.jsonl", file_stem(resident_id)))
    }

    /// Write-replace: temp file, sync_all, then rename over the target.
    ///
    /// Each call gets its own temp file, so concurrent writes of the same document never
    /// share one; the last rename wins.
    async fn write_atomic(&self, file_name: &str, contents: &[u8]) -> Result<PathBuf, DomainError> {
        fs::create_dir_all(&self.reports_dir)
            .await
            .map_err(|e| DomainError::Repo(format!("create reports dir: {}", e)))?;
        let path = self.reports_dir.join(file_name);
        let temp_path = self.reports_dir.join(format!(
            ".{}.{}.{}.tmp",
            file_name,
            std::process::id(),
            TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        let written = Self::write_synced(&temp_path, contents).await;
        let renamed = match written {
            Ok(()) => fs::rename(&temp_path, &path)
                .await
                .map_err(|e| DomainError::Repo(format!("atomic rename failed: {}", e))),
            Err(e) => Err(e),
        };
        if let Err(e) = renamed {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                debug!(path = %temp_path.display(), error = %cleanup, "temp file not removed");
            }
            return Err(e);
        }
        Ok(path)
    }

    async fn write_synced(temp_path: &Path, contents: &[u8]) -> Result<(), DomainError> {
        let mut f = fs::File::create(temp_path)
            .await
            .map_err(|e| DomainError::Repo(format!("create temp file: {}", e)))?;
        f.write_all(contents)
            .await
            .map_err(|e| DomainError::Repo(format!("write temp file: {}", e)))?;
        f.sync_all()
            .await
            .map_err(|e| DomainError::Repo(format!("sync temp file: {}", e)))?;
        Ok(())
    }
}

/// Keep ids usable as file names: alphanumerics, `-` and `_`; anything else becomes `_`.
fn file_stem(raw: &str) -> String {
    let stem: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "unnamed".to_string()
    } else {
        stem
    }
}

#[async_trait::async_trait]
impl EntrySourcePort for FsStore {
    /// Reads the resident's JSONL file. A missing file is an empty history; unreadable
    /// lines are skipped with a warning. Period filtering is left to the caller.
    async fn fetch_entries(
        &self,
        resident_id: &str,
        period: &ReportPeriod,
    ) -> Result<Vec<Entry>, DomainError> {
        let path = self.resident_path(resident_id);
        let raw = match fs::read_to_string(&path).await {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(resident = resident_id, path = %path.display(), "no entry file, treating as empty");
                return Ok(vec![]);
            }
            Err(e) => return Err(DomainError::Repo(format!("read {}: {}", path.display(), e))),
        };

        let mut entries = Vec::new();
        for (n, line) in raw.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Entry>(trimmed) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(path = %path.display(), line = n + 1, error = %e, "skipping unreadable entry line"),
            }
        }
        debug!(resident = resident_id, period = %period, count = entries.len(), "entries loaded");
        Ok(entries)
    }
}

#[async_trait::async_trait]
impl ReportSinkPort for FsStore {
    async fn save_report(
        &self,
        resident_id: &str,
        period: &ReportPeriod,
        document: &str,
    ) -> Result<PathBuf, DomainError> {
        let name = format!(
            "report_{}_{}_{}.md",
            file_stem(resident_id),
            period.start.format("%Y-%m-%d"),
            period.end.format("%Y-%m-%d")
        );
        let path = self.write_atomic(&name, document.as_bytes()).await?;
        info!(path = %path.display(), bytes = document.len(), "report written");
        Ok(path)
    }

    async fn save_segments(
        &self,
        name: &str,
        result: &SegmentResult,
    ) -> Result<PathBuf, DomainError> {
        let json =
            serde_json::to_string_pretty(result).map_err(|e| DomainError::Repo(e.to_string()))?;
        let file_name = format!("segments_{}.json", file_stem(name));
        let path = self.write_atomic(&file_name, json.as_bytes()).await?;
        info!(path = %path.display(), segments = result.segments.len(), "segments written");
        Ok(path)
    }
}

#[async_trait::async_trait]
impl PolicyPort for FsStore {
    async fn operating_rules(&self) -> Result<Option<String>, DomainError> {
        let Some(path) = &self.rules_path else {
            return Ok(None);
        };
        let text = fs::read_to_string(path)
            .await
            .map_err(|e| DomainError::Repo(format!("read rules {}: {}", path.display(), e)))?;
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}
