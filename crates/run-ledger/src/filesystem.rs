//! Filesystem-based ledger.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{RunLedger, RunRecord};

/// Stores each run as `run_{mapping}_{timestamp}.json` in a directory.
///
/// The mapping part of the name is a lossy slug, so lookups parse the
/// candidate files and compare the stored mapping label.
pub struct FilesystemLedger {
    dir: PathBuf,
}

impl FilesystemLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(record: &RunRecord) -> String {
        format!(
            "run_{}_{}.json",
            slug(record.mapping()),
            record.recorded_at.format("%Y%m%dT%H%M%S%.6fZ")
        )
    }

    /// Parse every record in the directory whose file name starts with `prefix`.
    fn load(&self, prefix: &str) -> Result<Vec<RunRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let filename = entry.file_name().to_string_lossy().to_string();
            if !filename.starts_with(prefix) || !filename.ends_with(".json") {
                continue;
            }
            let path = entry.path();
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<RunRecord>(&content) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping unreadable run record {}: {e}", path.display()),
            }
        }
        Ok(records)
    }
}

/// File-name-safe form of a mapping label.
fn slug(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() || c == '.' {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

#[async_trait]
impl RunLedger for FilesystemLedger {
    async fn record(&self, record: &RunRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create ledger directory {}", self.dir.display()))?;

        let path = self.dir.join(Self::file_name(record));
        std::fs::write(&path, serde_json::to_string_pretty(record)?)
            .with_context(|| format!("Failed to write run record {}", path.display()))?;

        tracing::info!("Recorded run of {} to {}", record.mapping(), path.display());
        Ok(())
    }

    async fn latest(&self, mapping: &str) -> Result<Option<RunRecord>> {
        let prefix = format!("run_{}_", slug(mapping));
        Ok(self
            .load(&prefix)?
            .into_iter()
            .filter(|record| record.mapping() == mapping)
            .max_by_key(|record| record.recorded_at))
    }

    async fn latest_per_mapping(&self) -> Result<Vec<RunRecord>> {
        let mut latest: BTreeMap<String, RunRecord> = BTreeMap::new();
        for record in self.load("run_")? {
            match latest.get(record.mapping()) {
                Some(seen) if seen.recorded_at >= record.recorded_at => {}
                _ => {
                    latest.insert(record.mapping().to_string(), record);
                }
            }
        }
        Ok(latest.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::slug;

    #[test]
    fn test_slug_collapses_separators() {
        assert_eq!(slug("src.orders -> dst.orders"), "src.orders_dst.orders");
        assert_eq!(slug("a b"), "a_b");
    }
}
