use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::persist::write_atomic;
use crate::types::TransferRecord;

// ==============================================================================
// Transfer Cache
// ==============================================================================

/// On-disk snapshots of the transfer records fetched for an address during
/// a given step.
///
/// Layout: `<dir>/step_<N>/<address>.json`, each holding the record array
/// exactly as the explorer returned it. The fetcher writes through on every
/// successful live fetch and reads back when the explorer fails.
#[derive(Debug, Clone)]
pub struct TransferCache {
    dir: PathBuf,
}

impl TransferCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn store(
        &self,
        step: u32,
        address: &str,
        records: &[TransferRecord],
    ) -> Result<(), CoreError> {
        let Some(path) = self.entry_path(step, address) else {
            tracing::debug!(address, "address is not a safe file name; not caching");
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(records).map_err(std::io::Error::other)?;
        write_atomic(&path, &bytes)?;
        Ok(())
    }

    /// `Ok(None)` when nothing is cached for `(step, address)`.
    pub fn load(&self, step: u32, address: &str) -> Result<Option<Vec<TransferRecord>>, CoreError> {
        let Some(path) = self.entry_path(step, address) else {
            return Ok(None);
        };
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let records = serde_json::from_slice(&content).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("corrupt transfer cache {}: {e}", path.display()),
            )
        })?;
        Ok(Some(records))
    }

    fn entry_path(&self, step: u32, address: &str) -> Option<PathBuf> {
        is_safe_file_stem(address).then(|| {
            self.dir
                .join(format!("step_{step}"))
                .join(format!("{address}.json"))
        })
    }
}

/// Only plain identifier characters may reach the filesystem as a file
/// name; separators never do.
fn is_safe_file_stem(address: &str) -> bool {
    !address.is_empty()
        && address.len() <= 128
        && address
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
