use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CheckpointError;
use crate::node::AccountNode;
use crate::persist::{write_atomic, write_new, TMP_SUFFIX};

use super::document::{encode, Checkpoint};

const FILE_PREFIX: &str = "step_";
const FILE_EXTENSION: &str = ".json";

/// Directory of `step_<N>.json` checkpoint files.
///
/// Files are immutable once written: saving a step that already exists is a
/// [`CheckpointError::Conflict`] unless overwrite was explicitly enabled, in
/// which case every replacement is logged.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    overwrite: bool,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            overwrite: false,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn overwrites(&self) -> bool {
        self.overwrite
    }

    pub fn path_for(&self, step: u32) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{step}{FILE_EXTENSION}"))
    }

    /// Atomically write the checkpoint for `step`.
    pub fn save(
        &self,
        root: &AccountNode,
        frontier: &[String],
        step: u32,
        unexpanded: &[String],
    ) -> Result<PathBuf, CheckpointError> {
        let path = self.path_for(step);
        let bytes = encode(root, frontier, step, unexpanded)?;

        if self.overwrite {
            if path.exists() {
                tracing::warn!(step, path = %path.display(), "overwriting existing checkpoint");
            }
            write_atomic(&path, &bytes)?;
        } else {
            match write_new(&path, &bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    return Err(CheckpointError::Conflict { step, path });
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!(
            step,
            path = %path.display(),
            bytes = bytes.len(),
            "checkpoint written"
        );
        Ok(path)
    }

    pub fn load(&self, step: u32) -> Result<Checkpoint, CheckpointError> {
        let path = self.path_for(step);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound {
                    dir: self.dir.clone(),
                    step: Some(step),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let checkpoint = Checkpoint::from_json(&bytes)?;
        if checkpoint.step != step {
            return Err(CheckpointError::Malformed(format!(
                "{} records step {}",
                path.display(),
                checkpoint.step
            )));
        }
        Ok(checkpoint)
    }

    /// Load the checkpoint with the highest step index.
    pub fn load_latest(&self) -> Result<Checkpoint, CheckpointError> {
        let latest = self
            .list_steps()?
            .last()
            .copied()
            .ok_or_else(|| CheckpointError::NotFound {
                dir: self.dir.clone(),
                step: None,
            })?;
        self.load(latest)
    }

    /// Step indices with a checkpoint on disk, ascending. Temp files left by
    /// an interrupted write and unrelated files are ignored.
    pub fn list_steps(&self) -> Result<Vec<u32>, CheckpointError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut steps = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(step) = entry.file_name().to_str().and_then(parse_step_file_name) {
                steps.push(step);
            }
        }
        steps.sort_unstable();
        Ok(steps)
    }
}

fn parse_step_file_name(name: &str) -> Option<u32> {
    if name.ends_with(TMP_SUFFIX) {
        return None;
    }
    name.strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_EXTENSION)?
        .parse()
        .ok()
}
