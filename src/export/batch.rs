use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::Result;
use crate::types::OutputMode;

/// An output fully written next to its destination, not yet in place.
struct StagedFile {
    tmp: PathBuf,
    target: PathBuf,
}

/// Collects every output of a run in sibling `.tmp` files and moves them
/// over their destinations only on [`ExportBatch::commit`]. Dropping an
/// uncommitted batch removes whatever it staged, so a failed run leaves
/// the destinations untouched.
#[derive(Default)]
pub struct ExportBatch {
    staged: Vec<StagedFile>,
}

impl ExportBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the staging file for `target`. In append mode it starts as a
    /// copy of the current destination so the commit keeps earlier rows.
    pub fn open(&mut self, target: &Path, mode: OutputMode) -> Result<File> {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = staging_path(target);
        self.staged.push(StagedFile {
            tmp: tmp.clone(),
            target: target.to_path_buf(),
        });

        let seeded = matches!(mode, OutputMode::Append) && target.is_file();
        if seeded {
            fs::copy(target, &tmp)?;
        }
        let mut opts = OpenOptions::new();
        opts.create(true);
        if seeded {
            opts.append(true);
        } else {
            opts.write(true).truncate(true);
        }
        Ok(opts.open(&tmp)?)
    }

    /// Renames every staged file over its destination.
    pub fn commit(mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        let files = staged.len();
        let mut pending = staged.into_iter();
        while let Some(file) = pending.next() {
            if let Err(e) = fs::rename(&file.tmp, &file.target) {
                // put the rest back so drop cleans them up
                self.staged.push(file);
                self.staged.extend(pending);
                return Err(e.into());
            }
        }
        info!(files, "[EXPORT] {} outputs committed", files);
        Ok(())
    }
}

impl Drop for ExportBatch {
    fn drop(&mut self) {
        for file in &self.staged {
            if file.tmp.exists() {
                if let Err(e) = fs::remove_file(&file.tmp) {
                    warn!("[EXPORT] could not remove {}: {e}", file.tmp.display());
                }
            }
        }
    }
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn nothing_lands_until_commit() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.csv");

        let mut batch = ExportBatch::new();
        writeln!(batch.open(&target, OutputMode::Truncate).unwrap(), "row").unwrap();
        assert!(!target.exists());

        batch.commit().unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "row\n");
        assert!(!staging_path(&target).exists());
    }

    #[test]
    fn dropped_batch_leaves_destination_alone() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.csv");
        fs::write(&target, "earlier\n").unwrap();

        {
            let mut batch = ExportBatch::new();
            writeln!(batch.open(&target, OutputMode::Append).unwrap(), "new").unwrap();
        }

        assert_eq!(fs::read_to_string(&target).unwrap(), "earlier\n");
        assert!(!staging_path(&target).exists());
    }

    #[test]
    fn append_keeps_existing_rows_and_truncate_drops_them() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.csv");
        fs::write(&target, "earlier\n").unwrap();

        let mut batch = ExportBatch::new();
        writeln!(batch.open(&target, OutputMode::Append).unwrap(), "new").unwrap();
        batch.commit().unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "earlier\nnew\n");

        let mut batch = ExportBatch::new();
        writeln!(batch.open(&target, OutputMode::Truncate).unwrap(), "only").unwrap();
        batch.commit().unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "only\n");
    }

    #[test]
    fn stale_staging_file_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.csv");
        fs::write(staging_path(&target), "left over\n").unwrap();

        let mut batch = ExportBatch::new();
        writeln!(batch.open(&target, OutputMode::Append).unwrap(), "new").unwrap();
        batch.commit().unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "new\n");
    }
}
