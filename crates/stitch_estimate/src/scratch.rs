use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::{
    error::{Result, StageContext},
    types::Stage,
    visualize::Previews,
};

/// Per-request scratch storage: a uniquely named temporary directory that is
/// removed when the value is dropped, whichever way the request ends.
/// Requests never share one, so a finishing request cannot delete another's
/// files.
#[derive(Debug)]
pub struct ScratchArea {
    dir: TempDir,
}

impl ScratchArea {
    const PREFIX: &'static str = "stitch-";

    /// Allocate under the system temp directory.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix(Self::PREFIX).tempdir()?;
        debug!("Scratch area at {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Allocate under `parent`, which must exist.
    pub fn new_in<P: AsRef<Path>>(parent: P) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(Self::PREFIX)
            .tempdir_in(parent)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_previews(&self, previews: &Previews) -> Result<Vec<PathBuf>> {
        previews.save(self.path())
    }

    /// Copy every file in the scratch area into `target` (created if needed)
    /// as `{prefix}-{name}` and return the copied paths. The prefix keeps
    /// images sharing one target apart. The scratch area itself is still
    /// removed on drop.
    pub fn persist_into<P: AsRef<Path>>(&self, target: P, prefix: &str) -> Result<Vec<PathBuf>> {
        let target = target.as_ref();
        std::fs::create_dir_all(target).in_stage(Stage::Preview)?;

        let mut copied = Vec::new();
        for entry in std::fs::read_dir(self.path()).in_stage(Stage::Preview)? {
            let entry = entry.in_stage(Stage::Preview)?;
            if !entry.file_type().in_stage(Stage::Preview)?.is_file() {
                continue;
            }
            let mut name = std::ffi::OsString::from(format!("{prefix}-"));
            name.push(entry.file_name());
            let destination = target.join(name);
            std::fs::copy(entry.path(), &destination).in_stage(Stage::Preview)?;
            copied.push(destination);
        }
        copied.sort();
        debug!("Persisted {} files into {}", copied.len(), target.display());
        Ok(copied)
    }

    /// Remove the directory now, surfacing any IO error instead of ignoring it on drop.
    pub fn close(self) -> Result<()> {
        self.dir.close()?;
        Ok(())
    }
}
