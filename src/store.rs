use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::NamedTempFile;

use crate::error::GribError;

const SCRATCH_PREFIX: &str = ".gribdl-";

// Directory creation is idempotent, so units may race on it.
#[derive(Debug, Clone)]
pub struct Store {
    output_root: Utf8PathBuf,
    staging_root: Utf8PathBuf,
}

impl Store {
    pub fn new_with_paths(output_root: Utf8PathBuf, staging_root: Utf8PathBuf) -> Self {
        Self {
            output_root,
            staging_root,
        }
    }

    pub fn output_root(&self) -> &Utf8Path {
        &self.output_root
    }

    pub fn staging_root(&self) -> &Utf8Path {
        &self.staging_root
    }

    pub fn output_path(&self, file_name: &str) -> Utf8PathBuf {
        self.output_root.join(file_name)
    }

    pub fn staging_path(&self, file_name: &str) -> Utf8PathBuf {
        self.staging_root.join(file_name)
    }

    pub fn ensure_output_root(&self) -> Result<(), GribError> {
        fs::create_dir_all(self.output_root.as_std_path())
            .map_err(|err| GribError::Filesystem(format!("create {}: {err}", self.output_root)))
    }

    pub fn ensure_staging_root(&self) -> Result<(), GribError> {
        fs::create_dir_all(self.staging_root.as_std_path())
            .map_err(|err| GribError::Filesystem(format!("create {}: {err}", self.staging_root)))
    }

    pub fn staging_scratch(&self) -> Result<NamedTempFile, GribError> {
        scratch_in(&self.staging_root)
    }

    pub fn output_scratch(&self) -> Result<NamedTempFile, GribError> {
        scratch_in(&self.output_root)
    }

    pub fn persist(scratch: NamedTempFile, dest: &Utf8Path) -> Result<(), GribError> {
        if dest.as_std_path().exists() {
            fs::remove_file(dest.as_std_path())
                .map_err(|err| GribError::Filesystem(format!("remove {dest}: {err}")))?;
        }
        scratch
            .persist(dest.as_std_path())
            .map_err(|err| GribError::Filesystem(format!("persist {dest}: {err}")))?;
        Ok(())
    }

    // Staging and output may live on different mounts.
    pub fn move_into_output(&self, source: &Utf8Path) -> Result<Utf8PathBuf, GribError> {
        let file_name = source
            .file_name()
            .ok_or_else(|| GribError::Filesystem(format!("no file name in {source}")))?;
        let dest = self.output_path(file_name);
        self.ensure_output_root()?;
        Self::copy_file_atomic(source, &dest)?;
        fs::remove_file(source.as_std_path())
            .map_err(|err| GribError::Filesystem(format!("remove {source}: {err}")))?;
        Ok(dest)
    }

    pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), GribError> {
        let parent = dest
            .parent()
            .ok_or_else(|| GribError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| GribError::Filesystem(err.to_string()))?;
        let temp = scratch_in(parent)?;
        fs::copy(source.as_std_path(), temp.path())
            .map_err(|err| GribError::Filesystem(format!("copy {source}: {err}")))?;
        Self::persist(temp, dest)
    }
}

fn scratch_in(dir: &Utf8Path) -> Result<NamedTempFile, GribError> {
    tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempfile_in(dir.as_std_path())
        .map_err(|err| GribError::Filesystem(format!("scratch file in {dir}: {err}")))
}

pub fn archive_basename(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}
