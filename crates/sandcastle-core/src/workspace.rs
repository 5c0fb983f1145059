//! Per-request staging directories
//!
//! A [`Workspace`] owns a freshly created directory holding exactly one
//! artifact file. Dropping it deletes the directory, so every exit path of a
//! request releases its storage.

use crate::language::{LanguageProfile, MOUNT_DIR};
use crate::runtime::Bind;
use crate::Result;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PREFIX: &str = "sandcastle-";

#[derive(Debug)]
pub struct Workspace {
    /// `None` once the directory has been detached from cleanup
    dir: Option<TempDir>,
    path: PathBuf,
    artifact: PathBuf,
    container_path: String,
}

impl Workspace {
    /// Create a new workspace under `root` (system temp dir when `None`) and
    /// write `code` verbatim into the profile's artifact file.
    ///
    /// The file is synced to disk before this returns; the sandbox must never
    /// see a partially written artifact.
    pub fn provision(root: Option<&Path>, code: &str, profile: &LanguageProfile) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        let artifact = dir.path().join(profile.artifact_file_name);
        let mut file = File::create(&artifact)?;
        file.write_all(code.as_bytes())?;
        file.sync_all()?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            // the container user is not the host user
            std::fs::set_permissions(&artifact, std::fs::Permissions::from_mode(0o644))?;
        }

        tracing::debug!(
            workspace = %dir.path().display(),
            artifact = profile.artifact_file_name,
            bytes = code.len(),
            "workspace provisioned"
        );

        Ok(Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
            artifact,
            container_path: format!("{MOUNT_DIR}/{}", profile.artifact_file_name),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn artifact_path(&self) -> &Path {
        &self.artifact
    }

    /// Read-only bind of the artifact at its in-container location
    #[must_use]
    pub fn mount(&self) -> Bind {
        Bind {
            host: self.artifact.clone(),
            container: self.container_path.clone(),
            read_only: true,
        }
    }

    /// Leave the directory on disk when this handle is dropped.
    pub fn retain(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.keep();
            tracing::info!(workspace = %path.display(), "workspace retained");
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                tracing::warn!(workspace = %self.path.display(), error = %e, "failed to delete workspace");
            }
        }
    }
}
