//! Bootstrap assets selected by operating-system tag.
//!
//! Each OS tag owns a directory under the assets root holding the
//! configuration-management installer and the machine manifest. The manifest
//! is staged in a scratch directory before transfer and the staged copy is
//! removed when its guard is dropped.

use std::{fmt, io};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// File name of the installer inside an OS asset directory.
pub const INSTALLER_FILE: &str = "install-puppet.sh";
/// File name of the manifest inside an OS asset directory.
pub const MANIFEST_FILE: &str = "puppetfile.pp";
/// Remote path, relative to the login home, the installer is sent to.
pub const REMOTE_INSTALLER_PATH: &str = "install-puppet.sh";
/// Remote path, relative to the login home, the manifest is sent to.
pub const REMOTE_MANIFEST_PATH: &str = "puppetfile.pp";

/// Errors raised while resolving or staging bootstrap assets.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AssetError {
    /// Raised when an expected asset file does not exist.
    #[error("bootstrap asset not found: {path}")]
    Missing {
        /// Path that was expected to exist.
        path: Utf8PathBuf,
    },
    /// Raised when reading or writing an asset fails.
    #[error("bootstrap asset I/O failed for {path}: {message}")]
    Io {
        /// Path being accessed.
        path: Utf8PathBuf,
        /// Underlying error message.
        message: String,
    },
}

fn split(path: &Utf8Path) -> Result<(&Utf8Path, &str), AssetError> {
    let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| AssetError::Io {
        path: path.to_path_buf(),
        message: String::from("path is missing a file name"),
    })?;
    Ok((parent, file_name))
}

fn open_dir(path: &Utf8Path) -> Result<Dir, AssetError> {
    Dir::open_ambient_dir(path, ambient_authority()).map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            AssetError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            AssetError::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        }
    })
}

fn require_file(path: &Utf8Path) -> Result<(), AssetError> {
    let (parent, file_name) = split(path)?;
    let dir = open_dir(parent)?;
    match dir.metadata(file_name) {
        Ok(metadata) if metadata.is_file() => Ok(()),
        Ok(_) => Err(AssetError::Io {
            path: path.to_path_buf(),
            message: String::from("not a regular file"),
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(AssetError::Missing {
            path: path.to_path_buf(),
        }),
        Err(err) => Err(AssetError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }),
    }
}

/// Installer and manifest for one OS tag.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootstrapAssets {
    installer: Utf8PathBuf,
    manifest: Utf8PathBuf,
}

impl BootstrapAssets {
    /// Resolves the assets inside `os_dir` and checks both files exist.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::Missing`] when the directory or either file is
    /// absent.
    pub fn locate(os_dir: &Utf8Path) -> Result<Self, AssetError> {
        let assets = Self {
            installer: os_dir.join(INSTALLER_FILE),
            manifest: os_dir.join(MANIFEST_FILE),
        };
        require_file(&assets.installer)?;
        require_file(&assets.manifest)?;
        Ok(assets)
    }

    /// Local path of the installer script.
    #[must_use]
    pub fn installer(&self) -> &Utf8Path {
        &self.installer
    }

    /// Local path of the manifest.
    #[must_use]
    pub fn manifest(&self) -> &Utf8Path {
        &self.manifest
    }

    /// Copies the manifest into `scratch_dir` under a unique name.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError`] when the manifest cannot be read or the scratch
    /// copy cannot be written.
    pub fn stage_manifest(&self, scratch_dir: &Utf8Path) -> Result<StagedFile, AssetError> {
        let (source_dir, source_name) = split(&self.manifest)?;
        let contents = open_dir(source_dir)?
            .read_to_string(source_name)
            .map_err(|err| AssetError::Io {
                path: self.manifest.clone(),
                message: err.to_string(),
            })?;

        let file_name = format!("bosun-{}-{MANIFEST_FILE}", Uuid::new_v4());
        let path = scratch_dir.join(&file_name);
        let dir = open_dir(scratch_dir)?;
        dir.write(&file_name, contents).map_err(|err| AssetError::Io {
            path: path.clone(),
            message: err.to_string(),
        })?;
        debug!(path = %path, "staged manifest");
        Ok(StagedFile { dir, file_name, path })
    }
}

/// A scratch file removed when the guard is dropped.
pub struct StagedFile {
    dir: Dir,
    file_name: String,
    path: Utf8PathBuf,
}

impl StagedFile {
    /// Full path of the staged file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl fmt::Debug for StagedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedFile").field("path", &self.path).finish()
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        match self.dir.remove_file(&self.file_name) {
            Ok(()) => debug!(path = %self.path, "removed staged manifest"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.path, error = %err, "failed to remove staged manifest"),
        }
    }
}
