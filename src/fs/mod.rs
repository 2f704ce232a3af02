//! Filesystem helpers shared by the vars file, key, and SSH config writers.
//!
//! All access goes through `cap-std` directory handles opened on the parent
//! of the target path, so each helper touches exactly one directory entry.

use std::io::{self, Write};
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::{Dir, OpenOptions};
use thiserror::Error;

mod home;

pub use home::{HomeDir, HomeDirError};

/// Errors raised by the filesystem helpers.
#[derive(Debug, Error)]
pub enum FsError {
    /// Raised when a path cannot be accessed, created, or written.
    #[error("failed to access {path}: {source}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Operating system error.
        #[source]
        source: io::Error,
    },
    /// Raised when a path has no final component to operate on.
    #[error("{path} does not name a file")]
    NotAFile {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// Raised when a resolved path is not valid UTF-8.
    #[error("path is not valid UTF-8: {path}")]
    NonUtf8 {
        /// Lossy rendering of the path.
        path: String,
    },
}

impl FsError {
    fn io(path: &Utf8Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Resolves `path` against the current working directory without touching
/// the filesystem.
///
/// # Errors
///
/// Returns [`FsError`] when the working directory is unavailable or the
/// result is not UTF-8.
pub fn resolve_absolute(path: &Utf8Path) -> Result<Utf8PathBuf, FsError> {
    let absolute = std::path::absolute(path).map_err(|source| FsError::io(path, source))?;
    Utf8PathBuf::from_path_buf(absolute).map_err(|raw| FsError::NonUtf8 {
        path: raw.display().to_string(),
    })
}

/// Converts a standard path into a UTF-8 path.
///
/// # Errors
///
/// Returns [`FsError::NonUtf8`] when the path contains invalid UTF-8.
pub fn utf8_path(path: &Path) -> Result<Utf8PathBuf, FsError> {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).map_err(|raw| FsError::NonUtf8 {
        path: raw.display().to_string(),
    })
}

/// Reports whether `path` exists. A missing parent directory counts as the
/// file being absent.
///
/// # Errors
///
/// Returns [`FsError::Io`] for failures other than the path not existing.
pub fn file_exists(path: &Utf8Path) -> Result<bool, FsError> {
    let (parent, name) = split(path)?;
    match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir.try_exists(name).map_err(|err| FsError::io(path, err)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(FsError::io(parent, err)),
    }
}

/// Reads an entire file into a string.
///
/// # Errors
///
/// Returns [`FsError::Io`] when the file cannot be opened or read.
pub fn read_file(path: &Utf8Path) -> Result<String, FsError> {
    let (parent, name) = split(path)?;
    let dir = open_dir(parent)?;
    dir.read_to_string(name).map_err(|err| FsError::io(path, err))
}

/// Writes `contents` to `path` only if nothing exists there yet.
///
/// Creation uses `O_CREAT | O_EXCL`, so concurrent callers cannot both win.
/// Returns `true` when this call created the file. Parent directories are
/// created as needed.
///
/// # Errors
///
/// Returns [`FsError::Io`] when the directory cannot be prepared or the
/// write fails. A crash between create and write can leave a partial file.
pub fn ensure_file(path: &Utf8Path, contents: &str) -> Result<bool, FsError> {
    let (parent, name) = split(path)?;
    let dir = create_dir(parent)?;
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    let mut file = match dir.open_with(name, &options) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(err) => return Err(FsError::io(path, err)),
    };

    file.write_all(contents.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|err| FsError::io(path, err))?;
    Ok(true)
}

/// Writes `contents` to `path`, replacing any existing file.
///
/// # Errors
///
/// Returns [`FsError::Io`] when the directory cannot be prepared or the
/// write fails.
pub fn overwrite_file(path: &Utf8Path, contents: &str) -> Result<(), FsError> {
    let (parent, name) = split(path)?;
    let dir = create_dir(parent)?;
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    let mut file = dir
        .open_with(name, &options)
        .map_err(|err| FsError::io(path, err))?;

    file.write_all(contents.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|err| FsError::io(path, err))
}

/// Creates `path` and any missing ancestors.
///
/// # Errors
///
/// Returns [`FsError::Io`] when a directory cannot be created.
pub fn ensure_dir(path: &Utf8Path) -> Result<(), FsError> {
    create_dir(path).map(drop)
}

fn split(path: &Utf8Path) -> Result<(&Utf8Path, &str), FsError> {
    let name = path.file_name().ok_or_else(|| FsError::NotAFile {
        path: path.to_path_buf(),
    })?;
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    Ok((parent, name))
}

fn open_dir(path: &Utf8Path) -> Result<Dir, FsError> {
    Dir::open_ambient_dir(path, ambient_authority()).map_err(|err| FsError::io(path, err))
}

fn create_dir(path: &Utf8Path) -> Result<Dir, FsError> {
    Dir::create_ambient_dir_all(path, ambient_authority()).map_err(|err| FsError::io(path, err))?;
    open_dir(path)
}
