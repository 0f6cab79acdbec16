use std::fs;
use std::io::Write;

use camino::Utf8Path;

use crate::error::DepotError;

/// Writes `content` to `path` through a temporary file in the same directory
/// followed by a rename, so readers never observe a partially written file.
/// The parent directory must already exist.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), DepotError> {
    let parent = path
        .parent()
        .ok_or_else(|| DepotError::Filesystem(format!("invalid destination path: {path}")))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".depot-mirror")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| DepotError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| DepotError::Filesystem(err.to_string()))?;
    if path.as_std_path().exists() {
        fs::remove_file(path.as_std_path())
            .map_err(|err| DepotError::Filesystem(err.to_string()))?;
    }
    temp.persist(path.as_std_path())
        .map_err(|err| DepotError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Fails with `MissingParent` when the parent directory of `path` is absent.
pub fn require_parent(path: &Utf8Path) -> Result<(), DepotError> {
    let parent = path
        .parent()
        .ok_or_else(|| DepotError::Filesystem(format!("invalid destination path: {path}")))?;
    if !parent.as_std_path().is_dir() {
        return Err(DepotError::MissingParent(
            parent.as_std_path().to_path_buf(),
        ));
    }
    Ok(())
}

/// Creates the parent directory of `path` and all ancestors. Idempotent.
pub fn ensure_parent(path: &Utf8Path) -> Result<(), DepotError> {
    let parent = path
        .parent()
        .ok_or_else(|| DepotError::Filesystem(format!("invalid destination path: {path}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| DepotError::Filesystem(err.to_string()))
}
