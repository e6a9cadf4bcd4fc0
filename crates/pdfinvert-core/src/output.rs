//! All-or-nothing output file

use crate::error::InvertError;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A file being written at its final path.
///
/// Until [`OutputFile::commit`] succeeds the file counts as partial: dropping
/// the guard (on an error return or a panic) removes it from disk.
pub struct OutputFile {
    path: PathBuf,
    file: Option<File>,
}

impl OutputFile {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, InvertError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| InvertError::io(&path, e))?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), InvertError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| InvertError::io(&self.path, io::ErrorKind::NotConnected.into()))?;
        file.write_all(bytes).map_err(|e| InvertError::io(&self.path, e))
    }

    /// Flush to stable storage and keep the file.
    pub fn commit(mut self) -> Result<PathBuf, InvertError> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .and_then(|_| file.sync_all())
                .map_err(|e| InvertError::io(&self.path, e))?;
        }
        Ok(std::mem::take(&mut self.path))
    }
}

impl Drop for OutputFile {
    fn drop(&mut self) {
        // `file` is only still present when commit() never finished.
        if let Some(file) = self.file.take() {
            drop(file);
            remove_output(&self.path);
        }
    }
}

/// Delete whatever is at `path` so a failed run leaves no output behind.
/// A missing file is not an error.
pub(crate) fn remove_output(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed output {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Could not remove output {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");

        let mut output = OutputFile::create(&path).unwrap();
        output.write_all(b"%PDF-1.7\n").unwrap();
        let kept = output.commit().unwrap();

        assert_eq!(kept, path);
        assert_eq!(fs::read(&path).unwrap(), b"%PDF-1.7\n");
    }

    #[test]
    fn test_drop_without_commit_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.pdf");

        let result: Result<(), InvertError> = (|| {
            let mut output = OutputFile::create(&path)?;
            output.write_all(b"%PDF-1.7\n1 0 obj")?;
            assert!(path.exists());
            Err(InvertError::Serialization("forced failure".into()))
        })();

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_output_ignores_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.pdf");
        fs::write(&path, b"stale").unwrap();

        remove_output(&path);
        assert!(!path.exists());
        remove_output(&path);
    }

    #[test]
    fn test_create_in_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.pdf");

        let err = OutputFile::create(&path).err().unwrap();
        assert!(matches!(err, InvertError::Io { .. }));
        assert!(!path.exists());
    }
}
