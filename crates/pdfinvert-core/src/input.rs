//! Input file access

use crate::error::InvertError;
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix appended to the file stem when no output path is given
pub const INVERTED_SUFFIX: &str = "_inverted";

/// A validated input file and its full contents
#[derive(Debug, Clone)]
pub struct InputFile {
    path: PathBuf,
    content: Vec<u8>,
}

impl InputFile {
    /// Check that `path` names an existing regular file, resolve it to an
    /// absolute path and read it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, InvertError> {
        let path = validate_path(path.as_ref())?;
        let content = fs::read(&path).map_err(|e| {
            InvertError::InputValidation(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(Self { path, content })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn default_inverted_path(&self) -> PathBuf {
        default_inverted_path(&self.path)
    }
}

fn validate_path(path: &Path) -> Result<PathBuf, InvertError> {
    if !path.exists() {
        return Err(InvertError::InputValidation(format!(
            "File {} does not exist",
            path.display()
        )));
    }
    if !path.is_file() {
        return Err(InvertError::InputValidation(format!(
            "{} is not a file",
            path.display()
        )));
    }
    path.canonicalize().map_err(|e| {
        InvertError::InputValidation(format!("cannot resolve {}: {}", path.display(), e))
    })
}

/// `<dir>/<stem>_inverted<.ext>` for `<dir>/<stem><.ext>`; the extension is
/// kept when present.
pub fn default_inverted_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = format!("{}{}", stem, INVERTED_SUFFIX);
    if let Some(ext) = path.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    path.with_file_name(name)
}
