use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InvertError {
    #[error("Invalid input: {0}")]
    InputValidation(String),

    #[error("Failed to parse PDF: {0}")]
    DocumentParse(String),

    #[error("Failed to process page {page}: {reason}")]
    PageProcessing { page: u32, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Failed to write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl InvertError {
    pub(crate) fn page(page: u32, reason: impl Into<String>) -> Self {
        InvertError::PageProcessing {
            page,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InvertError::Io {
            path: path.into(),
            source,
        }
    }
}
