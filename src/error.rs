//! Error types for typeflow

use thiserror::Error;

/// Infrastructure failures. Domain mistakes (unknown lesson ids, stray keys)
/// never reach this type; they are dropped where they occur.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Preference key not recognised
    #[error("unknown preference: {0}")]
    UnknownPreference(String),

    /// Preference value could not be parsed for its key
    #[error("invalid value {value:?} for preference {key}")]
    InvalidPreference { key: String, value: String },

    /// Embedded lesson content is missing or malformed
    #[error("content error: {0}")]
    Content(String),
}

pub type Result<T> = std::result::Result<T, Error>;
