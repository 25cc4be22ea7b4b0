use thiserror::Error;

/// A feed source as a whole could not be read.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("io error reading {path}: {message}")]
    Io { path: String, message: String },

    #[error("json parse error in {path}: {message}")]
    Json { path: String, message: String },

    #[error("feed directory {path} does not exist")]
    MissingDir { path: String },

    #[error("glob error: {message}")]
    Glob { message: String },
}

impl FeedError {
    pub fn path(&self) -> Option<&str> {
        match self {
            FeedError::Io { path, .. }
            | FeedError::Json { path, .. }
            | FeedError::MissingDir { path } => Some(path),
            FeedError::Glob { .. } => None,
        }
    }
}

/// A single job log inside the usage feed could not be used.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobLogError {
    #[error("io error: {message}")]
    Io { message: String },

    #[error("json parse error: {message}")]
    Json { message: String },
}
