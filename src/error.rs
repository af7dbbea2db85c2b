use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum MirrorError {
    #[error("missing API key: set IPDC_API_KEY or api_key in the config file")]
    MissingApiKey,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid schedule expression: {0}")]
    InvalidSchedule(String),

    #[error("feed request failed: {0}")]
    FeedHttp(String),

    #[error("feed request to {url} timed out")]
    FeedTimeout { url: String },

    #[error("feed returned status {status} for {url}: {body}")]
    FeedStatus {
        status: u16,
        url: String,
        body: String,
    },

    #[error("malformed feed page from {url}: {message}")]
    MalformedPage { url: String, message: String },

    #[error("relation target is not an absolute URL: {0}")]
    InvalidRelation(String),

    #[error("failed to load JSON-LD context {url}: {message}")]
    ContextLoad { url: String, message: String },

    #[error("JSON-LD conversion failed: {0}")]
    Conversion(String),

    #[error("an import is already running")]
    ImportInProgress,

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Fetch,
    Conversion,
    Conflict,
    Config,
    Storage,
}

impl MirrorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MirrorError::FeedHttp(_)
            | MirrorError::FeedTimeout { .. }
            | MirrorError::FeedStatus { .. } => ErrorKind::Fetch,
            MirrorError::MalformedPage { .. }
            | MirrorError::InvalidRelation(_)
            | MirrorError::ContextLoad { .. }
            | MirrorError::Conversion(_) => ErrorKind::Conversion,
            MirrorError::ImportInProgress => ErrorKind::Conflict,
            MirrorError::MissingApiKey
            | MirrorError::ConfigRead(_)
            | MirrorError::ConfigParse(_)
            | MirrorError::InvalidConfig(_)
            | MirrorError::InvalidSchedule(_) => ErrorKind::Config,
            MirrorError::Filesystem(_) => ErrorKind::Storage,
        }
    }
}
