use std::io;

use thiserror::Error;

/// Failures while reading a visit dataset. All of them are fatal: no
/// partially loaded dataset is ever returned.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read dataset: {0}")]
    Io(#[from] io::Error),

    #[error("malformed dataset: {0}")]
    Csv(#[from] csv::Error),

    #[error("dataset is missing required column `{0}`")]
    MissingColumn(&'static str),

    #[error("dataset has no header row")]
    NotTabular,
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("unknown client ID or incorrect access code")]
    UnknownClient,

    #[error("unknown client ID or incorrect access code")]
    BadAccessCode,

    #[error("malformed login query: {0}")]
    MalformedQuery(String),
}

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("failed to append activity line: {0}")]
    Write(#[from] io::Error),
}
