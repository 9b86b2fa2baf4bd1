use core::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::{error, io};

use thiserror::Error;

use crate::ocfl::digest::DigestAlgorithm;
use crate::ocfl::types::VersionNum;

pub type Result<T, E = OcflError> = core::result::Result<T, E>;

/// Application errors
#[derive(Error)]
pub enum OcflError {
    #[error("Object {object_id} is corrupt: {message}")]
    CorruptObject { object_id: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("{path} failed {algorithm} fixity check. Expected: {expected}; Actual: {actual}")]
    DigestMismatch {
        algorithm: DigestAlgorithm,
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    General(String),

    #[error("{0}")]
    Io(io::Error),

    #[error("{0}")]
    Wrapped(Box<dyn error::Error + Send + Sync>),
}

/// Constructs an `OcflError::NotFound` error
pub fn not_found(object_id: &str, version_num: Option<VersionNum>) -> OcflError {
    match version_num {
        Some(version) => OcflError::NotFound(format!("Object {} version {}", object_id, version)),
        None => OcflError::NotFound(format!("Object {}", object_id)),
    }
}

impl OcflError {
    /// True if the error is the not-exist class, as opposed to any other I/O failure
    pub fn is_not_found(&self) -> bool {
        match self {
            OcflError::NotFound(_) => true,
            OcflError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl Debug for OcflError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl From<io::Error> for OcflError {
    fn from(e: io::Error) -> Self {
        OcflError::Io(e)
    }
}

impl From<serde_json::Error> for OcflError {
    fn from(e: serde_json::Error) -> Self {
        OcflError::Wrapped(Box::new(e))
    }
}
