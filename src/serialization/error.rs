//! Errors raised while reading or writing graph files

use crate::nodes::data_type::ParseTypeError;
use std::string::FromUtf8Error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerializationError {
    /// Unrecognized magic string or unsupported format version
    #[error("not a supported node graph: {0}")]
    FormatMismatch(String),

    #[error("unexpected end of data while reading {0}")]
    UnexpectedEof(&'static str),

    #[error("invalid UTF-8 in string: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),

    #[error("graph references unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("connection references unknown node '{0}'")]
    UnknownNode(String),

    #[error("invalid type name: {0}")]
    InvalidType(#[from] ParseTypeError),

    #[error("invalid blob encoding: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("property value encoding failed: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SerializationError>;
