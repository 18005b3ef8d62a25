use std::io;

use thiserror::Error;

pub type DitResult<T> = std::result::Result<T, DitError>;

#[derive(Error, Debug)]
pub enum DitError {
    #[error("The security identifier is malformed: {0}")]
    MalformedSid(&'static str),

    #[error("The encrypted blob is truncated: {found} bytes, at least {expected} expected")]
    TruncatedBlob { expected: usize, found: usize },

    #[error("The blob references the PEK at index {index} but only {len} PEK(s) are available")]
    PekIndexOutOfRange { index: usize, len: usize },

    #[error("The encrypted blob carries {0} bytes of ciphertext, which is not a supported length")]
    UnsupportedBlobLength(usize),

    #[error("Unable to derive the password encryption keys: {0}")]
    PekDerivationFailed(String),

    #[error("The database does not contain any PEK list")]
    NoPekList,

    #[error("The boot key should be 16 bytes long, but {0} bytes were provided")]
    InvalidBootKey(usize),

    #[error("Unrecognized column storage type {0}")]
    UnrecognizedColumnType(u32),

    #[error("A {expected}-byte column value was expected, but {found} bytes were found")]
    InvalidColumnWidth { expected: usize, found: usize },

    #[error("A text column value of {0} bytes is not UTF-16")]
    InvalidText(usize),

    #[error("The column {column} holds a {found} value, but a {expected} value was expected")]
    ColumnTypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("The record has no {0} attribute")]
    MissingColumn(&'static str),

    #[error("Unable to decrypt the {attribute} attribute: {source}")]
    Attribute {
        attribute: &'static str,
        #[source]
        source: Box<DitError>,
    },

    #[error("The record source failed: {0}")]
    Source(String),

    #[error(
        "Unable to access the file at the given path. Make sure the right permissions are available"
    )]
    Io(#[from] io::Error),
}

impl DitError {
    /// Returns true if the error prevents any further record from being processed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PekDerivationFailed(_) | Self::NoPekList | Self::InvalidBootKey(_)
        )
    }
}
