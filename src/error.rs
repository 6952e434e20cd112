use std::time::Duration;

use thiserror::Error;

use crate::validate::RowError;

/// Convenience result type for staging operations.
pub type StagingResult<T> = Result<T, StagingError>;

/// Broad category of a [`StagingError`], used to decide how it is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input from the caller. Reported immediately, never retried.
    Client,
    /// The upload does not satisfy the destination schema. The caller must fix the file.
    Validation,
    /// The conversion tool or the storage sink failed.
    Collaborator,
    /// Something that should not happen; detail is logged, not shown.
    Internal,
}

/// Error type returned by staging functions.
///
/// A single enum shared by conversion, validation, session staging and commit.
#[derive(Debug, Error)]
pub enum StagingError {
    /// Underlying I/O error (scratch files, filesystem sink).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Workbook could not be parsed.
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// Delimited text could not be read or written.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// The upload's file name does not carry a recognized spreadsheet extension.
    #[error("only .xlsx, .xlsm, .xlsb, .xls and .ods files are supported (got '{file_name}')")]
    UnsupportedExtension { file_name: String },

    /// A required request input was not provided.
    #[error("missing {what}")]
    MissingInput { what: &'static str },

    /// The destination is not one of the known sites.
    #[error("invalid destination site '{site}'")]
    UnknownSite { site: String },

    /// The token was never issued, was already committed, or has expired.
    #[error("upload session expired or token invalid ('{token}')")]
    UnknownToken { token: String },

    /// Another commit for the same token is still running.
    #[error("a commit for upload '{token}' is already in progress")]
    CommitInProgress { token: String },

    /// The session store refuses new uploads until some are committed or expire.
    #[error("too many staged uploads (limit {limit})")]
    SessionsFull { limit: usize },

    /// A data row failed schema validation. `row` is 1-based and counts the header row.
    #[error("row {row}: {source}")]
    Validation {
        row: usize,
        #[source]
        source: RowError,
    },

    /// The external conversion tool failed.
    #[error("conversion failed: {message}")]
    Conversion { message: String },

    /// The external conversion tool did not finish in time.
    #[error("conversion did not finish within {0:?}")]
    ConversionTimeout(Duration),

    /// The storage sink rejected the write.
    #[error("failed to store '{key}': {message}")]
    Storage { key: String, message: String },

    /// The storage sink did not confirm the write in time.
    #[error("storing '{key}' did not finish within {after:?}")]
    StorageTimeout { key: String, after: Duration },

    /// The configuration file is unreadable or inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Invariant violation.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl StagingError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Category used for status codes and logging.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::UnsupportedExtension { .. }
            | Self::MissingInput { .. }
            | Self::UnknownSite { .. }
            | Self::UnknownToken { .. }
            | Self::CommitInProgress { .. }
            | Self::SessionsFull { .. } => ErrorClass::Client,
            Self::Validation { .. } => ErrorClass::Validation,
            // A workbook that calamine or the csv reader cannot parse is a bad upload, but it
            // is detected by a collaborator and terminal for that upload either way.
            Self::Io(_)
            | Self::Excel(_)
            | Self::Csv(_)
            | Self::Conversion { .. }
            | Self::ConversionTimeout(_)
            | Self::Storage { .. }
            | Self::StorageTimeout { .. } => ErrorClass::Collaborator,
            Self::Config(_) | Self::Internal { .. } => ErrorClass::Internal,
        }
    }

    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConversionTimeout(_)
                | Self::Storage { .. }
                | Self::StorageTimeout { .. }
                | Self::CommitInProgress { .. }
        )
    }

    /// Message safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            Self::Config(_) | Self::Internal { .. } => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}
