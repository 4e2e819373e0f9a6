use std::fmt;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ObserverError>;

/// Error type covering the failure cases that can occur while the service
/// accepts, stores, or emits reports.
#[derive(Debug, Error)]
pub enum ObserverError {
    /// An incoming report failed validation. Terminal for the request.
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// The account store failed to read, write, or decode a record. This is
    /// the only condition a caller may retry.
    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Wrapper for IO failures such as creating the database directory or
    /// writing an export file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the CSV writer.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Raised when a blocking store task panics or is cancelled.
    #[error("background task failed: {0}")]
    Runtime(String),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

impl ObserverError {
    /// Returns `true` when the failure was caused by the caller's input rather
    /// than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ObserverError::Rejected(_))
    }
}

/// Reasons a report is refused before it reaches the store.
///
/// Display strings are safe to send back to the caller: they name the field
/// and the constraint but never repeat unvalidated input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("invalid client ID format")]
    InvalidClientId,

    #[error("unsupported data format version")]
    UnsupportedVersion,

    #[error("invalid account ID: {0}")]
    InvalidAccountId(FieldReason),

    #[error("invalid account name: {0}")]
    InvalidAccountName(FieldReason),

    #[error("invalid countries: {0}")]
    InvalidCountries(CountriesReason),
}

/// Why a single free-text identifier (account id or name) was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldReason {
    Empty,
    TooLong { max: usize },
    InvalidCharacters,
}

impl fmt::Display for FieldReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldReason::Empty => write!(f, "empty"),
            FieldReason::TooLong { max } => write!(f, "too long (maximum {max} characters)"),
            FieldReason::InvalidCharacters => write!(f, "invalid characters"),
        }
    }
}

/// Why a country list was refused. Entries are identified by their zero-based
/// position; only duplicates, which already passed the format check, are
/// echoed verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountriesReason {
    Empty,
    TooMany { max: usize },
    BadLength { index: usize },
    BadFormat { index: usize },
    Duplicate { code: String },
}

impl fmt::Display for CountriesReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountriesReason::Empty => write!(f, "list cannot be empty"),
            CountriesReason::TooMany { max } => write!(f, "more than {max} entries"),
            CountriesReason::BadLength { index } => {
                write!(f, "entry {index} is not 2 characters")
            }
            CountriesReason::BadFormat { index } => {
                write!(f, "entry {index} is not an uppercase country code")
            }
            CountriesReason::Duplicate { code } => write!(f, "duplicate country code '{code}'"),
        }
    }
}
