use std::error::Error as StdError;
use std::fmt;

/// Errors surfaced by the admin workflow
#[derive(Debug)]
pub enum AdminError {
    /// Listing or reading rows failed
    Fetch(String),
    /// Transferring a file into a bucket failed
    Upload(String),
    /// The public URL of an uploaded object could not be computed
    UrlResolution(String),
    /// Insert, update or delete rejected by the store
    Write(String),
    /// Client-side validation failed; nothing was sent
    Validation(String),
    /// No row matched the requested id
    NotFound { table: String, id: i64 },
    /// Sign-in rejected, message is human readable
    Auth(String),
    /// A submission is already in flight
    Busy,
    /// Invalid or incomplete configuration
    Config(String),
    /// Local I/O error
    Io(std::io::Error),
}

impl fmt::Display for AdminError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminError::Fetch(msg) => write!(f, "Fetch failed: {}", msg),
            AdminError::Upload(msg) => write!(f, "Upload failed: {}", msg),
            AdminError::UrlResolution(msg) => write!(f, "URL resolution failed: {}", msg),
            AdminError::Write(msg) => write!(f, "Write failed: {}", msg),
            AdminError::Validation(msg) => write!(f, "Validation failed: {}", msg),
            AdminError::NotFound { table, id } => {
                write!(f, "No row with id {} in table '{}'", id, table)
            }
            AdminError::Auth(msg) => write!(f, "{}", msg),
            AdminError::Busy => write!(f, "A submission is already in progress"),
            AdminError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AdminError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl StdError for AdminError {}

impl From<std::io::Error> for AdminError {
    fn from(err: std::io::Error) -> Self {
        AdminError::Io(err)
    }
}

impl AdminError {
    /// Message safe to show to the operator for a failed operation.
    ///
    /// Network-origin failures collapse into one generic line per operation;
    /// validation, auth and not-found keep their detail.
    pub fn user_message(&self, operation: &str) -> String {
        match self {
            AdminError::Validation(msg) | AdminError::Auth(msg) => msg.clone(),
            AdminError::NotFound { .. } => format!("Failed to {}: record not found.", operation),
            AdminError::Busy => "A submission is already in progress.".to_string(),
            AdminError::Upload(_) => format!("Failed to {}: file upload failed.", operation),
            AdminError::UrlResolution(_) => {
                format!("Failed to {}: could not resolve file URL.", operation)
            }
            _ => format!("Failed to {}.", operation),
        }
    }
}

pub type Result<T> = std::result::Result<T, AdminError>;
