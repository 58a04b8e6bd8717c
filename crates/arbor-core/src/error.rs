//! Error types for Arbor.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using Arbor's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Arbor operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input (empty name, unknown node type, negative depth).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Hierarchy node not found
    #[error("Node not found: {0}")]
    NodeNotFound(Uuid),

    /// Note not found
    #[error("Note not found: {0}")]
    NoteNotFound(Uuid),

    /// Attachment not found
    #[error("Attachment not found: {0}")]
    AttachmentNotFound(Uuid),

    /// Uniqueness violation (duplicate closure edge, duplicate id).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Store connection or transaction failure.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Database operation failed for any other reason
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Blob storage I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for every not-found flavour.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::NodeNotFound(_)
                | Error::NoteNotFound(_)
                | Error::AttachmentNotFound(_)
        )
    }
}

/// Map the sqlx failures that have a meaning in the error taxonomy.
///
/// Returns `None` for everything else, which stays a plain `Database` error.
fn classify_sqlx(err: &sqlx::Error) -> Option<Error> {
    match err {
        sqlx::Error::RowNotFound => Some(Error::NotFound("row not found".to_string())),
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_) => Some(Error::Unavailable(err.to_string())),
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
            let message = db_err.message().to_string();
            match code.as_str() {
                // unique_violation
                "23505" => Some(Error::Conflict(message)),
                // foreign_key_violation
                "23503" => Some(Error::NotFound(message)),
                // connection_exception class, admin/crash shutdown
                c if c.starts_with("08") || c == "57P01" || c == "57P02" || c == "57P03" => {
                    Some(Error::Unavailable(message))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match classify_sqlx(&err) {
            Some(classified) => classified,
            None => Error::Database(err),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_argument() {
        let err = Error::InvalidArgument("name must not be empty".to_string());
        assert_eq!(err.to_string(), "Invalid argument: name must not be empty");
    }

    #[test]
    fn test_error_display_node_not_found() {
        let id = Uuid::nil();
        let err = Error::NodeNotFound(id);
        assert_eq!(err.to_string(), format!("Node not found: {}", id));
    }

    #[test]
    fn test_error_display_conflict() {
        let err = Error::Conflict("duplicate closure edge".to_string());
        assert_eq!(err.to_string(), "Conflict: duplicate closure edge");
    }

    #[test]
    fn test_error_display_unavailable() {
        let err = Error::Unavailable("connection refused".to_string());
        assert_eq!(err.to_string(), "Store unavailable: connection refused");
    }

    #[test]
    fn test_is_not_found_covers_all_variants() {
        let id = Uuid::now_v7();
        assert!(Error::NotFound("x".to_string()).is_not_found());
        assert!(Error::NodeNotFound(id).is_not_found());
        assert!(Error::NoteNotFound(id).is_not_found());
        assert!(Error::AttachmentNotFound(id).is_not_found());
        assert!(!Error::Conflict("x".to_string()).is_not_found());
    }

    #[test]
    fn test_pool_timeout_is_unavailable() {
        let err: Error = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[test]
    fn test_pool_closed_is_unavailable() {
        let err: Error = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[test]
    fn test_io_failure_is_unavailable() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: Error = sqlx::Error::Io(io_err).into();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[test]
    fn test_row_not_found_is_not_found() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_other_sqlx_errors_stay_database() {
        let err: Error = sqlx::Error::ColumnNotFound("depth".to_string()).into();
        assert!(matches!(err, Error::Database(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.to_string().contains("Serialization error:"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        match err {
            Error::Io(_) => {} // Success
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
