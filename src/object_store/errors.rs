//! Object-store errors

use thiserror::Error;

/// Result type for object-store operations
pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// The requested key does not exist. Callers may treat this as an
    /// ordinary outcome (e.g. no prior backups, no incremental metadata).
    #[error("no such key: {0}")]
    NoSuchKey(String),

    #[error("s3 request failed for {0}: {1}")]
    Request(String, String),

    #[error("failed to read object body for {0}: {1}")]
    Read(String, String),

    #[error("failed to open local file {0}: {1}")]
    LocalFile(String, String),
}

impl ObjectStoreError {
    pub(crate) fn request(what: &str, err: impl std::fmt::Debug) -> Self {
        ObjectStoreError::Request(what.to_string(), format!("{:?}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_such_key_is_distinguishable() {
        let err = ObjectStoreError::NoSuchKey("folder/backups/x".into());
        assert!(matches!(err, ObjectStoreError::NoSuchKey(_)));
        assert!(err.to_string().contains("folder/backups/x"));
    }
}
