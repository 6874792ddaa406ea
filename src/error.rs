//! Errors surfaced by the sync engine and context.

use thiserror::Error;
use crate::remote::RemoteError;
use crate::storage::traits::StorageError;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The local store cannot be used. Offline features are off; the app
    /// keeps working remote-only.
    #[error("Offline storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error(transparent)]
    Storage(StorageError),
    #[error("Remote write failed: {0}")]
    RemoteWriteFailed(#[source] RemoteError),
    #[error("Remote read failed: {0}")]
    RemoteReadFailed(#[source] RemoteError),
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable(reason) => Self::StorageUnavailable(reason),
            other => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_maps_to_storage_unavailable() {
        let err: SyncError = StorageError::Unavailable("quota exceeded".into()).into();
        assert!(matches!(err, SyncError::StorageUnavailable(ref m) if m == "quota exceeded"));

        let err: SyncError = StorageError::Backend("disk I/O error".into()).into();
        assert!(matches!(err, SyncError::Storage(_)));
        assert_eq!(err.to_string(), "Storage backend error: disk I/O error");
    }

    #[test]
    fn test_remote_errors_display() {
        let err = SyncError::RemoteReadFailed(RemoteError::ReadFailed("timeout".into()));
        assert_eq!(err.to_string(), "Remote read failed: Remote read failed: timeout");
    }
}
