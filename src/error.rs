use std::io;

use thiserror::Error;
use tracing::error;

use crate::dav::DavError;
use crate::uri::MountUri;

/// Main error type for webdav-fuse operations
#[derive(Error, Debug)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote failure with no typed mapping, propagated unchanged.
    #[error(transparent)]
    Dav(DavError),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    /// Convert error to libc errno for FUSE responses
    pub fn to_errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::PermissionDenied(_) => libc::EACCES,
            FsError::IsADirectory(_) => libc::EISDIR,
            FsError::NotADirectory(_) => libc::ENOTDIR,
            FsError::InvalidUri(_) => libc::EINVAL,
            FsError::NotSupported(_) => libc::ENOSYS,
            FsError::Config(_) => libc::EINVAL,
            FsError::Dav(_) => libc::EIO,
            FsError::Remote(_) => libc::EIO,
            FsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

/// Result type alias for webdav-fuse operations
pub type Result<T> = std::result::Result<T, FsError>;

/// Translate a WebDAV client failure into the typed error vocabulary,
/// logging a user-visible diagnostic naming the affected path.
///
/// Only 401/403 (permission denied) and 404 (not found) get a typed
/// mapping; every other status is passed through unchanged as an opaque
/// remote failure.
pub fn translate_remote_error(uri: &MountUri, err: DavError) -> FsError {
    match err {
        DavError::Message(msg) => {
            error!("Error for file \"{}\": {}", uri.path(), msg);
            FsError::Remote(msg)
        }
        DavError::Status { status, message } => {
            error!("Error {} for file \"{}\": {}", status, uri.path(), message);
            match status {
                401 | 403 => FsError::PermissionDenied(uri.to_string()),
                404 => FsError::NotFound(uri.to_string()),
                _ => FsError::Dav(DavError::Status { status, message }),
            }
        }
        other => {
            error!("Error for file \"{}\": {}", uri.path(), other);
            FsError::Dav(other)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> MountUri {
        s.parse().unwrap()
    }

    #[test]
    fn test_status_404_maps_to_not_found() {
        let err = translate_remote_error(
            &uri("webdav://srv1/a.txt"),
            DavError::Status {
                status: 404,
                message: "x".to_string(),
            },
        );
        assert!(matches!(err, FsError::NotFound(_)));
    }

    #[test]
    fn test_status_401_and_403_map_to_permission_denied() {
        for status in [401, 403] {
            let err = translate_remote_error(
                &uri("webdav://srv1/a.txt"),
                DavError::Status {
                    status,
                    message: "denied".to_string(),
                },
            );
            assert!(matches!(err, FsError::PermissionDenied(_)), "status {status}");
        }
    }

    #[test]
    fn test_other_statuses_pass_through_unchanged() {
        let err = translate_remote_error(
            &uri("webdav://srv1/a.txt"),
            DavError::Status {
                status: 500,
                message: "boom".to_string(),
            },
        );
        match err {
            FsError::Dav(DavError::Status { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected opaque passthrough, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_message_becomes_remote_error() {
        let err = translate_remote_error(
            &uri("webdav://srv1/a.txt"),
            DavError::Message("socket closed".to_string()),
        );
        match err {
            FsError::Remote(msg) => assert_eq!(msg, "socket closed"),
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[test]
    fn test_errno_mapping() {
        assert_eq!(FsError::NotFound(String::new()).to_errno(), libc::ENOENT);
        assert_eq!(FsError::AlreadyExists(String::new()).to_errno(), libc::EEXIST);
        assert_eq!(
            FsError::PermissionDenied(String::new()).to_errno(),
            libc::EACCES
        );
        assert_eq!(FsError::IsADirectory(String::new()).to_errno(), libc::EISDIR);
        assert_eq!(
            FsError::Dav(DavError::Message(String::new())).to_errno(),
            libc::EIO
        );
    }
}
