//! WebDAV client layer
//!
//! Backends sit behind the [`RemoteClient`] trait so the provider and its
//! tests never depend on a live server; [`http::DavClient`] is the real
//! implementation over reqwest.

pub mod http;
mod xml;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Remote type string for regular files. Anything else — `"directory"`,
/// an empty string, whatever a server invents — is treated as a directory.
pub const TYPE_FILE: &str = "file";

/// Credentials attached to every request.
#[derive(Debug, Clone)]
pub enum Auth {
    None,
    Basic { username: String, password: String },
    Digest { username: String, password: String },
}

/// Errors produced by WebDAV clients.
#[derive(Error, Debug)]
pub enum DavError {
    /// A bare diagnostic string with no structure.
    #[error("{0}")]
    Message(String),

    /// An HTTP-level failure with the status the server returned.
    #[error("Error {status}: {message}")]
    Status { status: u16, message: String },

    /// Transport failure before any response arrived.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with something we could not interpret.
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),
}

/// Metadata for one remote resource, as reported by the server.
#[derive(Debug, Clone)]
pub struct DavStat {
    /// Full decoded path on the server
    pub filename: String,
    /// Last path segment
    pub basename: String,
    /// Modification time as sent on the wire (RFC 1123), unparsed
    pub lastmod: String,
    /// Size in bytes (0 for collections)
    pub size: u64,
    /// Remote type string, usually `"file"` or `"directory"`
    pub resource_type: String,
}

/// Some client call variants wrap their payload in a detail envelope;
/// callers unwrap exactly once via [`DavResponse::into_data`].
#[derive(Debug)]
pub enum DavResponse<T> {
    Raw(T),
    Detailed { data: T },
}

impl<T> DavResponse<T> {
    pub fn into_data(self) -> T {
        match self {
            DavResponse::Raw(data) | DavResponse::Detailed { data } => data,
        }
    }
}

/// File bodies may arrive textual or binary.
#[derive(Debug)]
pub enum FileContent {
    Text(String),
    Binary(Bytes),
}

impl FileContent {
    /// Normalize to a byte sequence; textual payloads become UTF-8 bytes.
    pub fn into_bytes(self) -> Bytes {
        match self {
            FileContent::Text(text) => Bytes::from(text.into_bytes()),
            FileContent::Binary(bytes) => bytes,
        }
    }
}

/// Core client trait for one WebDAV server.
///
/// Paths are server-absolute (`/docs/readme.txt`) and passed through
/// from mount URIs unmodified.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Base URL this client was constructed with (`scheme://host`).
    fn base_url(&self) -> &str;

    /// Fetch metadata for a path.
    async fn stat(&self, path: &str) -> Result<DavResponse<DavStat>, DavError>;

    /// List the entries of a collection (the collection itself excluded).
    async fn get_directory_contents(
        &self,
        path: &str,
    ) -> Result<DavResponse<Vec<DavStat>>, DavError>;

    /// Check whether a path exists.
    ///
    /// Default implementation uses `stat()`, treating 404 as absence.
    async fn exists(&self, path: &str) -> Result<bool, DavError> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(DavError::Status { status: 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create a collection, non-recursively.
    async fn create_directory(&self, path: &str) -> Result<(), DavError>;

    /// Fetch the raw contents of a file.
    async fn get_file_contents(&self, path: &str) -> Result<DavResponse<FileContent>, DavError>;

    /// Upload file contents. With `overwrite` off the request must fail
    /// if the resource already exists.
    async fn put_file_contents(
        &self,
        path: &str,
        data: &[u8],
        overwrite: bool,
    ) -> Result<(), DavError>;

    /// Delete a file or collection.
    async fn delete_file(&self, path: &str) -> Result<(), DavError>;

    /// Atomic server-side move.
    async fn move_file(&self, from: &str, to: &str) -> Result<(), DavError>;

    /// Server-side copy.
    async fn copy_file(&self, from: &str, to: &str) -> Result<(), DavError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_unwraps_once() {
        assert_eq!(DavResponse::Raw(7).into_data(), 7);
        assert_eq!(DavResponse::Detailed { data: 7 }.into_data(), 7);
    }

    #[test]
    fn test_text_content_encodes_utf8() {
        let bytes = FileContent::Text("héllo".to_string()).into_bytes();
        assert_eq!(&bytes[..], "héllo".as_bytes());
    }

    #[test]
    fn test_binary_content_passes_through() {
        let payload = Bytes::from_static(&[0u8, 159, 146, 150]);
        assert_eq!(FileContent::Binary(payload.clone()).into_bytes(), payload);
    }

    /// Client whose `stat` always fails with a fixed status, for testing
    /// the default `exists` implementation.
    struct StatusClient(u16);

    #[async_trait]
    impl RemoteClient for StatusClient {
        fn base_url(&self) -> &str {
            "https://example.com"
        }

        async fn stat(&self, _path: &str) -> Result<DavResponse<DavStat>, DavError> {
            Err(DavError::Status {
                status: self.0,
                message: "stat".to_string(),
            })
        }

        async fn get_directory_contents(
            &self,
            _path: &str,
        ) -> Result<DavResponse<Vec<DavStat>>, DavError> {
            unimplemented!()
        }

        async fn create_directory(&self, _path: &str) -> Result<(), DavError> {
            unimplemented!()
        }

        async fn get_file_contents(
            &self,
            _path: &str,
        ) -> Result<DavResponse<FileContent>, DavError> {
            unimplemented!()
        }

        async fn put_file_contents(
            &self,
            _path: &str,
            _data: &[u8],
            _overwrite: bool,
        ) -> Result<(), DavError> {
            unimplemented!()
        }

        async fn delete_file(&self, _path: &str) -> Result<(), DavError> {
            unimplemented!()
        }

        async fn move_file(&self, _from: &str, _to: &str) -> Result<(), DavError> {
            unimplemented!()
        }

        async fn copy_file(&self, _from: &str, _to: &str) -> Result<(), DavError> {
            unimplemented!()
        }
    }

    #[test]
    fn test_default_exists_treats_404_as_absence() {
        assert!(!tokio_test::block_on(StatusClient(404).exists("/x")).unwrap());

        let err = tokio_test::block_on(StatusClient(500).exists("/x")).unwrap_err();
        assert!(matches!(err, DavError::Status { status: 500, .. }));
    }
}
