//! Filesystem provider over WebDAV
//!
//! `WebdavFs` is the adapter between filesystem-shaped operations on
//! `webdav://authority/path` URIs and the WebDAV client resolved for that
//! authority. Every operation translates remote failures through
//! [`translate_remote_error`] so the user sees a diagnostic naming the
//! affected path before the operation fails; pre-check violations raise
//! typed errors before any remote mutation is attempted.

use std::sync::Arc;

use bytes::Bytes;
use chrono::DateTime;
use tracing::{error, trace, warn};

use crate::dav::{RemoteClient, TYPE_FILE};
use crate::error::{translate_remote_error, FsError, Result};
use crate::registry::ClientRegistry;
use crate::uri::MountUri;

/// File type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
}

/// Normalized metadata for a file or directory.
///
/// WebDAV reports no creation time, so `ctime_ms` always equals
/// `mtime_ms`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub kind: FileKind,
    /// Modification time, epoch milliseconds
    pub mtime_ms: i64,
    /// Creation time, epoch milliseconds (same as `mtime_ms`)
    pub ctime_ms: i64,
    /// Size in bytes
    pub size: u64,
}

/// Flags for [`WebdavFs::write_file`].
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// Create the file if it does not exist
    pub create: bool,
    /// Replace existing contents
    pub overwrite: bool,
}

/// Inert watch handle.
///
/// WebDAV has no change-notification capability, so there is nothing to
/// subscribe to; dropping the handle does nothing.
#[derive(Debug, Default)]
#[must_use]
pub struct Subscription {
    _priv: (),
}

/// Map a remote type string to a kind. Only the exact literal `"file"`
/// is a file; every other string is a directory.
fn kind_from_remote(resource_type: &str) -> FileKind {
    if resource_type == TYPE_FILE {
        FileKind::File
    } else {
        FileKind::Directory
    }
}

/// Convert a wire timestamp (RFC 1123) to epoch milliseconds.
fn lastmod_to_millis(lastmod: &str) -> i64 {
    match DateTime::parse_from_rfc2822(lastmod) {
        Ok(dt) => dt.timestamp_millis(),
        Err(e) => {
            warn!("unparsable lastmod '{}': {}", lastmod, e);
            0
        }
    }
}

/// The filesystem adapter: one instance serves every configured mount.
pub struct WebdavFs {
    registry: ClientRegistry,
}

impl WebdavFs {
    pub fn new(registry: ClientRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    fn client(&self, uri: &MountUri) -> Result<Arc<dyn RemoteClient>> {
        self.registry.resolve(uri.authority())
    }

    /// Subscribe to changes under `uri`. The protocol cannot notify, so
    /// the returned handle is inert.
    pub fn watch(&self, uri: &MountUri) -> Subscription {
        trace!("watch: {} (no change notifications available)", uri);
        Subscription::default()
    }

    /// Retrieve metadata for `uri`.
    pub async fn stat(&self, uri: &MountUri) -> Result<FileStat> {
        let client = self.client(uri)?;

        let stat = client
            .stat(uri.path())
            .await
            .map_err(|e| translate_remote_error(uri, e))?
            .into_data();

        let mtime_ms = lastmod_to_millis(&stat.lastmod);
        Ok(FileStat {
            kind: kind_from_remote(&stat.resource_type),
            mtime_ms,
            ctime_ms: mtime_ms,
            size: stat.size,
        })
    }

    /// List a directory as (base name, kind) pairs.
    pub async fn read_directory(&self, uri: &MountUri) -> Result<Vec<(String, FileKind)>> {
        let client = self.client(uri)?;

        let entries = client
            .get_directory_contents(uri.path())
            .await
            .map_err(|e| translate_remote_error(uri, e))?
            .into_data();

        Ok(entries
            .into_iter()
            .map(|e| {
                let kind = kind_from_remote(&e.resource_type);
                (e.basename, kind)
            })
            .collect())
    }

    /// Create a directory, non-recursively. A missing parent is reported
    /// by the remote side; an existing target fails before any request.
    pub async fn create_directory(&self, uri: &MountUri) -> Result<()> {
        let client = self.client(uri)?;

        if self.exists(&client, uri).await? {
            return Err(already_exists(uri));
        }

        client
            .create_directory(uri.path())
            .await
            .map_err(|e| translate_remote_error(uri, e))
    }

    /// Read the entire contents of a file.
    pub async fn read_file(&self, uri: &MountUri) -> Result<Bytes> {
        let client = self.client(uri)?;

        let content = client
            .get_file_contents(uri.path())
            .await
            .map_err(|e| translate_remote_error(uri, e))?
            .into_data();

        Ok(content.into_bytes())
    }

    /// Write `content` to a file, replacing its entire contents.
    pub async fn write_file(
        &self,
        uri: &MountUri,
        content: &[u8],
        options: WriteOptions,
    ) -> Result<()> {
        let client = self.client(uri)?;

        let exists = self.exists(&client, uri).await?;

        if !exists && !options.create {
            return Err(not_found(uri));
        }

        if exists {
            if !options.overwrite {
                return Err(already_exists(uri));
            }

            // Refuse to replace a directory with file content, even with
            // overwrite set.
            let stat = client
                .stat(uri.path())
                .await
                .map_err(|e| translate_remote_error(uri, e))?
                .into_data();
            if kind_from_remote(&stat.resource_type) == FileKind::Directory {
                return Err(is_a_directory(uri));
            }
        }

        client
            .put_file_contents(uri.path(), content, options.overwrite)
            .await
            .map_err(|e| translate_remote_error(uri, e))
    }

    /// Delete the resource at `uri`. No existence pre-check: absence is
    /// reported by the remote call itself.
    pub async fn delete(&self, uri: &MountUri) -> Result<()> {
        let client = self.client(uri)?;

        client
            .delete_file(uri.path())
            .await
            .map_err(|e| translate_remote_error(uri, e))
    }

    /// Rename (move) a file or folder within one mount.
    pub async fn rename(&self, old: &MountUri, new: &MountUri, overwrite: bool) -> Result<()> {
        let client = self.prepare_transfer(old, new, overwrite).await?;

        client
            .move_file(old.path(), new.path())
            .await
            .map_err(|e| translate_remote_error(old, e))
    }

    /// Copy a file or folder within one mount.
    pub async fn copy(&self, old: &MountUri, new: &MountUri, overwrite: bool) -> Result<()> {
        let client = self.prepare_transfer(old, new, overwrite).await?;

        client
            .copy_file(old.path(), new.path())
            .await
            .map_err(|e| translate_remote_error(old, e))
    }

    /// Shared pre-checks for rename/copy: both URIs must resolve, they
    /// must resolve to the same client, and without `overwrite` the
    /// destination must not exist.
    async fn prepare_transfer(
        &self,
        old: &MountUri,
        new: &MountUri,
        overwrite: bool,
    ) -> Result<Arc<dyn RemoteClient>> {
        let client = self.client(old)?;
        let _destination = self.client(new)?;

        // Distinct registry entries never share a client, so comparing
        // authorities is equivalent to comparing client identity.
        if old.authority() != new.authority() {
            return Err(cross_server(old));
        }

        if !overwrite && self.exists(&client, new).await? {
            return Err(already_exists(new));
        }

        Ok(client)
    }

    async fn exists(&self, client: &Arc<dyn RemoteClient>, uri: &MountUri) -> Result<bool> {
        client
            .exists(uri.path())
            .await
            .map_err(|e| translate_remote_error(uri, e))
    }
}

fn not_found(uri: &MountUri) -> FsError {
    error!("File not found: \"{}\"", uri.path());
    FsError::NotFound(uri.to_string())
}

fn already_exists(uri: &MountUri) -> FsError {
    error!("File already exists: \"{}\"", uri.path());
    FsError::AlreadyExists(uri.to_string())
}

fn is_a_directory(uri: &MountUri) -> FsError {
    error!("Is a directory: \"{}\"", uri.path());
    FsError::IsADirectory(uri.to_string())
}

fn cross_server(uri: &MountUri) -> FsError {
    error!(
        "Cannot move or copy \"{}\" to a different server",
        uri.path()
    );
    FsError::PermissionDenied(uri.to_string())
}
