//! Mount management and lifecycle

use std::path::PathBuf;
use std::sync::Arc;

use fuser::MountOption;
use parking_lot::Mutex;
use tracing::info;

use crate::error::{FsError, Result};
use crate::fuse::FuseAdapter;
use crate::provider::WebdavFs;

/// An active mount: one server identifier attached to one local path.
pub struct ActiveMount {
    /// Server identifier the mount serves
    pub authority: String,
    /// Local mount path
    pub path: PathBuf,
    /// Session handle (for unmounting)
    session: Option<fuser::BackgroundSession>,
}

impl ActiveMount {
    fn new(authority: String, path: PathBuf, session: fuser::BackgroundSession) -> Self {
        Self {
            authority,
            path,
            session: Some(session),
        }
    }

    /// Unmount this filesystem
    pub fn unmount(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Unmounting webdav://{} from {:?}", self.authority, self.path);
            drop(session);
        }
    }
}

impl Drop for ActiveMount {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Tracks every active mount and tears them down on shutdown.
pub struct MountManager {
    fs: Arc<WebdavFs>,
    mounts: Mutex<Vec<ActiveMount>>,
}

impl MountManager {
    pub fn new(fs: Arc<WebdavFs>) -> Self {
        Self {
            fs,
            mounts: Mutex::new(Vec::new()),
        }
    }

    /// Mount a configured server at the specified local path.
    pub fn mount(&self, authority: &str, path: PathBuf) -> Result<()> {
        info!("Mounting webdav://{} at {:?}", authority, path);

        if !path.exists() {
            return Err(FsError::NotFound(format!(
                "Mount point does not exist: {:?}",
                path
            )));
        }
        if !path.is_dir() {
            return Err(FsError::NotADirectory(format!(
                "Mount point is not a directory: {:?}",
                path
            )));
        }

        // Resolve eagerly so a bad server entry fails the mount command
        // instead of every later kernel request.
        self.fs.registry().resolve(authority)?;

        let adapter = FuseAdapter::new(self.fs.clone(), authority);

        let options = vec![
            MountOption::FSName(format!("webdav-fuse:{authority}")),
            MountOption::AutoUnmount,
            MountOption::DefaultPermissions,
        ];

        let session = fuser::spawn_mount2(adapter, &path, &options).map_err(FsError::Io)?;

        let active = ActiveMount::new(authority.to_string(), path.clone(), session);
        self.mounts.lock().push(active);

        info!("Successfully mounted webdav://{} at {:?}", authority, path);
        Ok(())
    }

    /// Unmount a specific path
    pub fn unmount(&self, path: &PathBuf) -> Result<()> {
        let mut mounts = self.mounts.lock();
        if let Some(pos) = mounts.iter().position(|m| &m.path == path) {
            let mut mount = mounts.remove(pos);
            mount.unmount();
            Ok(())
        } else {
            Err(FsError::NotFound(format!("No mount at {:?}", path)))
        }
    }

    /// Unmount all filesystems
    pub fn unmount_all(&self) {
        info!("Unmounting all filesystems");
        let mut mounts = self.mounts.lock();
        for mut mount in mounts.drain(..) {
            mount.unmount();
        }
    }

    /// Get list of active mounts as (authority, path) pairs
    pub fn list_mounts(&self) -> Vec<(String, PathBuf)> {
        self.mounts
            .lock()
            .iter()
            .map(|m| (m.authority.clone(), m.path.clone()))
            .collect()
    }

    /// Number of active mounts
    pub fn count(&self) -> usize {
        self.mounts.lock().len()
    }
}

impl Drop for MountManager {
    fn drop(&mut self) {
        self.unmount_all();
    }
}
