//! FUSE bridge over the filesystem provider
//!
//! The remote protocol only reads and writes whole files, so partial
//! reads slice a full download and partial writes go through a
//! read-modify-write cycle before uploading the full buffer again.

pub mod inode;

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType as FuseFileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use tracing::{debug, error, trace};

use crate::error::FsError;
use crate::provider::{FileKind, FileStat, WebdavFs, WriteOptions};
use crate::uri::MountUri;

use self::inode::{child_path, PathTable, ROOT_INODE};

/// Default TTL for attribute caching (1 second)
const ATTR_TTL: Duration = Duration::from_secs(1);

/// Generation number (not used, always 0)
const GENERATION: u64 = 0;

/// Block size for reporting
const BLOCK_SIZE: u32 = 4096;

const FILE_PERM: u16 = 0o644;
const DIR_PERM: u16 = 0o755;

fn to_fuse_kind(kind: FileKind) -> FuseFileType {
    match kind {
        FileKind::File => FuseFileType::RegularFile,
        FileKind::Directory => FuseFileType::Directory,
    }
}

/// Epoch milliseconds to SystemTime. Timestamps before the epoch (and
/// the `0` placeholder for unparsable ones) clamp to the epoch itself.
fn millis_to_system_time(ms: i64) -> SystemTime {
    if ms <= 0 {
        UNIX_EPOCH
    } else {
        UNIX_EPOCH + Duration::from_millis(ms as u64)
    }
}

fn stat_to_attr(ino: u64, stat: &FileStat, uid: u32, gid: u32) -> FileAttr {
    let kind = to_fuse_kind(stat.kind);
    let (perm, nlink) = match stat.kind {
        FileKind::File => (FILE_PERM, 1),
        FileKind::Directory => (DIR_PERM, 2),
    };
    let mtime = millis_to_system_time(stat.mtime_ms);
    let blocks = stat.size.div_ceil(BLOCK_SIZE as u64);

    FileAttr {
        ino,
        size: stat.size,
        blocks,
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind,
        perm,
        nlink,
        uid,
        gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

/// FUSE filesystem serving one configured server.
pub struct FuseAdapter {
    fs: Arc<WebdavFs>,
    /// Server identifier this mount is bound to
    authority: String,
    inodes: PathTable,
    /// Dedicated runtime for async remote calls
    runtime: tokio::runtime::Runtime,
    uid: u32,
    gid: u32,
}

impl FuseAdapter {
    pub fn new(fs: Arc<WebdavFs>, authority: impl Into<String>) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .expect("Failed to create FUSE runtime");

        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };

        Self {
            fs,
            authority: authority.into(),
            inodes: PathTable::new(),
            runtime,
            uid,
            gid,
        }
    }

    fn uri_for(&self, path: &str) -> MountUri {
        MountUri::new(self.authority.clone(), path)
    }

    fn path_of(&self, ino: u64) -> Result<String, i32> {
        self.inodes.path_of(ino).ok_or(libc::ENOENT)
    }

    fn child_of(&self, parent: u64, name: &OsStr) -> Result<String, i32> {
        let parent_path = self.path_of(parent)?;
        let name = name.to_str().ok_or(libc::EINVAL)?;
        Ok(child_path(&parent_path, name))
    }

    /// Run an async operation on the dedicated runtime and wait for the
    /// result.
    fn run_async<F, T>(&self, future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        self.runtime.block_on(future)
    }

    fn stat_path(&self, path: &str) -> Result<FileStat, FsError> {
        let fs = self.fs.clone();
        let uri = self.uri_for(path);
        self.run_async(async move { fs.stat(&uri).await })
    }

    /// Download a file, change its length, and upload it again. The only
    /// way to truncate or extend over a whole-file protocol.
    fn resize_path(&self, path: &str, size: u64) -> Result<(), FsError> {
        let fs = self.fs.clone();
        let uri = self.uri_for(path);
        self.run_async(async move {
            let mut buffer = fs.read_file(&uri).await?.to_vec();
            buffer.resize(size as usize, 0);
            fs.write_file(
                &uri,
                &buffer,
                WriteOptions {
                    create: false,
                    overwrite: true,
                },
            )
            .await
        })
    }
}

impl Filesystem for FuseAdapter {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let path = match self.child_of(parent, name) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };
        trace!("lookup: {}", path);

        match self.stat_path(&path) {
            Ok(stat) => {
                let ino = self.inodes.get_or_create(&path);
                let attr = stat_to_attr(ino, &stat, self.uid, self.gid);
                reply.entry(&ATTR_TTL, &attr, GENERATION);
            }
            Err(FsError::NotFound(_)) => {
                reply.error(libc::ENOENT);
            }
            Err(e) => {
                error!("lookup error for {}: {}", path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };
        trace!("getattr: {} (ino={})", path, ino);

        match self.stat_path(&path) {
            Ok(stat) => {
                let attr = stat_to_attr(ino, &stat, self.uid, self.gid);
                reply.attr(&ATTR_TTL, &attr);
            }
            Err(e) => {
                debug!("getattr error for {}: {}", path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        // Truncate is the only honored attribute change. Ownership and
        // mode have no remote representation and are silently accepted,
        // timestamps are whatever the server reports after the upload.
        if let Some(new_size) = size {
            trace!("setattr truncate: {} to {} bytes", path, new_size);
            if let Err(e) = self.resize_path(&path, new_size) {
                error!("setattr error for {}: {}", path, e);
                reply.error(e.to_errno());
                return;
            }
        }

        match self.stat_path(&path) {
            Ok(stat) => {
                let attr = stat_to_attr(ino, &stat, self.uid, self.gid);
                reply.attr(&ATTR_TTL, &attr);
            }
            Err(e) => {
                error!("setattr stat error for {}: {}", path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };
        trace!("read: {} offset={} size={}", path, offset, size);

        let fs = self.fs.clone();
        let uri = self.uri_for(&path);
        match self.run_async(async move { fs.read_file(&uri).await }) {
            Ok(content) => {
                let start = (offset.max(0) as usize).min(content.len());
                let end = (start + size as usize).min(content.len());
                reply.data(&content[start..end]);
            }
            Err(e) => {
                error!("read error for {}: {}", path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };
        trace!("write: {} offset={} size={}", path, offset, data.len());

        let fs = self.fs.clone();
        let uri = self.uri_for(&path);
        let data = data.to_vec();
        let offset = offset.max(0) as usize;
        let result = self.run_async(async move {
            let mut buffer = match fs.read_file(&uri).await {
                Ok(content) => content.to_vec(),
                Err(FsError::NotFound(_)) => Vec::new(),
                Err(e) => return Err(e),
            };

            let end = offset + data.len();
            if buffer.len() < end {
                buffer.resize(end, 0);
            }
            buffer[offset..end].copy_from_slice(&data);

            fs.write_file(
                &uri,
                &buffer,
                WriteOptions {
                    create: true,
                    overwrite: true,
                },
            )
            .await
            .map(|_| data.len())
        });

        match result {
            Ok(written) => reply.written(written as u32),
            Err(e) => {
                error!("write error for {}: {}", path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let path = match self.child_of(parent, name) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };
        debug!("create: {}", path);

        let fs = self.fs.clone();
        let uri = self.uri_for(&path);
        let result = self.run_async(async move {
            fs.write_file(
                &uri,
                &[],
                WriteOptions {
                    create: true,
                    overwrite: false,
                },
            )
            .await?;
            fs.stat(&uri).await
        });

        match result {
            Ok(stat) => {
                let ino = self.inodes.get_or_create(&path);
                let attr = stat_to_attr(ino, &stat, self.uid, self.gid);
                reply.created(&ATTR_TTL, &attr, GENERATION, 0, 0);
            }
            Err(e) => {
                error!("create error for {}: {}", path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let path = match self.child_of(parent, name) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };
        debug!("mkdir: {}", path);

        let fs = self.fs.clone();
        let uri = self.uri_for(&path);
        let result = self.run_async(async move {
            fs.create_directory(&uri).await?;
            fs.stat(&uri).await
        });

        match result {
            Ok(stat) => {
                let ino = self.inodes.get_or_create(&path);
                let attr = stat_to_attr(ino, &stat, self.uid, self.gid);
                reply.entry(&ATTR_TTL, &attr, GENERATION);
            }
            Err(e) => {
                error!("mkdir error for {}: {}", path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_of(parent, name) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };
        debug!("unlink: {}", path);

        let fs = self.fs.clone();
        let uri = self.uri_for(&path);
        match self.run_async(async move { fs.delete(&uri).await }) {
            Ok(()) => {
                self.inodes.remove(&path);
                reply.ok();
            }
            Err(e) => {
                error!("unlink error for {}: {}", path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_of(parent, name) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };
        debug!("rmdir: {}", path);

        let fs = self.fs.clone();
        let uri = self.uri_for(&path);
        match self.run_async(async move { fs.delete(&uri).await }) {
            Ok(()) => {
                self.inodes.remove(&path);
                reply.ok();
            }
            Err(e) => {
                error!("rmdir error for {}: {}", path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        let old_path = match self.child_of(parent, name) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };
        let new_path = match self.child_of(newparent, newname) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };
        debug!("rename: {} -> {}", old_path, new_path);

        let overwrite = flags & libc::RENAME_NOREPLACE == 0;
        let fs = self.fs.clone();
        let old_uri = self.uri_for(&old_path);
        let new_uri = self.uri_for(&new_path);
        match self.run_async(async move { fs.rename(&old_uri, &new_uri, overwrite).await }) {
            Ok(()) => {
                self.inodes.rename(&old_path, &new_path);
                reply.ok();
            }
            Err(e) => {
                error!("rename error {} -> {}: {}", old_path, new_path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn open(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        // Stateless, no file handles to track
        reply.opened(0, 0);
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0);
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };
        trace!("readdir: {} offset={}", path, offset);

        let fs = self.fs.clone();
        let uri = self.uri_for(&path);
        let entries = match self.run_async(async move { fs.read_directory(&uri).await }) {
            Ok(entries) => entries,
            Err(e) => {
                error!("readdir error for {}: {}", path, e);
                reply.error(e.to_errno());
                return;
            }
        };

        let mut idx = 0i64;

        if offset <= idx && reply.add(ino, idx + 1, FuseFileType::Directory, ".") {
            reply.ok();
            return;
        }
        idx += 1;

        if offset <= idx {
            let parent_ino = if ino == ROOT_INODE {
                ROOT_INODE
            } else {
                path.rfind('/')
                    .map(|i| if i == 0 { "/" } else { &path[..i] })
                    .and_then(|p| self.inodes.inode_of(p))
                    .unwrap_or(ROOT_INODE)
            };
            if reply.add(parent_ino, idx + 1, FuseFileType::Directory, "..") {
                reply.ok();
                return;
            }
        }
        idx += 1;

        for (name, kind) in entries {
            if offset <= idx {
                let entry_path = child_path(&path, &name);
                let entry_ino = self.inodes.get_or_create(&entry_path);
                if reply.add(entry_ino, idx + 1, to_fuse_kind(kind), &name) {
                    // Buffer full
                    reply.ok();
                    return;
                }
            }
            idx += 1;
        }

        reply.ok();
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        // Writes upload the full buffer synchronously, nothing is pending
        reply.ok();
    }

    fn fsync(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _datasync: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, _mask: i32, reply: ReplyEmpty) {
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        match self.stat_path(&path) {
            Ok(_) => reply.ok(),
            Err(FsError::NotFound(_)) => reply.error(libc::ENOENT),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        // Dummy stats, the remote side reports no quota information
        reply.statfs(
            u64::MAX,
            u64::MAX,
            u64::MAX,
            u64::MAX,
            u64::MAX,
            BLOCK_SIZE,
            255,
            BLOCK_SIZE,
        );
    }
}
