//! Inode bookkeeping for the kernel interface
//!
//! The kernel addresses files by inode number while the remote side is
//! addressed by slash-separated paths. This table hands out stable inode
//! numbers per path and resolves them back.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Root directory inode (always 1 in FUSE)
pub const ROOT_INODE: u64 = 1;

/// Bidirectional inode <-> remote path mapping
pub struct PathTable {
    inode_to_path: DashMap<u64, String>,
    path_to_inode: DashMap<String, u64>,
    next_inode: AtomicU64,
}

impl PathTable {
    pub fn new() -> Self {
        let table = Self {
            inode_to_path: DashMap::new(),
            path_to_inode: DashMap::new(),
            next_inode: AtomicU64::new(ROOT_INODE + 1),
        };
        table.inode_to_path.insert(ROOT_INODE, "/".to_string());
        table.path_to_inode.insert("/".to_string(), ROOT_INODE);
        table
    }

    /// Inode for a path, allocating one on first sight.
    pub fn get_or_create(&self, path: &str) -> u64 {
        let normalized = normalize(path);

        if let Some(inode) = self.path_to_inode.get(&normalized) {
            return *inode;
        }

        let candidate = self.next_inode.fetch_add(1, Ordering::SeqCst);
        let inode = *self
            .path_to_inode
            .entry(normalized.clone())
            .or_insert_with(|| {
                self.inode_to_path.insert(candidate, normalized.clone());
                candidate
            });
        // Another thread may have inserted first; its inode wins.
        inode
    }

    pub fn path_of(&self, inode: u64) -> Option<String> {
        self.inode_to_path.get(&inode).map(|p| p.clone())
    }

    pub fn inode_of(&self, path: &str) -> Option<u64> {
        self.path_to_inode.get(&normalize(path)).map(|i| *i)
    }

    /// Drop the mapping for a path and everything beneath it.
    pub fn remove(&self, path: &str) {
        let normalized = normalize(path);
        let prefix = subtree_prefix(&normalized);

        self.path_to_inode.retain(|p, inode| {
            if p == &normalized || p.starts_with(&prefix) {
                self.inode_to_path.remove(inode);
                false
            } else {
                true
            }
        });
    }

    /// Repoint a path (and its subtree) at a new location, keeping the
    /// inode numbers stable across the move.
    pub fn rename(&self, old: &str, new: &str) {
        let old = normalize(old);
        let new = normalize(new);
        let old_prefix = subtree_prefix(&old);

        let moved: Vec<(String, u64)> = self
            .path_to_inode
            .iter()
            .filter(|e| e.key() == &old || e.key().starts_with(&old_prefix))
            .map(|e| (e.key().clone(), *e.value()))
            .collect();

        for (path, inode) in moved {
            let renamed = format!("{}{}", new, &path[old.len()..]);
            self.path_to_inode.remove(&path);
            self.path_to_inode.insert(renamed.clone(), inode);
            self.inode_to_path.insert(inode, renamed);
        }
    }

    pub fn len(&self) -> usize {
        self.inode_to_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inode_to_path.is_empty()
    }
}

impl Default for PathTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Join a directory path and an entry name into a child path.
pub fn child_path(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}

fn normalize(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    let mut normalized = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

fn subtree_prefix(path: &str) -> String {
    if path == "/" {
        "/".to_string()
    } else {
        format!("{path}/")
    }
}
