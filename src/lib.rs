//! webdav-fuse: mount WebDAV servers as local folders via FUSE
//!
//! Servers are declared in a YAML config keyed by identifier; each mount
//! is addressed as `webdav://<identifier>/<path>` and backed by one cached
//! client per identifier.
//!
//! # Architecture
//!
//! - **Config**: server entries (host, ssl, authtype, credentials) keyed by
//!   identifier, resolved lazily when a client is first needed.
//! - **Client Registry**: memoized identifier -> WebDAV client map; clients
//!   live for the process lifetime, so config edits need a restart.
//! - **Provider**: `WebdavFs` translates filesystem operations (stat, list,
//!   read, write, delete, rename, copy) into WebDAV calls and translates
//!   failures into a typed error vocabulary.
//! - **FUSE Adapter**: maps kernel filesystem requests onto the provider,
//!   managing inode <-> remote path mapping.
//! - **Mount Manager**: lifecycle of multiple simultaneous mounts.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use webdav_fuse::config::Config;
//! use webdav_fuse::provider::WebdavFs;
//! use webdav_fuse::registry::ClientRegistry;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(Config::from_file(&"config.yaml".into())?);
//! let fs = WebdavFs::new(ClientRegistry::new(config));
//! // mount an authority via mount::MountManager, or call fs directly
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dav;
pub mod env;
pub mod error;
pub mod fuse;
pub mod mount;
pub mod provider;
pub mod registry;
pub mod uri;

pub use error::{FsError, Result};
pub use provider::WebdavFs;
pub use uri::MountUri;

/// URI scheme used for mounts.
pub const SCHEME: &str = "webdav";
