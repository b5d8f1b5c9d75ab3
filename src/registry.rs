//! Per-authority client registry
//!
//! One WebDAV client per configured identifier, created on first use and
//! kept for the process lifetime. There is no invalidation: editing the
//! configuration requires a restart to take effect.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error};

use crate::config::{Config, ResolvedServer};
use crate::dav::http::DavClient;
use crate::dav::{DavError, RemoteClient};
use crate::error::{FsError, Result};

/// Builds a client from resolved connection parameters. Pluggable so
/// tests can supply in-memory clients.
pub type ClientFactory =
    dyn Fn(&ResolvedServer) -> std::result::Result<Arc<dyn RemoteClient>, DavError> + Send + Sync;

/// Memoized identifier -> client map.
pub struct ClientRegistry {
    config: Arc<Config>,
    clients: DashMap<String, Arc<dyn RemoteClient>>,
    factory: Box<ClientFactory>,
}

impl ClientRegistry {
    /// Registry backed by real HTTP clients.
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_factory(
            config,
            Box::new(|server: &ResolvedServer| {
                let client = DavClient::new(&server.base_url, server.auth.clone())?;
                Ok(Arc::new(client) as Arc<dyn RemoteClient>)
            }),
        )
    }

    /// Registry with a custom client factory.
    pub fn with_factory(config: Arc<Config>, factory: Box<ClientFactory>) -> Self {
        Self {
            config,
            clients: DashMap::new(),
            factory,
        }
    }

    /// The configuration this registry resolves identifiers against.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Return the cached client for `identifier`, constructing it on a miss.
    ///
    /// Configuration problems and construction failures are fatal for the
    /// calling operation and are not retried here; the next miss will try
    /// again from scratch.
    pub fn resolve(&self, identifier: &str) -> Result<Arc<dyn RemoteClient>> {
        if let Some(client) = self.clients.get(identifier) {
            return Ok(client.clone());
        }

        let server = self.config.resolve_server(identifier).map_err(|e| {
            error!("Invalid configuration for server '{}': {}", identifier, e);
            FsError::Config(e.to_string())
        })?;

        debug!(
            "creating client for '{}' at {}",
            identifier, server.base_url
        );

        let client = (self.factory)(&server).map_err(|e| {
            error!("Could not initialize client for '{}': {}", identifier, e);
            FsError::Config(format!("could not initialize client for '{identifier}': {e}"))
        })?;

        // Concurrent misses may build twice; handles are interchangeable,
        // so last write wins.
        self.clients.insert(identifier.to_string(), client.clone());

        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::dav::{DavResponse, DavStat, FileContent};

    struct NullClient {
        base_url: String,
    }

    #[async_trait]
    impl RemoteClient for NullClient {
        fn base_url(&self) -> &str {
            &self.base_url
        }

        async fn stat(&self, _path: &str) -> std::result::Result<DavResponse<DavStat>, DavError> {
            Err(DavError::Message("offline".to_string()))
        }

        async fn get_directory_contents(
            &self,
            _path: &str,
        ) -> std::result::Result<DavResponse<Vec<DavStat>>, DavError> {
            Err(DavError::Message("offline".to_string()))
        }

        async fn create_directory(&self, _path: &str) -> std::result::Result<(), DavError> {
            Err(DavError::Message("offline".to_string()))
        }

        async fn get_file_contents(
            &self,
            _path: &str,
        ) -> std::result::Result<DavResponse<FileContent>, DavError> {
            Err(DavError::Message("offline".to_string()))
        }

        async fn put_file_contents(
            &self,
            _path: &str,
            _data: &[u8],
            _overwrite: bool,
        ) -> std::result::Result<(), DavError> {
            Err(DavError::Message("offline".to_string()))
        }

        async fn delete_file(&self, _path: &str) -> std::result::Result<(), DavError> {
            Err(DavError::Message("offline".to_string()))
        }

        async fn move_file(&self, _from: &str, _to: &str) -> std::result::Result<(), DavError> {
            Err(DavError::Message("offline".to_string()))
        }

        async fn copy_file(&self, _from: &str, _to: &str) -> std::result::Result<(), DavError> {
            Err(DavError::Message("offline".to_string()))
        }
    }

    fn config() -> Arc<Config> {
        Arc::new(
            Config::from_str(
                "servers:\n  srv1:\n    host: example.com\n  bad:\n    authtype: bearer\n    host: x\n",
            )
            .unwrap(),
        )
    }

    fn counting_registry() -> (ClientRegistry, Arc<AtomicUsize>) {
        let constructed = Arc::new(AtomicUsize::new(0));
        let count = constructed.clone();
        let registry = ClientRegistry::with_factory(
            config(),
            Box::new(move |server| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(NullClient {
                    base_url: server.base_url.clone(),
                }) as Arc<dyn RemoteClient>)
            }),
        );
        (registry, constructed)
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let (registry, constructed) = counting_registry();

        let a = registry.resolve("srv1").unwrap();
        let b = registry.resolve("srv1").unwrap();

        assert_eq!(constructed.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.base_url(), "https://example.com");
        assert_eq!(b.base_url(), "https://example.com");
    }

    #[test]
    fn test_unknown_identifier_is_config_error() {
        let (registry, constructed) = counting_registry();

        // resolve's Ok type is not Debug, so discard it before unwrapping
        let err = registry.resolve("missing").map(|_| ()).unwrap_err();
        assert!(matches!(err, FsError::Config(_)));
        assert_eq!(constructed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsupported_authtype_is_fatal_at_resolve() {
        let (registry, _) = counting_registry();

        let err = registry.resolve("bad").map(|_| ()).unwrap_err();
        assert!(err.to_string().contains("'bearer' is not supported"));
    }

    #[test]
    fn test_construction_failure_surfaces_as_initialization_error() {
        let registry = ClientRegistry::with_factory(
            config(),
            Box::new(|_| Err(DavError::Message("tls setup failed".to_string()))),
        );

        let err = registry.resolve("srv1").map(|_| ()).unwrap_err();
        match err {
            FsError::Config(msg) => {
                assert!(msg.contains("could not initialize client for 'srv1'"));
                assert!(msg.contains("tls setup failed"));
            }
            other => panic!("expected Config error, got {other:?}"),
        }
    }
}
