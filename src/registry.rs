//! The mapping from (method, path) to handler functions.

use crate::http::method::Method;
use crate::http::request::Request;
use crate::http::response::Response;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// A request handler. Implemented for any `Fn(Request) -> Response`, so
/// closures and free functions register directly.
///
/// Handlers must not retain the socket in any form; they see only the
/// parsed [`Request`] and give back a [`Response`].
pub trait Handler: Send + Sync {
    fn handle(&self, request: Request) -> Response;
}

impl<F> Handler for F
where
    F: Fn(Request) -> Response + Send + Sync,
{
    fn handle(&self, request: Request) -> Response {
        self(request)
    }
}

/// The registry key: method plus lowercased path with no leading slash.
///
/// Two registrations differing only in path case collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VerbPath {
    method: Method,
    path: String,
}

impl VerbPath {
    #[must_use]
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.trim_start_matches('/').to_lowercase(),
        }
    }
}

/// Registered dynamic endpoints.
///
/// Writes happen at startup, before the accept loop exists; at runtime
/// all dispatchers share it behind a read lock.
#[derive(Default)]
pub struct HandlerRegistry {
    registered_paths: HashMap<VerbPath, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a method and path. The path is stored
    /// lowercased without its leading slash, so `register(Get, "MyPage")`
    /// and a request for `/mypage` meet. Re-registering a key replaces
    /// the previous handler.
    pub fn register(&mut self, method: Method, path: &str, handler: impl Handler + 'static) {
        let key = VerbPath::new(method, path);
        if self.registered_paths.remove(&key).is_some() {
            warn!(
                method = %method,
                path = %path,
                "replaced an existing handler registration"
            );
        }
        info!(
            method = %method,
            path = %path,
            total_registered = self.registered_paths.len() + 1,
            "handler registered"
        );
        self.registered_paths.insert(key, Arc::new(handler));
    }

    /// Look up the handler for a method and already-lowercased path.
    #[must_use]
    pub fn find(&self, method: Method, path: &str) -> Option<Arc<dyn Handler>> {
        self.registered_paths
            .get(&VerbPath::new(method, path))
            .cloned()
    }

    /// Whether any method has a registration for this path. Backs the
    /// 404-versus-405 distinction in the dispatcher.
    #[must_use]
    pub fn any_method_matches(&self, path: &str) -> bool {
        let normalized = path.trim_start_matches('/').to_lowercase();
        self.registered_paths
            .keys()
            .any(|vp| vp.path == normalized)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registered_paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registered_paths.is_empty()
    }
}
