//! The engine instance: version negotiation, queue creation and the
//! registration surface (legacy queue-bound URLs, server sessions and URL
//! groups).
//!
//! ```no_run
//! use micro_httpapi::engine::Engine;
//! use micro_httpapi::protocol::{ApiVersion, ReceiveFlags, RequestId, RequestView, SendFlags, HttpResponse};
//!
//! # async fn run() -> Result<(), micro_httpapi::protocol::ApiError> {
//! let engine = Engine::new(ApiVersion::V2)?;
//! let session = engine.create_server_session(ApiVersion::V2)?;
//! let group = engine.create_url_group(session)?;
//! let queue = engine.create_request_queue(ApiVersion::V2)?;
//! engine.set_url_group_queue(group, Some(&queue))?;
//! engine.add_url_to_url_group(group, "http://localhost:50000/", 0xdead_beef).await?;
//!
//! let mut buf = vec![0u8; 4096];
//! let n = queue.receive_request(RequestId::NULL, ReceiveFlags::NONE, &mut buf).await?;
//! let request = RequestView::new(&buf[..n])?;
//! queue.send_response(request.request_id(), SendFlags::NONE, HttpResponse::new(204)).await?;
//! # Ok(())
//! # }
//! ```

mod config;

pub use config::EngineConfig;
pub use config::EngineConfigBuilder;

use crate::ensure;
use crate::listener::Listeners;
use crate::protocol::{ApiError, ApiVersion, ServerSessionId, UrlContext, UrlGroupId, UrlPrefix};
use crate::queue::RequestQueue;
use crate::routing::{Owner, RoutingTable};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// One running instance of the request multiplexer.
///
/// Owns the routing table and the listening sockets. Queues created by the
/// engine outlive neither [`Engine::shutdown`] nor their own
/// [`RequestQueue::close`].
#[derive(Debug)]
pub struct Engine {
    version: ApiVersion,
    config: Arc<EngineConfig>,
    routing: Arc<RoutingTable>,
    listeners: Listeners,
    registry: Mutex<Registry>,
}

#[derive(Debug, Default)]
struct Registry {
    shut_down: bool,
    queues: Vec<RequestQueue>,
    sessions: HashMap<ServerSessionId, Vec<UrlGroupId>>,
    /// Every open group and the session that owns it.
    groups: HashMap<UrlGroupId, ServerSessionId>,
}

fn negotiate(version: ApiVersion) -> Result<(), ApiError> {
    ensure!(version.is_supported(), ApiError::RevisionMismatch { major: version.major, minor: version.minor });
    Ok(())
}

impl Engine {
    pub fn new(version: ApiVersion) -> Result<Self, ApiError> {
        Self::with_config(version, EngineConfig::default())
    }

    pub fn with_config(version: ApiVersion, config: EngineConfig) -> Result<Self, ApiError> {
        negotiate(version)?;
        info!(%version, "engine started");
        Ok(Self {
            version,
            config: Arc::new(config),
            routing: Arc::new(RoutingTable::new()),
            listeners: Listeners::default(),
            registry: Mutex::new(Registry::default()),
        })
    }

    pub fn version(&self) -> ApiVersion {
        self.version
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The table connections route through, usable as a [`crate::handler::Dispatch`].
    pub fn routing_table(&self) -> Arc<RoutingTable> {
        Arc::clone(&self.routing)
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_queue(&self, version: ApiVersion) -> Result<RequestQueue, ApiError> {
        let mut registry = self.registry();
        ensure!(!registry.shut_down, ApiError::InvalidHandle);
        let queue = RequestQueue::new(version);
        registry.queues.retain(|q| !q.is_closed());
        registry.queues.push(queue.clone());
        Ok(queue)
    }

    /// Legacy queue for [`Engine::add_url`] registrations.
    pub fn create_http_handle(&self) -> Result<RequestQueue, ApiError> {
        self.new_queue(ApiVersion::V1)
    }

    pub fn create_request_queue(&self, version: ApiVersion) -> Result<RequestQueue, ApiError> {
        negotiate(version)?;
        self.new_queue(version)
    }

    /// Registers `url` directly on `queue`. Requests routed through it carry context zero.
    pub async fn add_url(&self, queue: &RequestQueue, url: &str) -> Result<(), ApiError> {
        ensure!(!queue.is_closed(), ApiError::InvalidHandle);
        self.register(url, Owner::Queue(queue.clone()), 0).await
    }

    pub async fn remove_url(&self, queue: &RequestQueue, url: &str) -> Result<(), ApiError> {
        ensure!(!queue.is_closed(), ApiError::InvalidHandle);
        self.unregister(url, &Owner::Queue(queue.clone())).await
    }

    pub fn create_server_session(&self, version: ApiVersion) -> Result<ServerSessionId, ApiError> {
        negotiate(version)?;
        let mut registry = self.registry();
        ensure!(!registry.shut_down, ApiError::InvalidHandle);
        let session = ServerSessionId::next();
        registry.sessions.insert(session, Vec::new());
        debug!(%session, %version, "server session created");
        Ok(session)
    }

    /// Closes the session together with all of its URL groups.
    pub async fn close_server_session(&self, session: ServerSessionId) -> Result<(), ApiError> {
        let groups = {
            let mut registry = self.registry();
            let Some(groups) = registry.sessions.remove(&session) else {
                return Err(ApiError::invalid_argument(format!("unknown server session {session}")));
            };
            for group in &groups {
                registry.groups.remove(group);
            }
            groups
        };

        debug!(%session, groups = groups.len(), "server session closed");
        for group in groups {
            self.drop_group_bindings(group).await;
        }
        Ok(())
    }

    pub fn create_url_group(&self, session: ServerSessionId) -> Result<UrlGroupId, ApiError> {
        let mut registry = self.registry();
        let Some(groups) = registry.sessions.get_mut(&session) else {
            return Err(ApiError::invalid_argument(format!("unknown server session {session}")));
        };
        let group = UrlGroupId::next();
        groups.push(group);
        registry.groups.insert(group, session);
        debug!(%session, %group, "url group created");
        Ok(group)
    }

    /// Fails with [`ApiError::InvalidArgument`] when the group, or the session
    /// owning it, is already closed.
    pub async fn close_url_group(&self, group: UrlGroupId) -> Result<(), ApiError> {
        {
            let mut registry = self.registry();
            let Some(session) = registry.groups.remove(&group) else {
                return Err(ApiError::invalid_argument(format!("unknown url group {group}")));
            };
            if let Some(groups) = registry.sessions.get_mut(&session) {
                groups.retain(|g| *g != group);
            }
        }

        debug!(%group, "url group closed");
        self.drop_group_bindings(group).await;
        Ok(())
    }

    /// Binds the group's URLs to `queue`, or unbinds them with `None`.
    pub fn set_url_group_queue(&self, group: UrlGroupId, queue: Option<&RequestQueue>) -> Result<(), ApiError> {
        self.ensure_group(group)?;
        if let Some(queue) = queue {
            ensure!(!queue.is_closed(), ApiError::InvalidHandle);
        }
        self.routing.set_group_queue(group, queue.cloned());
        Ok(())
    }

    pub async fn add_url_to_url_group(&self, group: UrlGroupId, url: &str, context: UrlContext) -> Result<(), ApiError> {
        self.ensure_group(group)?;
        self.register(url, Owner::Group(group), context).await
    }

    pub async fn remove_url_from_url_group(&self, group: UrlGroupId, url: &str) -> Result<(), ApiError> {
        self.ensure_group(group)?;
        self.unregister(url, &Owner::Group(group)).await
    }

    /// Closes every queue the engine created and stops all listeners.
    pub async fn shutdown(&self) {
        let (queues, groups) = {
            let mut registry = self.registry();
            registry.shut_down = true;
            registry.sessions.clear();
            let groups: Vec<UrlGroupId> = registry.groups.drain().map(|(group, _)| group).collect();
            (std::mem::take(&mut registry.queues), groups)
        };

        for queue in &queues {
            let _ = queue.close();
            self.routing.remove_owner(&Owner::Queue(queue.clone()));
        }
        for group in groups {
            self.routing.remove_owner(&Owner::Group(group));
        }
        self.listeners.release_all().await;
        info!(queues = queues.len(), "engine shut down");
    }

    fn ensure_group(&self, group: UrlGroupId) -> Result<(), ApiError> {
        ensure!(
            self.registry().groups.contains_key(&group),
            ApiError::invalid_argument(format!("unknown url group {group}"))
        );
        Ok(())
    }

    async fn register(&self, url: &str, owner: Owner, context: UrlContext) -> Result<(), ApiError> {
        let prefix = UrlPrefix::parse(url)?;
        self.routing.add(prefix.clone(), owner.clone(), context)?;

        if let Err(e) = self.listeners.listen(&prefix, &self.routing, &self.config).await {
            let _ = self.routing.remove(&prefix, &owner);
            self.release_unused(prefix.port()).await;
            return Err(e);
        }
        Ok(())
    }

    async fn unregister(&self, url: &str, owner: &Owner) -> Result<(), ApiError> {
        let prefix = UrlPrefix::parse(url)?;
        self.routing.remove(&prefix, owner)?;
        self.release_unused(prefix.port()).await;
        Ok(())
    }

    async fn drop_group_bindings(&self, group: UrlGroupId) {
        for prefix in self.routing.remove_owner(&Owner::Group(group)) {
            self.release_unused(prefix.port()).await;
        }
    }

    async fn release_unused(&self, port: u16) {
        self.listeners.release_unused(port, &self.routing).await;
    }
}
