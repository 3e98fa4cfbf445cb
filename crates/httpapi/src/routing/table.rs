use crate::ensure;
use crate::handler::{Dispatch, Route};
use crate::protocol::{ApiError, CookedUrl, UrlContext, UrlGroupId, UrlPrefix};
use crate::queue::RequestQueue;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Who a prefix was registered for.
#[derive(Debug, Clone)]
pub(crate) enum Owner {
    /// Registered straight on a queue, context is always zero.
    Queue(RequestQueue),
    /// Registered on a URL group; requests follow the group's queue binding.
    Group(UrlGroupId),
}

impl Owner {
    fn same_as(&self, other: &Owner) -> bool {
        match (self, other) {
            (Owner::Queue(a), Owner::Queue(b)) => a.ptr_eq(b),
            (Owner::Group(a), Owner::Group(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
struct Binding {
    prefix: UrlPrefix,
    owner: Owner,
    context: UrlContext,
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    bindings: Vec<Binding>,
    group_queues: HashMap<UrlGroupId, RequestQueue>,
}

/// Registered prefixes and the queues they deliver to.
///
/// Lookups read an immutable snapshot and never block. Changes copy the
/// snapshot and swap it in while holding the writer lock, so they are
/// serialized against each other only.
#[derive(Debug, Default)]
pub struct RoutingTable {
    snapshot: ArcSwap<Snapshot>,
    writer: Mutex<()>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<T>(&self, f: impl FnOnce(&mut Snapshot) -> Result<T, ApiError>) -> Result<T, ApiError> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = Snapshot::clone(&self.snapshot.load());
        let value = f(&mut next)?;
        self.snapshot.store(Arc::new(next));
        Ok(value)
    }

    pub(crate) fn add(&self, prefix: UrlPrefix, owner: Owner, context: UrlContext) -> Result<(), ApiError> {
        self.update(|snapshot| {
            let taken = snapshot.bindings.iter().any(|b| b.prefix.same_as(&prefix));
            ensure!(!taken, ApiError::already_exists(prefix.as_str()));
            debug!(prefix = %prefix, context, "url prefix registered");
            snapshot.bindings.push(Binding { prefix, owner, context });
            Ok(())
        })
    }

    pub(crate) fn remove(&self, prefix: &UrlPrefix, owner: &Owner) -> Result<(), ApiError> {
        self.update(|snapshot| {
            let position = snapshot.bindings.iter().position(|b| b.prefix.same_as(prefix) && b.owner.same_as(owner));
            let Some(position) = position else {
                return Err(ApiError::not_found(prefix.as_str()));
            };
            snapshot.bindings.remove(position);
            debug!(prefix = %prefix, "url prefix unregistered");
            Ok(())
        })
    }

    /// Drops every binding of `owner` and returns the prefixes that were removed.
    pub(crate) fn remove_owner(&self, owner: &Owner) -> Vec<UrlPrefix> {
        let removed = self.update(|snapshot| {
            let (removed, kept) = snapshot.bindings.drain(..).partition::<Vec<_>, _>(|b| b.owner.same_as(owner));
            snapshot.bindings = kept;
            if let Owner::Group(group) = owner {
                snapshot.group_queues.remove(group);
            }
            Ok(removed.into_iter().map(|b| b.prefix).collect())
        });
        removed.unwrap_or_default()
    }

    pub(crate) fn set_group_queue(&self, group: UrlGroupId, queue: Option<RequestQueue>) {
        let _ = self.update(|snapshot| {
            match queue {
                Some(queue) => snapshot.group_queues.insert(group, queue),
                None => snapshot.group_queues.remove(&group),
            };
            Ok(())
        });
    }

    /// Whether any registration still listens on `port`.
    pub fn uses_port(&self, port: u16) -> bool {
        self.snapshot.load().bindings.iter().any(|b| b.prefix.port() == port)
    }

    /// Longest registered prefix matching the request, resolved to a live queue.
    pub fn lookup(&self, hostname: &str, port: u16, abs_path: &str) -> Option<Route> {
        let snapshot = self.snapshot.load();
        let binding = snapshot
            .bindings
            .iter()
            .filter(|b| b.prefix.matches(hostname, port, abs_path))
            .max_by_key(|b| b.prefix.specificity())?;

        let queue = match &binding.owner {
            Owner::Queue(queue) => queue.clone(),
            Owner::Group(group) => snapshot.group_queues.get(group)?.clone(),
        };
        (!queue.is_closed()).then(|| Route { queue, context: binding.context })
    }
}

impl Dispatch for RoutingTable {
    fn route(&self, url: &CookedUrl, local_addr: SocketAddr) -> Option<Route> {
        self.lookup(url.hostname(), local_addr.port(), url.abs_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ApiVersion;

    fn prefix(url: &str) -> UrlPrefix {
        UrlPrefix::parse(url).unwrap()
    }

    #[test]
    fn duplicate_and_missing_registrations() {
        let table = RoutingTable::new();
        let queue = RequestQueue::new(ApiVersion::V1);
        let owner = Owner::Queue(queue);

        table.add(prefix("http://localhost:50000/"), owner.clone(), 0).unwrap();
        assert!(matches!(
            table.add(prefix("http://LOCALHOST:50000/"), owner.clone(), 0),
            Err(ApiError::AlreadyExists { .. })
        ));

        table.remove(&prefix("http://localhost:50000/"), &owner).unwrap();
        assert!(matches!(table.remove(&prefix("http://localhost:50000/"), &owner), Err(ApiError::NotFound { .. })));
        assert!(!table.uses_port(50000));
    }

    #[test]
    fn longest_prefix_wins() {
        let table = RoutingTable::new();
        let root = RequestQueue::new(ApiVersion::V1);
        let app = RequestQueue::new(ApiVersion::V1);
        table.add(prefix("http://localhost:50000/"), Owner::Queue(root.clone()), 1).unwrap();
        table.add(prefix("http://localhost:50000/app/"), Owner::Queue(app.clone()), 2).unwrap();

        let route = table.lookup("localhost", 50000, "/app/index.html").unwrap();
        assert!(route.queue.ptr_eq(&app));
        assert_eq!(route.context, 2);

        let route = table.lookup("localhost", 50000, "/app").unwrap();
        assert!(route.queue.ptr_eq(&app));

        let route = table.lookup("localhost", 50000, "/other").unwrap();
        assert!(route.queue.ptr_eq(&root));

        assert!(table.lookup("localhost", 50001, "/").is_none());
        assert!(table.lookup("example.com", 50000, "/").is_none());
    }

    #[test]
    fn group_bindings_follow_queue_property() {
        let table = RoutingTable::new();
        let group = UrlGroupId::next();
        let queue = RequestQueue::new(ApiVersion::V2);
        table.add(prefix("http://localhost:50002/"), Owner::Group(group), 0xdead_beef).unwrap();

        assert!(table.lookup("localhost", 50002, "/").is_none());

        table.set_group_queue(group, Some(queue.clone()));
        let route = table.lookup("localhost", 50002, "/foobar").unwrap();
        assert_eq!(route.context, 0xdead_beef);

        queue.close().unwrap();
        assert!(table.lookup("localhost", 50002, "/foobar").is_none());

        let removed = table.remove_owner(&Owner::Group(group));
        assert_eq!(removed.len(), 1);
        assert!(!table.uses_port(50002));
    }
}
