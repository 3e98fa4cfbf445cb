//! The seam between connections and request queues.
//!
//! A connection asks its [`Dispatch`] where each parsed request goes. The
//! engine's routing table is the production implementation; tests and
//! embedders can route with a plain function through [`make_dispatch`].

use crate::protocol::{CookedUrl, UrlContext};
use crate::queue::RequestQueue;
use std::net::SocketAddr;

/// Where a request is delivered and the context value it carries.
#[derive(Debug, Clone)]
pub struct Route {
    pub queue: RequestQueue,
    pub context: UrlContext,
}

pub trait Dispatch: Send + Sync {
    /// Resolves the queue for a request on a connection accepted at `local_addr`.
    fn route(&self, url: &CookedUrl, local_addr: SocketAddr) -> Option<Route>;
}

#[derive(Debug)]
pub struct DispatchFn<F> {
    f: F,
}

impl<F> Dispatch for DispatchFn<F>
where
    F: Fn(&CookedUrl, SocketAddr) -> Option<Route> + Send + Sync,
{
    fn route(&self, url: &CookedUrl, local_addr: SocketAddr) -> Option<Route> {
        (self.f)(url, local_addr)
    }
}

pub fn make_dispatch<F>(f: F) -> DispatchFn<F>
where
    F: Fn(&CookedUrl, SocketAddr) -> Option<Route> + Send + Sync,
{
    DispatchFn { f }
}
