//! Interceptor chains.
//!
//! Each chain keeps its interceptors keyed by a monotonically increasing id,
//! so iteration order is installation order and ejecting is O(1).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::error::ClientError;
use super::request::{HttpRequest, HttpResponse};

pub type InterceptorId = u64;

#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    fn name(&self) -> &str {
        "request"
    }

    async fn intercept(&self, request: HttpRequest) -> Result<HttpRequest, ClientError>;
}

#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    fn name(&self) -> &str {
        "response"
    }

    async fn intercept(&self, response: HttpResponse) -> Result<HttpResponse, ClientError>;
}

/// Result of an error interceptor: either a recovered response, which ends
/// the chain, or an error handed to the next interceptor.
#[derive(Debug)]
pub enum ErrorOutcome {
    Recover(HttpResponse),
    Propagate(ClientError),
}

#[async_trait]
pub trait ErrorInterceptor: Send + Sync {
    fn name(&self) -> &str {
        "error"
    }

    async fn intercept(&self, request: &HttpRequest, error: ClientError) -> ErrorOutcome;
}

pub struct InterceptorManager<T: ?Sized> {
    next_id: AtomicU64,
    entries: DashMap<InterceptorId, Arc<T>>,
}

impl<T: ?Sized> Default for InterceptorManager<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: DashMap::new(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for InterceptorManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorManager")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl<T: ?Sized> InterceptorManager<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_interceptor(&self, interceptor: Arc<T>) -> InterceptorId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(id, interceptor);
        id
    }

    /// Removes an interceptor; unknown ids return false.
    pub fn eject(&self, id: InterceptorId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Interceptors in installation order.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        let mut entries: Vec<(InterceptorId, Arc<T>)> = self
            .entries
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries.into_iter().map(|(_, i)| i).collect()
    }
}

/// The three chains of one client.
#[derive(Debug, Default)]
pub struct Interceptors {
    pub request: InterceptorManager<dyn RequestInterceptor>,
    pub response: InterceptorManager<dyn ResponseInterceptor>,
    pub error: InterceptorManager<dyn ErrorInterceptor>,
}

impl Interceptors {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Which chain an installed interceptor lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterceptorKind {
    Request,
    Response,
    Error,
}

/// Handle identifying one installed interceptor, used to eject it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterceptorHandle {
    pub kind: InterceptorKind,
    pub id: InterceptorId,
}

impl Interceptors {
    pub fn install_request(&self, interceptor: Arc<dyn RequestInterceptor>) -> InterceptorHandle {
        InterceptorHandle {
            kind: InterceptorKind::Request,
            id: self.request.use_interceptor(interceptor),
        }
    }

    pub fn install_response(&self, interceptor: Arc<dyn ResponseInterceptor>) -> InterceptorHandle {
        InterceptorHandle {
            kind: InterceptorKind::Response,
            id: self.response.use_interceptor(interceptor),
        }
    }

    pub fn install_error(&self, interceptor: Arc<dyn ErrorInterceptor>) -> InterceptorHandle {
        InterceptorHandle {
            kind: InterceptorKind::Error,
            id: self.error.use_interceptor(interceptor),
        }
    }

    pub fn eject(&self, handle: InterceptorHandle) -> bool {
        match handle.kind {
            InterceptorKind::Request => self.request.eject(handle.id),
            InterceptorKind::Response => self.response.eject(handle.id),
            InterceptorKind::Error => self.error.eject(handle.id),
        }
    }
}
