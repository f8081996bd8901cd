//! Interceptor hooks applied around every call.
//!
//! Request interceptors transform the outgoing [`ApiRequest`]; response
//! interceptors observe (and may rewrite) the [`ApiResponse`]. Both run in
//! registration order, strictly one after another, with the output of one
//! feeding the next. The registry lock is never held while a hook runs, so a
//! hook may register or remove other hooks.

pub mod builtin;

use crate::types::{ApiRequest, ApiResponse};
use crate::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

pub use builtin::{BreadcrumbLogger, ClientId, CorrelationId, RequestSigner};

pub trait RequestInterceptor: Send + Sync {
    fn on_request(&self, req: ApiRequest) -> ApiRequest;
}

pub trait ResponseInterceptor: Send + Sync {
    fn on_response(&self, resp: ApiResponse, req: &ApiRequest) -> ApiResponse;

    fn on_error(&self, _err: &Error, _req: &ApiRequest) {}
}

impl<F> RequestInterceptor for F
where
    F: Fn(ApiRequest) -> ApiRequest + Send + Sync,
{
    fn on_request(&self, req: ApiRequest) -> ApiRequest {
        self(req)
    }
}

impl<F> ResponseInterceptor for F
where
    F: Fn(ApiResponse, &ApiRequest) -> ApiResponse + Send + Sync,
{
    fn on_response(&self, resp: ApiResponse, req: &ApiRequest) -> ApiResponse {
        self(resp, req)
    }
}

struct Registered<T: ?Sized> {
    id: u64,
    hook: Arc<T>,
}

type Chain<T> = Arc<RwLock<Vec<Registered<T>>>>;

/// Removes one registration. Calling [`InterceptorHandle::remove`] more than once is a no-op.
///
/// Dropping the handle keeps the interceptor registered.
pub struct InterceptorHandle {
    unsubscribe: Box<dyn Fn() -> bool + Send + Sync>,
}

impl InterceptorHandle {
    fn new<T: ?Sized + Send + Sync + 'static>(chain: Weak<RwLock<Vec<Registered<T>>>>, id: u64) -> Self {
        Self {
            unsubscribe: Box::new(move || {
                let Some(chain) = chain.upgrade() else {
                    return false;
                };
                let mut list = chain.write().unwrap_or_else(|p| p.into_inner());
                let before = list.len();
                list.retain(|r| r.id != id);
                list.len() != before
            }),
        }
    }

    /// Returns `true` if this call removed the interceptor.
    pub fn remove(&self) -> bool {
        (self.unsubscribe)()
    }
}

/// Ordered, mutable list of request and response hooks.
pub struct InterceptorPipeline {
    request: Chain<dyn RequestInterceptor>,
    response: Chain<dyn ResponseInterceptor>,
    next_id: AtomicU64,
}

impl InterceptorPipeline {
    pub fn new() -> Self {
        Self {
            request: Arc::new(RwLock::new(Vec::new())),
            response: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn add_request<I: RequestInterceptor + 'static>(&self, interceptor: I) -> InterceptorHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.request
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(Registered {
                id,
                hook: Arc::new(interceptor),
            });
        InterceptorHandle::new(Arc::downgrade(&self.request), id)
    }

    pub fn add_response<I: ResponseInterceptor + 'static>(&self, interceptor: I) -> InterceptorHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.response
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(Registered {
                id,
                hook: Arc::new(interceptor),
            });
        InterceptorHandle::new(Arc::downgrade(&self.response), id)
    }

    fn snapshot<T: ?Sized>(chain: &Chain<T>) -> Vec<Arc<T>> {
        chain
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|r| Arc::clone(&r.hook))
            .collect()
    }

    pub fn run_request(&self, req: ApiRequest) -> ApiRequest {
        Self::snapshot(&self.request)
            .into_iter()
            .fold(req, |req, hook| hook.on_request(req))
    }

    pub fn run_response(&self, resp: ApiResponse, req: &ApiRequest) -> ApiResponse {
        Self::snapshot(&self.response)
            .into_iter()
            .fold(resp, |resp, hook| hook.on_response(resp, req))
    }

    pub fn run_error(&self, err: &Error, req: &ApiRequest) {
        for hook in Self::snapshot(&self.response) {
            hook.on_error(err, req);
        }
    }

    pub fn request_len(&self) -> usize {
        self.request.read().map(|l| l.len()).unwrap_or(0)
    }

    pub fn response_len(&self) -> usize {
        self.response.read().map(|l| l.len()).unwrap_or(0)
    }
}

impl Default for InterceptorPipeline {
    fn default() -> Self {
        Self::new()
    }
}
