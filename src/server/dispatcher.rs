//! Hands parsed requests to the application handler.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error};

use crate::error::HandlerError;
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};

/// Application code that turns a request into a response.
///
/// Implemented for any `Fn(Request) -> impl Future<Output = anyhow::Result<Response>>`.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: Request) -> impl Future<Output = anyhow::Result<Response>> + Send;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
{
    fn handle(&self, request: Request) -> impl Future<Output = anyhow::Result<Response>> + Send {
        (self)(request)
    }
}

/// Result of dispatching one request.
#[derive(Debug)]
pub struct Dispatched {
    pub response: Response,
    /// The handler overran its budget; the connection must close.
    pub timed_out: bool,
}

/// Runs the handler under a time budget and converts failures into responses.
pub struct Dispatcher<H> {
    handler: Arc<H>,
    handler_timeout: Duration,
}

impl<H> Clone for Dispatcher<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            handler_timeout: self.handler_timeout,
        }
    }
}

impl<H: Handler> Dispatcher<H> {
    pub fn new(handler: H, handler_timeout: Duration) -> Self {
        Self {
            handler: Arc::new(handler),
            handler_timeout,
        }
    }

    /// Invokes the handler for `request`.
    ///
    /// The handler runs on its own task so a panic is contained. Failure,
    /// panic and timeout all become a bare 500; the detail is only logged.
    pub async fn dispatch(&self, request: Request) -> Dispatched {
        let method = request.method.clone();
        let target = request.target.clone();

        debug!(method = %method, target = %target, "Dispatching request");

        let handler = Arc::clone(&self.handler);
        let mut task = AbortOnDrop(tokio::spawn(async move { handler.handle(request).await }));

        let result = match timeout(self.handler_timeout, &mut task.0).await {
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(e))) => Err(HandlerError::Failed(e)),
            Ok(Err(_join)) => Err(HandlerError::Panicked),
            Err(_elapsed) => Err(HandlerError::TimedOut(self.handler_timeout)),
        };

        match result {
            Ok(response) => Dispatched {
                response,
                timed_out: false,
            },
            Err(e) => {
                error!(
                    method = %method,
                    target = %target,
                    error = %e,
                    "Handler failed"
                );
                Dispatched {
                    response: Response::error(StatusCode::INTERNAL_SERVER_ERROR),
                    timed_out: matches!(e, HandlerError::TimedOut(_)),
                }
            }
        }
    }
}

/// Aborts the handler task when dispatch ends early, on timeout or when the
/// owning connection is itself aborted.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
