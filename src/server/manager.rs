//! Supervision of live connections.
//!
//! The live set is the only state shared across connections. It is guarded
//! by a mutex: entries are added on accept, removed when a connection task
//! ends, and read by the shutdown drain.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, Notify, Semaphore, watch};
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::CloseReason;
use crate::http::connection::{Connection, ConnectionId, ConnectionSettings};
use crate::http::response::{Response, StatusCode};
use crate::http::writer::{WriteContext, serialize};
use crate::server::dispatcher::{Dispatcher, Handler};

/// How long a rejected connection gets to receive its 503.
const REJECT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// A connection currently being served.
#[derive(Debug)]
pub struct LiveConnection {
    pub peer: SocketAddr,
    pub opened: Instant,
    abort: AbortHandle,
}

/// Outcome of [`ConnectionManager::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Connections that ended on their own within the grace period.
    pub drained: usize,
    /// Connections aborted when the grace period ran out.
    pub forced: usize,
}

struct Inner<H> {
    dispatcher: Dispatcher<H>,
    settings: ConnectionSettings,
    live: Mutex<HashMap<ConnectionId, LiveConnection>>,
    permits: Arc<Semaphore>,
    next_id: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    emptied: Notify,
}

/// Spawns one task per connection and tracks it until it closes.
pub struct ConnectionManager<H> {
    inner: Arc<Inner<H>>,
}

impl<H> Clone for ConnectionManager<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: Handler> ConnectionManager<H> {
    pub fn new(dispatcher: Dispatcher<H>, settings: ConnectionSettings, max_connections: usize) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                dispatcher,
                settings,
                live: Mutex::new(HashMap::new()),
                permits: Arc::new(Semaphore::new(max_connections)),
                next_id: AtomicU64::new(1),
                shutdown_tx,
                emptied: Notify::new(),
            }),
        }
    }

    /// Number of connections currently being served.
    pub async fn live_count(&self) -> usize {
        self.inner.live.lock().await.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown_tx.borrow()
    }

    /// Takes ownership of an accepted transport and serves it on a new task.
    ///
    /// Over the connection limit, or once shutdown has begun, the peer gets a
    /// 503 and the transport is closed instead.
    pub async fn spawn<T>(&self, stream: T, peer: SocketAddr) -> Option<ConnectionId>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let permit = match Arc::clone(&self.inner.permits).try_acquire_owned() {
            Ok(permit) if !self.is_shutting_down() => permit,
            _ => {
                warn!(peer = %peer, "Connection rejected: server at capacity or shutting down");
                tokio::spawn(reject(stream));
                return None;
            }
        };

        let id = ConnectionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        info!(conn = %id, peer = %peer, "Accepted connection");

        let conn = Connection::new(
            id,
            stream,
            self.inner.dispatcher.clone(),
            self.inner.settings,
            self.inner.shutdown_tx.subscribe(),
        );

        // Held across the spawn so the task cannot deregister before it is
        // registered.
        let mut live = self.inner.live.lock().await;
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let opened = Instant::now();
            let reason = conn.run().await;
            drop(permit);
            info!(
                conn = %id,
                peer = %peer,
                reason = %reason,
                duration = ?opened.elapsed(),
                "Connection finished"
            );
            inner.deregister(id).await;
            reason
        });
        live.insert(
            id,
            LiveConnection {
                peer,
                opened: Instant::now(),
                abort: task.abort_handle(),
            },
        );

        Some(id)
    }

    /// Stops admitting connections, lets in-flight requests finish for up to
    /// `grace`, then aborts whatever is left.
    ///
    /// Idle connections close as soon as they see the signal; busy ones
    /// answer their current request with `Connection: close`.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        self.inner.shutdown_tx.send_replace(true);

        let initial = self.live_count().await;
        info!(live = initial, grace = ?grace, "Draining connections");

        if timeout(grace, self.wait_empty()).await.is_ok() {
            return ShutdownReport {
                drained: initial,
                forced: 0,
            };
        }

        let mut live = self.inner.live.lock().await;
        let forced = live.len();
        for (id, conn) in live.drain() {
            warn!(
                conn = %id,
                peer = %conn.peer,
                open_for = ?conn.opened.elapsed(),
                reason = %CloseReason::ForceClosed,
                "Aborting connection"
            );
            conn.abort.abort();
        }
        drop(live);
        self.inner.emptied.notify_waiters();

        ShutdownReport {
            drained: initial.saturating_sub(forced),
            forced,
        }
    }

    async fn wait_empty(&self) {
        loop {
            let emptied = self.inner.emptied.notified();
            if self.inner.live.lock().await.is_empty() {
                return;
            }
            emptied.await;
        }
    }
}

impl<H> Inner<H> {
    async fn deregister(&self, id: ConnectionId) {
        let mut live = self.live.lock().await;
        live.remove(&id);
        if live.is_empty() {
            self.emptied.notify_waiters();
        }
    }
}

async fn reject<T>(mut stream: T) -> CloseReason
where
    T: AsyncWrite + Unpin,
{
    let response = Response::error(StatusCode::SERVICE_UNAVAILABLE);
    let serialized = serialize(&response, &WriteContext::closing());
    let _ = timeout(REJECT_WRITE_TIMEOUT, async {
        stream.write_all(&serialized.bytes).await?;
        stream.shutdown().await
    })
    .await;
    CloseReason::Rejected
}
