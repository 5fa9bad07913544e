use std::fmt;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{CloseReason, ParseError};
use crate::http::parser::{ParserLimits, RequestParser};
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::http::writer::{ResponseWriter, WriteContext, serialize};
use crate::server::dispatcher::{Dispatcher, Handler};

const READ_CHUNK: usize = 8192;

/// Identifies a connection in logs and in the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-connection settings.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub limits: ParserLimits,
    pub idle_timeout: Duration,
}

pub enum ConnectionState {
    ReadingRequest,
    Dispatching(Request),
    WritingResponse {
        writer: ResponseWriter,
        /// Where to go once the bytes are out.
        then: Box<ConnectionState>,
    },
    Closing(CloseReason),
    Closed,
}

/// One client connection.
///
/// Owns its transport exclusively and serves requests strictly in arrival
/// order: a pipelined request is parsed only after the previous response has
/// been written.
pub struct Connection<T, H> {
    id: ConnectionId,
    stream: T,
    parser: RequestParser,
    dispatcher: Dispatcher<H>,
    settings: ConnectionSettings,
    shutdown: watch::Receiver<bool>,
    state: ConnectionState,
    last_activity: Instant,
    keep_alive: bool,
    served: u64,
}

impl<T, H> Connection<T, H>
where
    T: AsyncRead + AsyncWrite + Unpin,
    H: Handler,
{
    pub fn new(
        id: ConnectionId,
        stream: T,
        dispatcher: Dispatcher<H>,
        settings: ConnectionSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            stream,
            parser: RequestParser::new(settings.limits),
            dispatcher,
            settings,
            shutdown,
            state: ConnectionState::ReadingRequest,
            last_activity: Instant::now(),
            keep_alive: true,
            served: 0,
        }
    }

    /// Drives the connection until it is closed.
    pub async fn run(mut self) -> CloseReason {
        loop {
            let state = std::mem::replace(&mut self.state, ConnectionState::Closed);

            self.state = match state {
                ConnectionState::ReadingRequest => self.read_request().await,

                ConnectionState::Dispatching(request) => self.dispatch(request).await,

                ConnectionState::WritingResponse { mut writer, then } => {
                    match writer.write_to_stream(&mut self.stream).await {
                        Ok(()) => {
                            self.last_activity = Instant::now();
                            *then
                        }
                        Err(e) => {
                            // Write side is broken, nothing left to flush.
                            let reason = CloseReason::Transport(e.0.kind());
                            debug!(conn = %self.id, error = %e, "Write failed");
                            return self.closed(reason);
                        }
                    }
                }

                ConnectionState::Closing(reason) => {
                    let _ = self.stream.flush().await;
                    let _ = self.stream.shutdown().await;
                    return self.closed(reason);
                }

                ConnectionState::Closed => return self.closed(CloseReason::PeerClosed),
            };
        }
    }

    fn closed(&mut self, reason: CloseReason) -> CloseReason {
        self.state = ConnectionState::Closed;
        debug!(
            conn = %self.id,
            served = self.served,
            reason = %reason,
            "Connection closed"
        );
        reason
    }

    fn shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn read_request(&mut self) -> ConnectionState {
        let mut temp = [0u8; READ_CHUNK];

        loop {
            // Try parsing whatever we already have
            match self.parser.next_request() {
                Ok(Some(request)) => return ConnectionState::Dispatching(request),
                Ok(None) => {}
                Err(e) => return self.reject(e),
            }

            if self.shutting_down() && self.parser.is_idle() {
                return ConnectionState::Closing(CloseReason::Shutdown);
            }

            let idle = self.parser.is_idle();
            let read = tokio::select! {
                res = timeout(self.settings.idle_timeout, self.stream.read(&mut temp)) => res,
                _ = wait_for_shutdown(&mut self.shutdown), if idle => {
                    return ConnectionState::Closing(CloseReason::Shutdown);
                }
            };

            match read {
                Err(_elapsed) => {
                    debug!(
                        conn = %self.id,
                        buffered = self.parser.buffered(),
                        idle_for = ?self.last_activity.elapsed(),
                        "Idle timeout"
                    );
                    if self.parser.is_idle() {
                        return ConnectionState::Closing(CloseReason::IdleTimeout);
                    }
                    return self.respond_and_close(
                        Response::error(StatusCode::REQUEST_TIMEOUT),
                        CloseReason::IdleTimeout,
                    );
                }
                Ok(Err(e)) => {
                    debug!(conn = %self.id, error = %e, "Read failed");
                    return ConnectionState::Closing(CloseReason::Transport(e.kind()));
                }
                Ok(Ok(0)) => {
                    // Client closed connection
                    return match self.parser.finish() {
                        Ok(()) => ConnectionState::Closing(CloseReason::PeerClosed),
                        Err(e) => self.reject(e),
                    };
                }
                Ok(Ok(n)) => {
                    self.last_activity = Instant::now();
                    self.parser.push(&temp[..n]);
                }
            }
        }
    }

    /// Answers malformed input with an error response and closes.
    fn reject(&mut self, e: ParseError) -> ConnectionState {
        warn!(
            conn = %self.id,
            error = %e,
            status = e.status().as_u16(),
            "Rejecting request"
        );
        self.respond_and_close(Response::error(e.status()), CloseReason::Parse(e))
    }

    fn respond_and_close(&mut self, response: Response, reason: CloseReason) -> ConnectionState {
        self.keep_alive = false;
        let serialized = serialize(&response, &WriteContext::closing());
        ConnectionState::WritingResponse {
            writer: ResponseWriter::new(serialized),
            then: Box::new(ConnectionState::Closing(reason)),
        }
    }

    async fn dispatch(&mut self, request: Request) -> ConnectionState {
        let wants_keep_alive = request.keep_alive();
        let mut ctx = WriteContext::for_request(&request, false);

        let dispatched = self.dispatcher.dispatch(request).await;
        let response = dispatched.response;

        self.keep_alive = wants_keep_alive
            && !dispatched.timed_out
            && !response.headers.has_token("Connection", "close")
            && !self.shutting_down();
        ctx.keep_alive = self.keep_alive;

        let serialized = serialize(&response, &ctx);
        if serialized.body_dropped {
            warn!(
                conn = %self.id,
                status = response.status.as_u16(),
                body_len = response.body.len(),
                "Response body dropped: not allowed for this status or method"
            );
        }
        self.served += 1;

        let then = if self.keep_alive {
            ConnectionState::ReadingRequest
        } else if dispatched.timed_out {
            ConnectionState::Closing(CloseReason::HandlerTimeout)
        } else if self.shutting_down() {
            ConnectionState::Closing(CloseReason::Shutdown)
        } else {
            ConnectionState::Closing(CloseReason::NotPersistent)
        };

        ConnectionState::WritingResponse {
            writer: ResponseWriter::new(serialized),
            then: Box::new(then),
        }
    }
}

/// Resolves once shutdown has been signalled. Never resolves if the sender
/// is gone without signalling.
pub(crate) async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
