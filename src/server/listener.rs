use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::BindError;
use crate::http::connection::wait_for_shutdown;
use crate::server::dispatcher::Handler;
use crate::server::manager::ConnectionManager;

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// The bound server socket and its accept loop.
///
/// Accepted streams go straight to the [`ConnectionManager`]; the loop never
/// waits on per-connection work.
pub struct Listener {
    local_addr: SocketAddr,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Listener {
    /// Binds `addr` with `SO_REUSEADDR`, listens with `backlog` and starts
    /// accepting.
    pub async fn start<H: Handler>(
        addr: &str,
        backlog: u32,
        manager: ConnectionManager<H>,
    ) -> Result<Self, BindError> {
        let listener = bind(addr, backlog).await.map_err(|source| BindError {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| BindError {
            addr: addr.to_string(),
            source,
        })?;
        info!("Listening on {}", local_addr);

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(listener, manager, stop_rx));

        Ok(Self {
            local_addr,
            stop_tx,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting and closes the socket. Live connections are untouched.
    pub async fn stop(self) {
        self.stop_tx.send_replace(true);
        let _ = self.task.await;
        info!("Stopped listening on {}", self.local_addr);
    }
}

async fn bind(addr: &str, backlog: u32) -> std::io::Result<TcpListener> {
    let addr = tokio::net::lookup_host(addr).await?.next().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "address did not resolve")
    })?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

async fn accept_loop<H: Handler>(
    listener: TcpListener,
    manager: ConnectionManager<H>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            _ = wait_for_shutdown(&mut stop_rx) => break,

            res = listener.accept() => match res {
                Ok((socket, peer)) => {
                    let _ = socket.set_nodelay(true);
                    manager.spawn(socket, peer).await;
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }
}
