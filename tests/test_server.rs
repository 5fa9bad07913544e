//! End-to-end tests over loopback TCP.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use webserv::config::Config;
use webserv::http::request::Request;
use webserv::http::response::Response;
use webserv::{BindError, Server};

async fn app(req: Request) -> anyhow::Result<Response> {
    if let Some(ms) = req.path().strip_prefix("/sleep/") {
        tokio::time::sleep(Duration::from_millis(ms.parse()?)).await;
    }
    Ok(Response::ok(req.target))
}

fn config() -> Config {
    let mut cfg = Config::default();
    cfg.server.listen_addr = "127.0.0.1:0".to_string();
    cfg.timeouts.shutdown_grace = Duration::from_secs(2);
    cfg
}

async fn roundtrip(stream: &mut TcpStream, request: &[u8]) -> String {
    stream.write_all(request).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn test_server_serves_requests() {
    let server = Server::bind(config(), app).await.unwrap();
    let addr = server.local_addr();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let out = roundtrip(&mut stream, b"GET /index HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;

    assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(out.ends_with("\r\n\r\n/index"));

    let report = server.shutdown().await;
    assert_eq!(report.forced, 0);
}

#[tokio::test]
async fn test_server_serves_concurrent_connections() {
    let server = Server::bind(config(), app).await.unwrap();
    let addr = server.local_addr();

    let clients: Vec<_> = (0..8)
        .map(|i| {
            tokio::spawn(async move {
                let mut stream = TcpStream::connect(addr).await.unwrap();
                let req = format!("GET /sleep/100?client={i} HTTP/1.0\r\n\r\n");
                roundtrip(&mut stream, req.as_bytes()).await
            })
        })
        .collect();

    for (i, client) in clients.into_iter().enumerate() {
        let out = client.await.unwrap();
        assert!(out.ends_with(&format!("/sleep/100?client={i}")), "{out}");
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_bind_error_for_address_in_use() {
    let first = Server::bind(config(), app).await.unwrap();

    let mut cfg = config();
    cfg.server.listen_addr = first.local_addr().to_string();
    // SO_REUSEADDR does not allow two listeners on one port.
    let err: BindError = match Server::bind(cfg, app).await {
        Ok(_) => panic!("second bind should fail"),
        Err(e) => e,
    };
    assert_eq!(err.source.kind(), std::io::ErrorKind::AddrInUse);

    first.shutdown().await;
}

#[tokio::test]
async fn test_connection_limit_rejects_with_503() {
    let mut cfg = config();
    cfg.limits.max_connections = 1;
    let server = Server::bind(cfg, app).await.unwrap();
    let addr = server.local_addr();

    // Occupies the only slot.
    let mut first = TcpStream::connect(addr).await.unwrap();
    first.write_all(b"GET /a HTTP/1.1\r\n\r\n").await.unwrap();
    let mut buf = [0u8; 256];
    let n = first.read(&mut buf).await.unwrap();
    assert!(buf[..n].starts_with(b"HTTP/1.1 200 OK"));

    let mut second = TcpStream::connect(addr).await.unwrap();
    let mut out = Vec::new();
    second.read_to_end(&mut out).await.unwrap();
    let out = String::from_utf8(out).unwrap();
    assert!(out.starts_with("HTTP/1.1 503 Service Unavailable\r\n"), "{out}");
    assert!(out.contains("Connection: close"));

    drop(first);
    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let server = Server::bind(config(), app).await.unwrap();
    let addr = server.local_addr();
    server.shutdown().await;

    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_requests() {
    let server = Server::bind(config(), app).await.unwrap();
    let addr = server.local_addr();

    let mut busy = TcpStream::connect(addr).await.unwrap();
    busy.write_all(b"GET /sleep/300 HTTP/1.1\r\n\r\n").await.unwrap();
    let idle = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.manager().live_count().await, 2);

    let reader = tokio::spawn(async move {
        let mut out = Vec::new();
        busy.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    });

    let report = server.shutdown().await;
    assert_eq!(report.drained, 2);
    assert_eq!(report.forced, 0);

    let out = reader.await.unwrap();
    assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(out.contains("Connection: close\r\n"));
    assert!(out.ends_with("/sleep/300"));
    drop(idle);
}

#[tokio::test]
async fn test_shutdown_force_closes_after_grace() {
    let mut cfg = config();
    cfg.timeouts.shutdown_grace = Duration::from_millis(100);
    cfg.timeouts.handler = Duration::from_secs(60);
    let server = Server::bind(cfg, app).await.unwrap();
    let addr = server.local_addr();

    let mut stuck = TcpStream::connect(addr).await.unwrap();
    stuck.write_all(b"GET /sleep/30000 HTTP/1.1\r\n\r\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let report = server.shutdown().await;
    assert_eq!(report.forced, 1);

    let mut out = Vec::new();
    let _ = stuck.read_to_end(&mut out).await;
    assert!(out.is_empty());
}
