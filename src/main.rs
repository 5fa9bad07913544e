use webserv::http::request::{Method, Request};
use webserv::http::response::{Response, StatusCode};
use webserv::{Config, Server};

const PAGE: &str = "<html><head><title>My Web Server</title></head>\
<body><h1>Hello, World! first test of HTTP Server</h1></body></html>";

async fn hello(req: Request) -> anyhow::Result<Response> {
    match req.method {
        Method::GET | Method::HEAD => Ok(Response::new(StatusCode::OK)
            .header("Content-Type", "text/html")
            .body(PAGE)
            .build()),
        _ => {
            let mut resp = Response::error(StatusCode::METHOD_NOT_ALLOWED);
            resp.headers.append("Allow", "GET, HEAD");
            Ok(resp)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = match std::env::args().nth(1) {
        Some(path) => {
            let mut cfg = Config::from_file(path)?;
            cfg.apply_env();
            cfg
        }
        None => Config::load()?,
    };

    let server = Server::bind(cfg, hello).await?;

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await;

    Ok(())
}
