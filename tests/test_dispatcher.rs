use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use webserv::http::request::{Method, Request, RequestBuilder};
use webserv::http::response::{Body, Response, StatusCode};
use webserv::server::Dispatcher;

fn get(target: &str) -> Request {
    RequestBuilder::new()
        .method(Method::GET)
        .target(target)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_dispatch_returns_handler_response() {
    let dispatcher = Dispatcher::new(
        |req: Request| async move {
            Ok::<_, anyhow::Error>(Response::ok(format!("you asked for {}", req.target)))
        },
        Duration::from_secs(1),
    );

    let out = dispatcher.dispatch(get("/x")).await;

    assert_eq!(out.response.status, StatusCode::OK);
    assert_eq!(out.response.body, Body::from("you asked for /x"));
    assert!(!out.timed_out);
}

#[tokio::test]
async fn test_dispatch_handler_error_becomes_500() {
    let dispatcher = Dispatcher::new(
        |_req: Request| async move {
            Err::<Response, _>(anyhow::anyhow!("secret internal detail"))
        },
        Duration::from_secs(1),
    );

    let out = dispatcher.dispatch(get("/")).await;

    assert_eq!(out.response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(out.response.body, Body::from("500 Internal Server Error\n"));
    assert!(!out.timed_out);
}

#[tokio::test]
async fn test_dispatch_timeout_becomes_500_and_aborts_handler() {
    let finished = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&finished);

    let dispatcher = Dispatcher::new(
        move |_req: Request| {
            let seen = Arc::clone(&seen);
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                seen.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(Response::ok("late"))
            }
        },
        Duration::from_millis(20),
    );

    let out = dispatcher.dispatch(get("/")).await;
    assert_eq!(out.response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(out.timed_out);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(finished.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_dispatch_panic_becomes_500() {
    let dispatcher = Dispatcher::new(
        |req: Request| async move {
            if req.target == "/boom" {
                panic!("handler panicked");
            }
            Ok::<_, anyhow::Error>(Response::ok("fine"))
        },
        Duration::from_secs(1),
    );

    let out = dispatcher.dispatch(get("/boom")).await;
    assert_eq!(out.response.status, StatusCode::INTERNAL_SERVER_ERROR);

    // The dispatcher is still usable afterwards.
    let out = dispatcher.dispatch(get("/ok")).await;
    assert_eq!(out.response.status, StatusCode::OK);
}
