use webserv::http::response::{Body, Response, ResponseBuilder, StatusCode};

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::OK.as_u16(), 200);
    assert_eq!(StatusCode::NO_CONTENT.as_u16(), 204);
    assert_eq!(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE.as_u16(), 431);
    assert_eq!(StatusCode::HTTP_VERSION_NOT_SUPPORTED.as_u16(), 505);
}

#[test]
fn test_status_code_range() {
    assert!(StatusCode::from_u16(100).is_some());
    assert!(StatusCode::from_u16(599).is_some());
    assert!(StatusCode::from_u16(0).is_none());
    assert!(StatusCode::from_u16(1000).is_none());
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::OK.reason_phrase(), "OK");
    assert_eq!(StatusCode::NOT_FOUND.reason_phrase(), "Not Found");
    assert_eq!(
        StatusCode::INTERNAL_SERVER_ERROR.reason_phrase(),
        "Internal Server Error"
    );
    assert_eq!(StatusCode::from_u16(299).unwrap().reason_phrase(), "");
}

#[test]
fn test_status_code_forbids_body() {
    assert!(StatusCode::CONTINUE.forbids_body());
    assert!(StatusCode::NO_CONTENT.forbids_body());
    assert!(StatusCode::NOT_MODIFIED.forbids_body());
    assert!(!StatusCode::OK.forbids_body());
    assert!(!StatusCode::NOT_FOUND.forbids_body());
}

#[test]
fn test_response_builder_basic() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .body(b"Hello, World!".to_vec())
        .build();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, Body::Full("Hello, World!".into()));
    // Framing is left to the writer.
    assert!(!response.headers.contains("Content-Length"));
}

#[test]
fn test_response_builder_keeps_header_order_and_duplicates() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("Set-Cookie", "a=1")
        .header("Content-Type", "text/plain")
        .header("Set-Cookie", "b=2")
        .build();

    let headers: Vec<_> = response.headers.iter().collect();
    assert_eq!(
        headers,
        vec![
            ("Set-Cookie", "a=1"),
            ("Content-Type", "text/plain"),
            ("Set-Cookie", "b=2"),
        ]
    );
}

#[test]
fn test_response_builder_chunks() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .chunks(["ab", "cde"])
        .build();

    assert_eq!(response.body.len(), 5);
    assert!(matches!(response.body, Body::Chunked(ref c) if c.len() == 2));
}

#[test]
fn test_response_reason_override() {
    let response = ResponseBuilder::new(StatusCode::OK).reason("Fine").build();
    assert_eq!(response.reason_phrase(), "Fine");
    assert_eq!(Response::ok("x").reason_phrase(), "OK");
}

#[test]
fn test_response_error_helpers() {
    let response = Response::not_found();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body, Body::from("404 Not Found\n"));
    assert_eq!(response.headers.get("Content-Type"), Some("text/plain"));

    let response = Response::internal_error();
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body, Body::from("500 Internal Server Error\n"));
}

#[test]
fn test_body_lengths() {
    assert_eq!(Body::Empty.len(), 0);
    assert!(Body::Empty.is_empty());
    assert_eq!(Body::from("abc").len(), 3);
    assert_eq!(Body::Chunked(vec!["a".into(), "".into(), "bc".into()]).len(), 3);
}
