use spartoi::http::mime::ContentType;
use spartoi::http::response::{Response, ResponseBuilder, SendFile, StatusCode};

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::OK.as_u16(), 200);
    assert_eq!(StatusCode::MOVED_PERMANENTLY.as_u16(), 301);
    assert_eq!(StatusCode::TEMPORARY_REDIRECT.as_u16(), 307);
    assert_eq!(StatusCode::BAD_REQUEST.as_u16(), 400);
    assert_eq!(StatusCode::NOT_FOUND.as_u16(), 404);
    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR.as_u16(), 500);
    assert_eq!(StatusCode::from_u16(3).as_u16(), 3);
}

#[test]
fn test_status_code_is_success() {
    assert!(StatusCode::OK.is_success());
    assert!(StatusCode::from_u16(204).is_success());
    assert!(!StatusCode::NOT_FOUND.is_success());
    assert!(!StatusCode::from_u16(2).is_success());
}

#[test]
fn test_response_builder_with_headers() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("Content-Type", "text/gemini")
        .header("X-Custom", "value")
        .body(b"# Title".to_vec())
        .build();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("text/gemini"));
    assert_eq!(response.header("X-Custom"), Some("value"));
    assert_eq!(response.body, b"# Title".to_vec());
    assert!(response.file.is_none());
}

#[test]
fn test_response_content_type_ignores_empty_header() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("Content-Type", "")
        .build();
    assert_eq!(response.content_type(), None);
}

#[test]
fn test_response_content_kind() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("Content-Type", "text/gemini; charset=utf-8")
        .build();
    assert_eq!(response.content_kind(), Some(ContentType::TextGemini));

    let response = ResponseBuilder::new(StatusCode::OK)
        .header("Content-Type", "application/x-made-up")
        .build();
    assert_eq!(response.content_kind(), Some(ContentType::Custom));

    assert_eq!(ResponseBuilder::new(StatusCode::OK).build().content_kind(), None);
}

#[test]
fn test_response_builder_send_file() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .send_file("/srv/capsule/index.gmi", 10, 20)
        .build();

    assert_eq!(
        response.file,
        Some(SendFile {
            path: "/srv/capsule/index.gmi".into(),
            offset: 10,
            length: 20,
        })
    );
}

#[test]
fn test_response_spartan_accessors() {
    let response = ResponseBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
        .header("meta", "boom")
        .header("spartan-status", "5")
        .build();

    assert_eq!(response.meta(), Some("boom"));
    assert_eq!(response.spartan_status(), Some(5));
}

#[test]
fn test_response_internal_error_helper() {
    let response = Response::internal_error();

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body, b"500 Internal Server Error".to_vec());
}
