use eventgate::error::Error;
use eventgate::http::response::{Response, ResponseBuilder, StatusCode};
use eventgate::http::writer::{CONTINUE_RESPONSE, ResponseWriter, serialize_response};

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::Continue.as_u16(), 100);
    assert_eq!(StatusCode::Ok.as_u16(), 200);
    assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    assert_eq!(StatusCode::PayloadTooLarge.as_u16(), 413);
    assert_eq!(StatusCode::ExpectationFailed.as_u16(), 417);
    assert_eq!(StatusCode::InternalServerError.as_u16(), 500);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    assert_eq!(
        StatusCode::PayloadTooLarge.reason_phrase(),
        "Request Entity Too Large"
    );
    assert_eq!(
        StatusCode::ExpectationFailed.reason_phrase(),
        "Expectation Failed"
    );
}

#[test]
fn test_response_builder_defaults() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .body(b"Hello, World!".to_vec())
        .build();

    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(response.header("Content-Length"), Some("13"));
    assert_eq!(response.header("Content-Type"), Some("text/plain"));
}

#[test]
fn test_response_builder_preserves_explicit_headers() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("content-type", "application/json")
        .header("Content-Length", "999")
        .body(b"{}".to_vec())
        .build();

    assert_eq!(response.header("Content-Type"), Some("application/json"));
    assert_eq!(response.header("Content-Length"), Some("999"));
    assert_eq!(response.headers.len(), 2);
}

#[test]
fn test_ok_has_empty_body() {
    let response = Response::ok();
    assert_eq!(response.status, StatusCode::Ok);
    assert!(response.body.is_empty());
    assert_eq!(response.header("Content-Length"), Some("0"));
}

#[test]
fn test_error_responses_describe_condition() {
    let too_large = Response::from_error(&Error::PayloadTooLarge { limit: 10 });
    assert_eq!(too_large.status, StatusCode::PayloadTooLarge);
    assert!(String::from_utf8_lossy(&too_large.body).starts_with("413 Request Entity Too Large\n"));

    let expectation = Response::from_error(&Error::ExpectationFailed("tea".into()));
    assert_eq!(expectation.status, StatusCode::ExpectationFailed);

    let malformed = Response::from_error(&Error::MalformedRequest("no json".into()));
    assert_eq!(malformed.status, StatusCode::BadRequest);
    assert_eq!(malformed.body, b"400 Bad Request\nno json\n".to_vec());
}

#[test]
fn test_serialize_response() {
    let response = ResponseBuilder::new(StatusCode::BadRequest)
        .body(b"nope".to_vec())
        .build();
    let text = String::from_utf8(serialize_response(&response)).unwrap();

    assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(text.contains("Content-Length: 4\r\n"));
    assert!(text.contains("Content-Type: text/plain\r\n"));
    assert!(text.ends_with("\r\n\r\nnope"));
}

#[test]
fn test_continue_response_has_no_headers() {
    assert_eq!(CONTINUE_RESPONSE, b"HTTP/1.1 100 Continue\r\n\r\n");
}

#[tokio::test]
async fn test_writer_writes_everything() {
    let response = ResponseBuilder::new(StatusCode::Ok).build();
    let expected = serialize_response(&response);

    let mut out = Vec::new();
    let mut writer = ResponseWriter::new(&response);
    writer.write_to_stream(&mut out).await.unwrap();

    assert!(writer.is_done());
    assert_eq!(out, expected);
}
