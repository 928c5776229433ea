//! Tests for the Spartan wire grammar

use spartoi::spartan::grammar::{
    MAX_META_LEN, ProtocolError, find_crlf, format_request_line, format_status_line, input_prompt,
    parse_request_line, parse_status_line,
};

#[test]
fn test_format_request_line() {
    assert_eq!(
        format_request_line("example.com", "/foo?x=1"),
        b"example.com /foo?x=1 0\r\n".to_vec()
    );
}

#[test]
fn test_format_status_line() {
    assert_eq!(format_status_line(2, "text/gemini"), b"2 text/gemini\r\n".to_vec());
    assert_eq!(format_status_line(5, ""), b"5\r\n".to_vec());
}

#[test]
fn test_input_prompt() {
    assert_eq!(input_prompt("/search", "Search terms"), "=: /search Search terms");
}

#[test]
fn test_find_crlf() {
    assert_eq!(find_crlf(b"2 text/plain\r\nbody"), Some(12));
    assert_eq!(find_crlf(b"no line end\n"), None);
    assert_eq!(find_crlf(b""), None);
}

#[test]
fn test_parse_status_line_complete() {
    let (line, consumed) = parse_status_line(b"2 text/plain\r\nhello").unwrap().unwrap();

    assert_eq!(line.status, 2);
    assert_eq!(line.meta, "text/plain");
    assert_eq!(consumed, 14);
}

#[test]
fn test_parse_status_line_keeps_meta_spaces() {
    let (line, _) = parse_status_line(b"5 internal error\r\n").unwrap().unwrap();

    assert_eq!(line.status, 5);
    assert_eq!(line.meta, "internal error");
}

#[test]
fn test_parse_status_line_incomplete() {
    assert_eq!(parse_status_line(b"2 text/pl").unwrap(), None);
    assert_eq!(parse_status_line(b"").unwrap(), None);
}

#[test]
fn test_parse_status_line_too_long() {
    let mut long = b"2 ".to_vec();
    long.extend(std::iter::repeat_n(b'a', MAX_META_LEN + 2));

    assert!(matches!(
        parse_status_line(&long),
        Err(ProtocolError::StatusLineTooLong(_))
    ));

    // Exactly at the limit is still worth waiting on
    let mut at_limit = b"2 ".to_vec();
    at_limit.extend(std::iter::repeat_n(b'a', MAX_META_LEN + 1));
    assert_eq!(parse_status_line(&at_limit).unwrap(), None);
}

#[test]
fn test_parse_status_line_malformed() {
    assert_eq!(
        parse_status_line(b"x text/plain\r\n"),
        Err(ProtocolError::MalformedStatusLine)
    );
    assert_eq!(
        parse_status_line(b"20 text/plain\r\n"),
        Err(ProtocolError::MalformedStatusLine)
    );
    assert_eq!(parse_status_line(b"\r\n"), Err(ProtocolError::MalformedStatusLine));
    assert_eq!(parse_status_line(b"2 \xff\r\n"), Err(ProtocolError::NotUtf8));
}

#[test]
fn test_parse_request_line() {
    let line = parse_request_line(b"example.com /foo?x=1 5").unwrap();

    assert_eq!(line.host, "example.com");
    assert_eq!(line.path, "/foo");
    assert_eq!(line.query.as_deref(), Some("x=1"));
    assert_eq!(line.content_length, 5);
}

#[test]
fn test_parse_request_line_root_and_fragment() {
    let line = parse_request_line(b"localhost / 0").unwrap();
    assert_eq!(line.path, "/");
    assert_eq!(line.query, None);

    let line = parse_request_line(b"localhost /page#section 0").unwrap();
    assert_eq!(line.path, "/page");
    assert_eq!(line.query, None);
}

#[test]
fn test_parse_request_line_field_count() {
    assert_eq!(parse_request_line(b"host /path"), Err(ProtocolError::FieldCount));
    assert_eq!(parse_request_line(b"host /path 0 extra"), Err(ProtocolError::FieldCount));
    assert_eq!(parse_request_line(b"host  /path 0"), Err(ProtocolError::FieldCount));
    assert_eq!(parse_request_line(b""), Err(ProtocolError::FieldCount));
}

#[test]
fn test_parse_request_line_bad_length() {
    assert!(matches!(
        parse_request_line(b"host /path -1"),
        Err(ProtocolError::InvalidContentLength(_))
    ));
    assert!(matches!(
        parse_request_line(b"host /path 12abc"),
        Err(ProtocolError::InvalidContentLength(_))
    ));
    assert!(matches!(
        parse_request_line(b"host /path 99999999999999999999999"),
        Err(ProtocolError::InvalidContentLength(_))
    ));
}

#[test]
fn test_parse_request_line_relative_path() {
    assert!(matches!(
        parse_request_line(b"host relative 0"),
        Err(ProtocolError::InvalidPath(_))
    ));
}
