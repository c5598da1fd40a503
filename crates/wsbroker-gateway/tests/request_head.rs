#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use wsbroker_gateway::transport::handshake::{
    perform_handshake, read_request_head, write_http_error, RequestHead,
};

const REQUEST: &[u8] = b"GET /ws?client=7 HTTP/1.1\r\n\
Host: example.com\r\n\
upgrade: websocket\r\n\
sec-websocket-key:   dGhlIHNhbXBsZSBub25jZQ==  \r\n\
\r\n";

#[tokio::test]
async fn parses_request_line_and_headers() {
    let mut input = REQUEST;
    let head = read_request_head(&mut input, 8192).await.unwrap();

    assert_eq!(head.method, "GET");
    assert_eq!(head.path, "/ws?client=7");
    assert_eq!(head.route(), "/ws");
    assert_eq!(head.version, "HTTP/1.1");
    assert_eq!(head.header("Upgrade"), Some("websocket"));
    assert_eq!(head.header("SEC-WEBSOCKET-KEY"), Some("dGhlIHNhbXBsZSBub25jZQ=="));
    assert_eq!(head.header("Origin"), None);
}

#[tokio::test]
async fn bytes_after_the_head_stay_unread() {
    let mut bytes = REQUEST.to_vec();
    bytes.extend_from_slice(&[0x81, 0x00]);
    let mut input = bytes.as_slice();

    read_request_head(&mut input, 8192).await.unwrap();
    assert_eq!(input, &[0x81u8, 0x00][..]);
}

#[tokio::test]
async fn oversized_head_is_rejected() {
    let mut input = REQUEST;
    let err = read_request_head(&mut input, 32).await.unwrap_err();
    assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
}

#[tokio::test]
async fn truncated_or_malformed_heads_are_rejected() {
    let cases: [&[u8]; 3] = [
        b"",
        b"GET /ws HTTP/1.1\r\nHost: x\r\n",
        b"NONSENSE\r\n\r\n",
    ];
    for case in cases {
        let mut input = case;
        let err = read_request_head(&mut input, 8192).await.unwrap_err();
        assert_eq!(err.client_code().as_str(), "BAD_REQUEST", "{case:?}");
    }
}

#[tokio::test]
async fn handshake_writes_the_exact_upgrade_response() {
    let mut input = REQUEST;
    let head = read_request_head(&mut input, 8192).await.unwrap();

    let mut out = Vec::new();
    perform_handshake(&head, &mut out).await.unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
         \r\n"
    );
}

#[tokio::test]
async fn missing_or_blank_key_writes_nothing() {
    for key in [None, Some("   ")] {
        let mut head = RequestHead {
            method: "GET".into(),
            path: "/ws".into(),
            version: "HTTP/1.1".into(),
            headers: vec![("Host".into(), "x".into())],
        };
        if let Some(key) = key {
            head.headers.push(("Sec-WebSocket-Key".into(), key.into()));
        }

        let mut out = Vec::new();
        let err = perform_handshake(&head, &mut out).await.unwrap_err();
        assert_eq!(err.client_code().as_str(), "MISSING_KEY");
        assert!(out.is_empty());
    }
}

#[tokio::test]
async fn http_errors_carry_a_sized_body() {
    let mut out = Vec::new();
    write_http_error(&mut out, "404 Not Found", "nothing here")
        .await
        .unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(text.contains("Content-Length: 27\r\n"));
    assert!(text.ends_with("\r\n\r\n404 Not Found: nothing here"));
}
