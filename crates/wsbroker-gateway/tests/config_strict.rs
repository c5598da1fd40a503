#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use wsbroker_gateway::config::{self, Backpressure};

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
gateway:
  listen: "0.0.0.0:8080"
session:
  outbound_queu: 64 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.gateway.path, "/ws");
    assert_eq!(cfg.session.backpressure, Backpressure::Block);
    assert_eq!(cfg.session.idle_timeout_ms, 0);
    assert!(cfg.broker.dedup_subscribe);
}

#[test]
fn full_config_parses() {
    let ok = r#"
version: 1
gateway:
  listen: "127.0.0.1:7000"
  path: "/pubsub"
  max_header_bytes: 4096
session:
  outbound_queue: 8
  max_payload_bytes: 65536
  backpressure: drop
  write_timeout_ms: 0
  idle_timeout_ms: 30000
broker:
  dedup_subscribe: false
ops:
  listen: "127.0.0.1:7001"
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.gateway.path, "/pubsub");
    assert_eq!(cfg.session.outbound_queue, 8);
    assert_eq!(cfg.session.backpressure, Backpressure::Drop);
    assert!(!cfg.broker.dedup_subscribe);
    assert_eq!(cfg.ops.listen, "127.0.0.1:7001");
}

#[test]
fn rejects_out_of_range_values() {
    let cases = [
        "version: 2\n",
        "version: 1\nsession:\n  outbound_queue: 0\n",
        "version: 1\nsession:\n  idle_timeout_ms: 10\n",
        "version: 1\nsession:\n  backpressure: drop\n  enqueue_timeout_ms: 50\n",
        "version: 1\ngateway:\n  path: \"ws\"\n",
        "version: 1\nsession:\n  backpressure: sometimes\n",
    ];
    for yaml in cases {
        let err = config::load_from_str(yaml).expect_err(yaml);
        assert_eq!(err.client_code().as_str(), "BAD_REQUEST", "yaml={yaml}");
    }
}
