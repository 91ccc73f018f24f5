// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn new_assigns_unique_ids() {
    let a = BusMessage::new(kinds::USER_MESSAGE, json!({"text": "hi"}), 1000);
    let b = BusMessage::new(kinds::USER_MESSAGE, json!({"text": "hi"}), 1000);
    assert_ne!(a.id, b.id);
    assert_eq!(a.schema_version, SCHEMA_VERSION);
}

#[test]
fn text_reads_payload_field() {
    let msg = BusMessage::new(kinds::USER_MESSAGE, json!({"text": "hello"}), 0);
    assert_eq!(msg.text(), Some("hello"));

    let msg = BusMessage::new(kinds::AGORA_IN, json!({"envelope": {}}), 0);
    assert_eq!(msg.text(), None);
}

#[test]
fn builders_set_routing_fields() {
    let msg = BusMessage::new(kinds::AGORA_OUT, json!({}), 5)
        .with_source("peer-inbound")
        .with_destination("peer-outbound")
        .with_meta(json!({"hops": 1}));

    assert_eq!(msg.source.as_deref(), Some("peer-inbound"));
    assert_eq!(msg.destination.as_deref(), Some("peer-outbound"));
    assert_eq!(msg.meta.unwrap()["hops"], 1);
}

#[test]
fn serde_omits_empty_optionals() {
    let msg = BusMessage {
        id: MessageId::new("m-1"),
        kind: kinds::USER_MESSAGE.to_string(),
        schema_version: SCHEMA_VERSION,
        timestamp_ms: 42,
        source: None,
        destination: None,
        payload: None,
        meta: None,
    };
    let json = serde_json::to_value(&msg).unwrap();
    assert!(json.get("source").is_none());
    assert!(json.get("destination").is_none());
    assert!(json.get("payload").is_none());
}
