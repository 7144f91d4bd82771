//! Unit tests for the JSON message envelope.

use serde::{Deserialize, Serialize};
use serde_json::json;

use testhost_session::protocol::message_type::{
    PROTOCOL_VERSION, SESSION_CONNECTED, TEST_DISCOVERY_START,
};
use testhost_session::protocol::{
    deserialize_message, serialize_payload, serialize_payload_with_version, Message,
};
use testhost_session::AppError;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DiscoveryRequest {
    sources: Vec<String>,
}

#[test]
fn struct_payload_survives_serialize_and_parse() {
    let request = DiscoveryRequest {
        sources: vec!["a.dll".into(), "b.dll".into()],
    };

    let raw = serialize_payload(TEST_DISCOVERY_START, &request).expect("serialize");
    let message = deserialize_message(&raw).expect("parse");

    assert_eq!(message.message_type(), TEST_DISCOVERY_START);
    assert_eq!(message.version(), None);
    let decoded: DiscoveryRequest = message.payload_as().expect("payload decodes");
    assert_eq!(decoded, request);
}

#[test]
fn envelope_uses_pascal_case_keys() {
    let raw = serialize_payload(PROTOCOL_VERSION, &3).expect("serialize");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("valid json");

    assert_eq!(value["MessageType"], PROTOCOL_VERSION);
    assert_eq!(value["Payload"], 3);
    assert!(value.get("Version").is_none());
}

#[test]
fn versioned_envelope_carries_version() {
    let raw = serialize_payload_with_version(TEST_DISCOVERY_START, &json!({}), 6)
        .expect("serialize");
    let message = deserialize_message(&raw).expect("parse");

    assert_eq!(message.version(), Some(6));
    assert_eq!(message.message_type(), TEST_DISCOVERY_START);
}

#[test]
fn message_without_payload_parses() {
    let message =
        deserialize_message(r#"{"MessageType":"TestSession.Connected"}"#).expect("parse");

    assert_eq!(message.message_type(), SESSION_CONNECTED);
    assert!(message.payload().is_none());
}

#[test]
fn unknown_envelope_fields_are_ignored() {
    let message = deserialize_message(
        r#"{"MessageType":"X","Payload":1,"TraceId":"abc"}"#,
    )
    .expect("parse");
    assert_eq!(message.payload(), Some(&json!(1)));
}

#[test]
fn missing_type_tag_is_a_codec_error() {
    match deserialize_message(r#"{"Payload":{}}"#) {
        Err(AppError::Codec(msg)) => {
            assert!(msg.contains("malformed message"), "unexpected message: {msg}");
        }
        other => panic!("expected Codec error, got {other:?}"),
    }
}

#[test]
fn non_json_text_is_a_codec_error() {
    assert!(matches!(
        deserialize_message("not json"),
        Err(AppError::Codec(_))
    ));
}

#[test]
fn payload_type_mismatch_names_the_message_type() {
    let message = Message::new(PROTOCOL_VERSION, json!("seven"));

    match message.payload_as::<u32>() {
        Err(AppError::Codec(msg)) => assert!(msg.contains(PROTOCOL_VERSION)),
        other => panic!("expected Codec error, got {other:?}"),
    }
}

#[test]
fn parsed_message_serializes_back_to_the_same_envelope() {
    let raw = r#"{"MessageType":"TestDiscovery.Start","Payload":{"Sources":["a.dll"]}}"#;
    let message = deserialize_message(raw).expect("parse");

    assert_eq!(serde_json::to_string(&message).expect("serialize"), raw);
}
