//! Codec Tests
//!
//! Tests for command and response encoding/decoding.

use nairkv::protocol::{
    decode_command, decode_response, encode_command, encode_response, Command, FrameHeader,
    MessageType, Response, Value, HEADER_SIZE, MAX_KEY_SIZE, MAX_VALUE_SIZE,
};
use nairkv::NairError;

// =============================================================================
// Helper Functions
// =============================================================================

fn le32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

/// Split an encoded response into header and body and decode it
fn decode_frame(frame: &[u8]) -> nairkv::Result<Response> {
    let header = FrameHeader::decode(frame).unwrap();
    decode_response(&header, &frame[HEADER_SIZE..])
}

// =============================================================================
// Command Layout Tests
// =============================================================================

#[test]
fn test_set_frame_layout() {
    let cmd = Command::set(9, "k", "v", 600);
    let frame = encode_command(&cmd, 42).unwrap();

    assert_eq!(frame.len(), HEADER_SIZE + 22);
    assert_eq!(le32(&frame, 0), MessageType::SetRequest as u32);
    assert_eq!(le32(&frame, 4), 42);
    assert_eq!(le32(&frame, 8), 22);

    let body = &frame[HEADER_SIZE..];
    assert_eq!(le32(body, 0), 9); // area
    assert_eq!(le32(body, 4), 600); // ttl
    assert_eq!(le32(body, 8), 0); // version
    assert_eq!(le32(body, 12), 1); // key size
    assert_eq!(le32(body, 16), 1); // value size
    assert_eq!(&body[20..], b"kv");
}

#[test]
fn test_get_frame_layout() {
    let frame = encode_command(&Command::get(3, "hello"), 7).unwrap();

    assert_eq!(le32(&frame, 0), 3);
    assert_eq!(le32(&frame, 8), 8 + 5);
    let body = &frame[HEADER_SIZE..];
    assert_eq!(le32(body, 0), 3);
    assert_eq!(le32(body, 4), 5);
    assert_eq!(&body[8..], b"hello");
}

#[test]
fn test_meta_and_del_share_key_layout() {
    let meta = encode_command(&Command::get_meta(1, "abc"), 1).unwrap();
    let del = encode_command(&Command::del(1, "abc"), 1).unwrap();

    assert_eq!(le32(&meta, 0), 163);
    assert_eq!(le32(&del, 0), 5);
    assert_eq!(&meta[4..], &del[4..]);
}

#[test]
fn test_incr_frame_layout() {
    let frame = encode_command(&Command::incr(2, "counter", 5, 100, 60), 11).unwrap();

    assert_eq!(le32(&frame, 0), 161);
    assert_eq!(le32(&frame, 8), 20 + 7);
    let body = &frame[HEADER_SIZE..];
    assert_eq!(le32(body, 0), 2); // area
    assert_eq!(le32(body, 4), 60); // ttl
    assert_eq!(le32(body, 8), 5); // delta
    assert_eq!(le32(body, 12), 100); // default
    assert_eq!(le32(body, 16), 7); // key size
    assert_eq!(&body[20..], b"counter");
}

#[test]
fn test_key_size_counts_utf8_bytes() {
    let frame = encode_command(&Command::get(1, "ключ"), 1).unwrap();
    let body = &frame[HEADER_SIZE..];
    assert_eq!(le32(body, 4), "ключ".len() as u32);
    assert_eq!(le32(&frame, 8) as usize, body.len());
}

#[test]
fn test_structured_value_is_sent_as_json() {
    let value = Value::Structured(serde_json::json!({"a": 1}));
    let frame = encode_command(&Command::set(1, "k", value, 10), 1).unwrap();
    let body = &frame[HEADER_SIZE..];
    assert_eq!(&body[21..], br#"{"a":1}"#);
}

#[test]
fn test_command_decodes_back() {
    let cmd = Command::incr(4, "c", 2, 9, 30);
    let frame = encode_command(&cmd, 77).unwrap();
    let (header, decoded) = decode_command(&frame).unwrap();

    assert_eq!(header.request_id, 77);
    assert_eq!(decoded, cmd);
}

// =============================================================================
// Encoding Validation Tests
// =============================================================================

#[test]
fn test_empty_key_rejected() {
    let result = encode_command(&Command::get(1, ""), 1);
    assert!(matches!(result, Err(NairError::Encoding(_))));
}

#[test]
fn test_oversized_key_rejected() {
    let key = "x".repeat(MAX_KEY_SIZE + 1);
    let result = encode_command(&Command::del(1, key), 1);
    assert!(matches!(result, Err(NairError::Encoding(_))));
}

#[test]
fn test_max_key_accepted() {
    let key = "x".repeat(MAX_KEY_SIZE);
    assert!(encode_command(&Command::del(1, key), 1).is_ok());
}

#[test]
fn test_oversized_value_rejected() {
    let value = "v".repeat(MAX_VALUE_SIZE + 1);
    let result = encode_command(&Command::set(1, "k", value, 1), 1);
    assert!(matches!(result, Err(NairError::Encoding(_))));
}

// =============================================================================
// Response Decoding Tests
// =============================================================================

#[test]
fn test_set_success_response() {
    // Encode a set, then answer it with a fabricated success frame
    let request = encode_command(&Command::set(9, "k", "v", 600), 5).unwrap();
    let (header, _) = decode_command(&request).unwrap();

    let mut reply = Vec::new();
    reply.extend_from_slice(&2u32.to_le_bytes());
    reply.extend_from_slice(&header.request_id.to_le_bytes());
    reply.extend_from_slice(&10u32.to_le_bytes());
    reply.extend_from_slice(&0u16.to_le_bytes()); // code
    reply.extend_from_slice(&9u32.to_le_bytes()); // area
    reply.extend_from_slice(&0u32.to_le_bytes()); // key size

    let response = decode_frame(&reply).unwrap();
    assert!(response.success());
    assert_eq!(response, Response::Set { code: 0, area: 9 });
}

#[test]
fn test_set_response_with_trailing_key() {
    let mut reply = Vec::new();
    reply.extend_from_slice(&2u32.to_le_bytes());
    reply.extend_from_slice(&1u32.to_le_bytes());
    reply.extend_from_slice(&11u32.to_le_bytes());
    reply.extend_from_slice(&0u16.to_le_bytes());
    reply.extend_from_slice(&9u32.to_le_bytes());
    reply.extend_from_slice(&1u32.to_le_bytes());
    reply.push(b'k');

    assert!(decode_frame(&reply).unwrap().success());
}

#[test]
fn test_get_response_decodes_fields() {
    let response = Response::Get {
        code: 0,
        area: 9,
        version: 3,
        key: "k".to_string(),
        value: Value::Raw("plain text".to_string()),
    };
    let frame = encode_response(&response, 1);
    assert_eq!(decode_frame(&frame).unwrap(), response);
}

#[test]
fn test_get_value_json_is_structured() {
    let response = Response::Get {
        code: 0,
        area: 1,
        version: 1,
        key: "k".to_string(),
        value: Value::Structured(serde_json::json!({"name": "x", "n": [1, 2]})),
    };
    let decoded = decode_frame(&encode_response(&response, 1)).unwrap();

    match decoded {
        Response::Get { value, .. } => {
            assert_eq!(value.as_json().unwrap()["name"], "x");
        }
        other => panic!("Expected GET response, got {:?}", other),
    }
}

#[test]
fn test_failed_get_without_fields() {
    let mut reply = Vec::new();
    reply.extend_from_slice(&4u32.to_le_bytes());
    reply.extend_from_slice(&1u32.to_le_bytes());
    reply.extend_from_slice(&6u32.to_le_bytes());
    reply.extend_from_slice(&1u16.to_le_bytes());
    reply.extend_from_slice(&9u32.to_le_bytes());

    let response = decode_frame(&reply).unwrap();
    assert!(!response.success());
    assert!(matches!(response, Response::Get { code: 1, .. }));
}

#[test]
fn test_meta_response() {
    let response = Response::Meta {
        code: 0,
        area: 2,
        version: 8,
        ttl_remaining: 120,
    };
    assert_eq!(decode_frame(&encode_response(&response, 3)).unwrap(), response);
}

#[test]
fn test_incr_response() {
    let response = Response::Incr {
        code: 0,
        area: 2,
        key: "c".to_string(),
        value: 15,
    };
    assert_eq!(decode_frame(&encode_response(&response, 3)).unwrap(), response);
}

#[test]
fn test_unknown_message_type_is_protocol_error() {
    let header = FrameHeader {
        message_type: 999,
        request_id: 1,
        payload_size: 6,
    };
    let result = decode_response(&header, &[0, 0, 1, 0, 0, 0]);
    assert!(matches!(result, Err(NairError::Protocol(_))));
}

#[test]
fn test_request_type_in_response_stream_is_protocol_error() {
    let header = FrameHeader::new(MessageType::GetRequest, 1, 6);
    let result = decode_response(&header, &[0, 0, 1, 0, 0, 0]);
    assert!(matches!(result, Err(NairError::Protocol(_))));
}

#[test]
fn test_truncated_get_body_is_protocol_error() {
    let header = FrameHeader::new(MessageType::GetResponse, 1, 10);
    // Success code, area, then half a version field
    let result = decode_response(&header, &[0, 0, 1, 0, 0, 0, 1, 0]);
    assert!(matches!(result, Err(NairError::Protocol(_))));
}

#[test]
fn test_invalid_utf8_value_is_protocol_error() {
    let mut body = Vec::new();
    body.extend_from_slice(&0u16.to_le_bytes());
    body.extend_from_slice(&1u32.to_le_bytes());
    body.extend_from_slice(&1u32.to_le_bytes());
    body.extend_from_slice(&1u32.to_le_bytes());
    body.extend_from_slice(&2u32.to_le_bytes());
    body.push(b'k');
    body.extend_from_slice(&[0xFF, 0xFE]);

    let header = FrameHeader::new(MessageType::GetResponse, 1, body.len() as u32);
    assert!(matches!(decode_response(&header, &body), Err(NairError::Protocol(_))));
}

// =============================================================================
// Value Classification Tests
// =============================================================================

#[test]
fn test_value_classification() {
    assert_eq!(Value::from_text("hello world"), Value::Raw("hello world".to_string()));
    assert_eq!(Value::from_text(""), Value::Raw(String::new()));
    assert_eq!(Value::from_text("42"), Value::Structured(serde_json::json!(42)));
    assert_eq!(Value::from_text(r#"{"a":true}"#), Value::Structured(serde_json::json!({"a": true})));
    assert_eq!(Value::from_text("{broken"), Value::Raw("{broken".to_string()));
}

#[test]
fn test_raw_json_text_reads_back_structured() {
    let response = Response::Get {
        code: 0,
        area: 1,
        version: 1,
        key: "n".to_string(),
        value: Value::Raw("42".to_string()),
    };

    match decode_frame(&encode_response(&response, 1)).unwrap() {
        Response::Get { value, .. } => {
            assert_eq!(value, Value::Structured(serde_json::json!(42)));
            assert_eq!(value.to_string(), "42");
        }
        other => panic!("Expected GET response, got {:?}", other),
    }
}
