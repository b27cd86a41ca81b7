//! ---
//! spine_section: "02-messaging-ipc-data-model"
//! spine_subsection: "module"
//! spine_type: "source"
//! spine_scope: "code"
//! spine_description: "Envelope model and wire codec."
//! spine_version: "v0.1.0"
//! spine_owner: "tbd"
//! ---
//! JSON wire format:
//!
//! ```json
//! { "type": 1, "dest_list": ["components.worker-1.inbox"], "body": {"x": 1} }
//! ```
//!
//! `type` is 1 (message), 2 (command) or 3 (query). The delivery handle never
//! travels on the wire.

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::types::{DeliveryTag, Envelope, Kind};
use crate::{CodecError, Result};

/// Content type published alongside every encoded envelope.
pub const WIRE_CONTENT_TYPE: &str = "application/json";

const FIELD_TYPE: &str = "type";
const FIELD_DEST_LIST: &str = "dest_list";
const FIELD_BODY: &str = "body";

#[derive(Serialize)]
struct WireEnvelope<'a> {
    #[serde(rename = "type")]
    kind: u8,
    dest_list: &'a [String],
    body: &'a JsonValue,
}

/// Serialize an envelope into its wire payload.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>> {
    let wire = WireEnvelope {
        kind: envelope.kind().tag(),
        dest_list: envelope.destinations(),
        body: envelope.body(),
    };
    Ok(serde_json::to_vec(&wire)?)
}

/// Parse a wire payload, attaching the delivery handle it arrived with.
pub fn decode(payload: &[u8], delivery: Option<DeliveryTag>) -> Result<Envelope> {
    let value: JsonValue = serde_json::from_slice(payload)?;
    let mut fields = match value {
        JsonValue::Object(fields) => fields,
        other => {
            return Err(CodecError::Malformed(format!(
                "expected a JSON object, found {}",
                json_type_name(&other)
            )))
        }
    };

    let kind = decode_kind(&fields)?;
    let destinations = decode_destinations(&fields)?;
    let body = fields
        .remove(FIELD_BODY)
        .ok_or(CodecError::MissingField(FIELD_BODY))?;

    Ok(Envelope::from_parts(kind, destinations, body, delivery))
}

fn decode_kind(fields: &Map<String, JsonValue>) -> Result<Kind> {
    let raw = fields
        .get(FIELD_TYPE)
        .ok_or(CodecError::MissingField(FIELD_TYPE))?;
    let tag = raw.as_i64().ok_or_else(|| {
        CodecError::Malformed(format!(
            "field 'type' must be an integer, found {}",
            json_type_name(raw)
        ))
    })?;
    Kind::try_from(tag)
}

fn decode_destinations(fields: &Map<String, JsonValue>) -> Result<Vec<String>> {
    let raw = fields
        .get(FIELD_DEST_LIST)
        .ok_or(CodecError::MissingField(FIELD_DEST_LIST))?;
    let items = raw.as_array().ok_or_else(|| {
        CodecError::Malformed(format!(
            "field 'dest_list' must be an array, found {}",
            json_type_name(raw)
        ))
    })?;
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_owned).ok_or_else(|| {
                CodecError::Malformed("field 'dest_list' must contain only strings".into())
            })
        })
        .collect()
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_writes_exactly_three_fields() {
        let envelope = Envelope::command(json!({"op": "reload"}))
            .with_destination("components.worker-1.inbox");
        let bytes = encode(&envelope).expect("encode");
        let value: JsonValue = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(
            value,
            json!({
                "type": 2,
                "dest_list": ["components.worker-1.inbox"],
                "body": {"op": "reload"}
            })
        );
    }

    #[test]
    fn roundtrip_preserves_kind_destinations_and_body() {
        let samples = [
            Envelope::message(json!({"x": 1})).with_destination("components.a.inbox"),
            Envelope::command("quit"),
            Envelope::query(json!([1, 2, 3]))
                .with_destinations(["components.a.inbox", "components.b.inbox"]),
            Envelope::message(json!(null)),
        ];
        for envelope in samples {
            let decoded = decode(&encode(&envelope).expect("encode"), None).expect("decode");
            assert_eq!(decoded.kind(), envelope.kind());
            assert_eq!(decoded.destinations(), envelope.destinations());
            assert_eq!(decoded.body(), envelope.body());
        }
    }

    #[test]
    fn decode_attaches_delivery_handle() {
        let payload = br#"{"type":1,"dest_list":[],"body":{}}"#;
        let envelope = decode(payload, Some(DeliveryTag(42))).expect("decode");
        assert_eq!(envelope.delivery(), Some(DeliveryTag(42)));
    }

    #[test]
    fn decode_reports_each_missing_field() {
        let cases: [(&[u8], &str); 3] = [
            (br#"{"dest_list":[],"body":{}}"#, "type"),
            (br#"{"type":1,"body":{}}"#, "dest_list"),
            (br#"{"type":1,"dest_list":[]}"#, "body"),
        ];
        for (payload, field) in cases {
            match decode(payload, None) {
                Err(CodecError::MissingField(missing)) => assert_eq!(missing, field),
                other => panic!("expected missing {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn decode_accepts_null_body() {
        let envelope = decode(br#"{"type":3,"dest_list":[],"body":null}"#, None).expect("decode");
        assert_eq!(envelope.kind(), Kind::Query);
        assert!(envelope.body().is_null());
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        let err = decode(br#"{"type":9,"dest_list":[],"body":{}}"#, None).unwrap_err();
        assert!(matches!(err, CodecError::UnknownKind(9)));
    }

    #[test]
    fn decode_rejects_malformed_payloads() {
        assert!(matches!(
            decode(b"not json", None),
            Err(CodecError::Json(_))
        ));
        assert!(matches!(
            decode(b"[1,2]", None),
            Err(CodecError::Malformed(_))
        ));
        assert!(matches!(
            decode(br#"{"type":"1","dest_list":[],"body":{}}"#, None),
            Err(CodecError::Malformed(_))
        ));
        assert!(matches!(
            decode(br#"{"type":1,"dest_list":[7],"body":{}}"#, None),
            Err(CodecError::Malformed(_))
        ));
    }
}
