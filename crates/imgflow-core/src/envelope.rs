//! Delivery envelope decoding
//!
//! A storage notification can reach the pipeline directly (S3 event), through an SNS topic
//! (Lambda or HTTP push), through an SQS queue, or as an EventBridge event. The parser peels
//! these layers until it reaches exactly one object-created record.

use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};

use crate::error::PipelineError;
use crate::models::NotificationEvent;

/// Maximum number of envelope layers, including the storage event itself.
pub const MAX_ENVELOPE_DEPTH: usize = 4;

const OBJECT_CREATED_PREFIX: &str = "ObjectCreated";
const EVENTBRIDGE_OBJECT_CREATED: &str = "Object Created";

pub struct EnvelopeParser;

impl EnvelopeParser {
    /// Decode a raw delivery payload into a single notification event.
    pub fn parse(raw: &[u8]) -> Result<NotificationEvent, PipelineError> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|e| malformed(format!("payload is not valid JSON: {}", e)))?;
        parse_layer(&value, 1)
    }

    /// Split a batched payload into single-record payloads that [`EnvelopeParser::parse`]
    /// accepts. Payloads that cannot be split are returned unchanged.
    pub fn split(raw: &[u8]) -> Vec<Vec<u8>> {
        let Ok(value) = serde_json::from_slice::<Value>(raw) else {
            return vec![raw.to_vec()];
        };

        let parts = split_layer(&value, 1);
        if parts.len() <= 1 {
            return vec![raw.to_vec()];
        }

        parts
            .iter()
            .filter_map(|part| serde_json::to_vec(part).ok())
            .collect()
    }
}

fn malformed(detail: impl Into<String>) -> PipelineError {
    PipelineError::MalformedEnvelope(detail.into())
}

fn parse_layer(value: &Value, depth: usize) -> Result<NotificationEvent, PipelineError> {
    if depth > MAX_ENVELOPE_DEPTH {
        return Err(malformed(format!(
            "envelope nested deeper than {} levels",
            MAX_ENVELOPE_DEPTH
        )));
    }

    let object = value
        .as_object()
        .ok_or_else(|| malformed("payload is not a JSON object"))?;

    if let Some(records) = object.get("Records") {
        let records = records
            .as_array()
            .ok_or_else(|| malformed("Records is not an array"))?;
        let record = match records.as_slice() {
            [] => return Err(malformed("envelope contains no records")),
            [record] => record,
            many => {
                return Err(malformed(format!(
                    "envelope contains {} records, expected exactly one",
                    many.len()
                )))
            }
        };
        return parse_record(record, depth);
    }

    if str_field(object, "Type") == Some("Notification") {
        let message = str_field(object, "Message")
            .ok_or_else(|| malformed("SNS notification has no Message"))?;
        return parse_layer(&parse_nested(message)?, depth + 1);
    }

    if str_field(object, "source") == Some("aws.s3") {
        return parse_eventbridge(object);
    }

    Err(malformed("unrecognised envelope shape"))
}

fn parse_record(record: &Value, depth: usize) -> Result<NotificationEvent, PipelineError> {
    let object = record
        .as_object()
        .ok_or_else(|| malformed("record is not a JSON object"))?;

    let source = str_field(object, "eventSource").or_else(|| str_field(object, "EventSource"));
    match source {
        Some("aws:sns") => {
            let message = object
                .get("Sns")
                .and_then(Value::as_object)
                .and_then(|sns| str_field(sns, "Message"))
                .ok_or_else(|| malformed("SNS record has no Sns.Message"))?;
            parse_layer(&parse_nested(message)?, depth + 1)
        }
        Some("aws:sqs") => {
            let body = str_field(object, "body")
                .ok_or_else(|| malformed("SQS record has no body"))?;
            parse_layer(&parse_nested(body)?, depth + 1)
        }
        Some("aws:s3") => parse_s3_record(object),
        None if object.contains_key("s3") => parse_s3_record(object),
        Some(other) => Err(malformed(format!("unsupported event source '{}'", other))),
        None => Err(malformed("record has no event source")),
    }
}

fn parse_s3_record(record: &Map<String, Value>) -> Result<NotificationEvent, PipelineError> {
    let event_name =
        str_field(record, "eventName").ok_or_else(|| malformed("record has no eventName"))?;
    if !event_name.starts_with(OBJECT_CREATED_PREFIX) {
        return Err(malformed(format!(
            "event '{}' is not an object-created event",
            event_name
        )));
    }

    let event_time = parse_time(
        str_field(record, "eventTime").ok_or_else(|| malformed("record has no eventTime"))?,
    )?;

    let s3 = record
        .get("s3")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("record has no s3 section"))?;
    let bucket = s3
        .get("bucket")
        .and_then(Value::as_object)
        .and_then(|b| str_field(b, "name"))
        .filter(|name| !name.is_empty())
        .ok_or_else(|| malformed("record has no bucket name"))?;
    let object = s3
        .get("object")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("record has no object section"))?;
    let raw_key = str_field(object, "key")
        .filter(|key| !key.is_empty())
        .ok_or_else(|| malformed("record has no object key"))?;

    Ok(NotificationEvent {
        source_location: bucket.to_string(),
        object_key: decode_key(raw_key)?,
        size_bytes: parse_size(object.get("size"))?,
        event_time,
        event_name: Some(event_name.to_string()),
        etag: str_field(object, "eTag").map(String::from),
        version_id: str_field(object, "versionId").map(String::from),
        sequencer: str_field(object, "sequencer").map(String::from),
    })
}

fn parse_eventbridge(event: &Map<String, Value>) -> Result<NotificationEvent, PipelineError> {
    let detail_type = str_field(event, "detail-type")
        .ok_or_else(|| malformed("EventBridge event has no detail-type"))?;
    if detail_type != EVENTBRIDGE_OBJECT_CREATED {
        return Err(malformed(format!(
            "event '{}' is not an object-created event",
            detail_type
        )));
    }

    let event_time =
        parse_time(str_field(event, "time").ok_or_else(|| malformed("event has no time"))?)?;

    let detail = event
        .get("detail")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("EventBridge event has no detail"))?;
    let bucket = detail
        .get("bucket")
        .and_then(Value::as_object)
        .and_then(|b| str_field(b, "name"))
        .filter(|name| !name.is_empty())
        .ok_or_else(|| malformed("event has no bucket name"))?;
    let object = detail
        .get("object")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("event has no object section"))?;
    // EventBridge carries keys verbatim
    let key = str_field(object, "key")
        .filter(|key| !key.is_empty())
        .ok_or_else(|| malformed("event has no object key"))?;

    Ok(NotificationEvent {
        source_location: bucket.to_string(),
        object_key: key.to_string(),
        size_bytes: parse_size(object.get("size"))?,
        event_time,
        event_name: Some(detail_type.to_string()),
        etag: str_field(object, "etag").map(String::from),
        version_id: str_field(object, "version-id").map(String::from),
        sequencer: str_field(object, "sequencer").map(String::from),
    })
}

fn str_field<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    object.get(name).and_then(Value::as_str)
}

fn parse_nested(message: &str) -> Result<Value, PipelineError> {
    serde_json::from_str(message)
        .map_err(|e| malformed(format!("nested message is not valid JSON: {}", e)))
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, PipelineError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| malformed(format!("event time '{}' is not RFC 3339", value)))
}

fn parse_size(value: Option<&Value>) -> Result<u64, PipelineError> {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| malformed(format!("object size {} is not a non-negative integer", n))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| malformed(format!("object size '{}' is not numeric", s))),
        Some(_) => Err(malformed("object size is not numeric")),
        None => Err(malformed("record has no object size")),
    }
}

/// S3 notifications form-encode keys: `+` is a space and everything else is percent-encoded.
fn decode_key(raw: &str) -> Result<String, PipelineError> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|key| key.into_owned())
        .map_err(|_| malformed(format!("object key '{}' does not decode to UTF-8", raw)))
}

fn split_layer(value: &Value, depth: usize) -> Vec<Value> {
    if depth > MAX_ENVELOPE_DEPTH {
        return vec![value.clone()];
    }
    let Some(object) = value.as_object() else {
        return vec![value.clone()];
    };

    if let Some(records) = object.get("Records").and_then(Value::as_array) {
        if records.is_empty() {
            return vec![value.clone()];
        }
        return records
            .iter()
            .flat_map(|record| split_record(record, depth))
            .map(|record| {
                let mut wrapper = object.clone();
                wrapper.insert("Records".to_string(), Value::Array(vec![record]));
                Value::Object(wrapper)
            })
            .collect();
    }

    if str_field(object, "Type") == Some("Notification") {
        if let Some(message) = str_field(object, "Message") {
            return split_nested(message, depth)
                .into_iter()
                .map(|inner| replace_field(value, &["Message"], inner))
                .collect();
        }
    }

    vec![value.clone()]
}

fn split_record(record: &Value, depth: usize) -> Vec<Value> {
    let Some(object) = record.as_object() else {
        return vec![record.clone()];
    };

    let source = str_field(object, "eventSource").or_else(|| str_field(object, "EventSource"));
    let path: &[&str] = match source {
        Some("aws:sns") => &["Sns", "Message"],
        Some("aws:sqs") => &["body"],
        _ => return vec![record.clone()],
    };

    let nested = path
        .iter()
        .try_fold(record, |current, field| current.get(*field))
        .and_then(Value::as_str);
    match nested {
        Some(message) => split_nested(message, depth)
            .into_iter()
            .map(|inner| replace_field(record, path, inner))
            .collect(),
        None => vec![record.clone()],
    }
}

/// Split a JSON-in-a-string layer, returning the serialized parts.
fn split_nested(message: &str, depth: usize) -> Vec<String> {
    match serde_json::from_str::<Value>(message) {
        Ok(inner) => {
            let parts = split_layer(&inner, depth + 1);
            if parts.len() <= 1 {
                return vec![message.to_string()];
            }
            parts.iter().map(Value::to_string).collect()
        }
        Err(_) => vec![message.to_string()],
    }
}

fn replace_field(value: &Value, path: &[&str], replacement: String) -> Value {
    let mut copy = value.clone();
    set_path(&mut copy, path, replacement);
    copy
}

fn set_path(value: &mut Value, path: &[&str], replacement: String) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    let Some(object) = value.as_object_mut() else {
        return;
    };
    if rest.is_empty() {
        object.insert(first.to_string(), Value::String(replacement));
    } else if let Some(next) = object.get_mut(*first) {
        set_path(next, rest, replacement);
    }
}
