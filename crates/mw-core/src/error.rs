use thiserror::Error;

/// Errors raised while decoding a raw Kafka `(key, value)` pair into a
/// [`crate::event::DecodedEvent`].
///
/// Per the decoder contract, a malformed *value* or an unrecognized `type`
/// are both fatal to the pipeline — the supervisor logs and aborts rather
/// than skipping, to avoid silently desyncing the downstream sink from the
/// upstream binlog.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("value is not a JSON object: {0}")]
    ValueNotObject(serde_json::Error),

    #[error("value is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("unrecognized event type: {0}")]
    UnknownEventType(String),
}
