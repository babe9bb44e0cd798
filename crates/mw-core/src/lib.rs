//! Core data model for the maxwell CDC sink: decoded events, the key coder,
//! the config record, and the `Sink`/`QueryableSink` trait pair both
//! backends implement.
//!
//! This crate is pure — no Kafka, HTTP, Elasticsearch, or sled handles
//! live here. [`mw_io`](../mw_io/index.html) wires this data model to the
//! actual backends.

pub mod config;
pub mod error;
pub mod event;
pub mod keys;
pub mod sink;

pub use config::Config;
pub use error::DecodeError;
pub use event::{decode, DecodedEvent, DecodedKey, EventType};
pub use sink::{LogQuery, QueryEntry, QueryableSink, RowQuery, Sink};
