//! Kafka ingestion, the batching driver, both sink backends, the query
//! HTTP surface, and the pipeline supervisor that wires them together.

pub mod batching;
pub mod es;
pub mod http;
pub mod kafka;
pub mod ldb;
pub mod supervisor;

pub use batching::BatchingDriver;
pub use kafka::{PartitionConsumer, RawRecord};
