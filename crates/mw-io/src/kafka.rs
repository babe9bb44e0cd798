//! Thin wrapper over `rdkafka` delivering an ordered `(offset, key, value)`
//! stream from a single partition. The Kafka wire protocol itself is out of
//! scope (§1) — this module only assigns partition 0 and seeks to the
//! resume offset the offset store hands back.

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message as _;
use rdkafka::{Offset, TopicPartitionList};

/// A single decoded wire record, prior to Maxwell decoding.
pub struct RawRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub offset: i64,
}

pub struct PartitionConsumer {
    consumer: StreamConsumer,
}

impl PartitionConsumer {
    /// Connects to `brokers` and assigns partition 0 of `topic`, starting
    /// at `resume_offset + 1`, or at the broker's oldest available offset
    /// if `resume_offset < 0` (fresh start — §4.6).
    pub fn connect(brokers: &[String], topic: &str, resume_offset: i64) -> anyhow::Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers.join(","))
            .set("enable.partition.eof", "false")
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", "6000")
            .create()?;

        let offset = if resume_offset < 0 {
            Offset::Beginning
        } else {
            Offset::Offset(resume_offset + 1)
        };

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(topic, 0, offset)?;
        consumer.assign(&tpl)?;

        Ok(PartitionConsumer { consumer })
    }

    /// Awaits the next message on the assigned partition. Any error here is
    /// fatal to the pipeline (§7): a Kafka-level failure means the consumer
    /// can no longer guarantee ordered, gapless delivery.
    pub async fn recv(&self) -> anyhow::Result<RawRecord> {
        let msg = self.consumer.recv().await?;
        let key = msg.key().unwrap_or_default().to_vec();
        let value = msg
            .payload()
            .ok_or_else(|| anyhow::anyhow!("message at offset {} has no payload", msg.offset()))?
            .to_vec();
        Ok(RawRecord {
            key,
            value,
            offset: msg.offset(),
        })
    }
}
