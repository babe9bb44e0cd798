//! Pipeline supervisor (§4.9): wires the consumer, batching driver, and
//! (LDB only) the query HTTP surface together, then runs until a fatal
//! error tears the process down (§7). There is no graceful shutdown path.

use std::time::Duration;

use mw_core::{Config, Sink};
use tracing::{info, warn};

use crate::batching::BatchingDriver;
use crate::es::EsSink;
use crate::http;
use crate::kafka::PartitionConsumer;
use crate::ldb::LdbSink;

const BATCH_TICK: Duration = Duration::from_secs(5);
const RETENTION_TICK: Duration = Duration::from_secs(15);

pub async fn run_es(config: Config) -> anyhow::Result<()> {
    let sink = EsSink::new(config.clone())?;
    run(sink, config).await
}

pub async fn run_ldb(config: Config) -> anyhow::Result<()> {
    let primary = LdbSink::open(config.clone())?;
    let query_sink = primary.share(config.clone());

    let listener = tokio::net::TcpListener::bind(&config.misc.listen_addr).await?;
    info!(addr = %config.misc.listen_addr, "query service listening");
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, http::router(query_sink)).await {
            tracing::error!(%err, "query service exited");
        }
    });

    run(primary, config).await
}

/// Shared driver loop: consumer messages feed the batching driver, a 5s
/// tick forces a flush, and a 15s tick runs the retention sweep. A decode
/// failure, Kafka error, or flush failure is fatal; a retention sweep
/// failure is logged and the tick is skipped — the sweep never blocks
/// ingestion.
async fn run<S: Sink>(mut sink: S, config: Config) -> anyhow::Result<()> {
    sink.initialize().await?;
    let resume_offset = sink.last_offset().await?;
    info!(resume_offset, "resuming consumption");

    let consumer =
        PartitionConsumer::connect(&config.max_well.brokers, &config.max_well.topic, resume_offset)?;
    let mut driver = BatchingDriver::new(sink, config.max_well.cache_size);

    let mut batch_tick = tokio::time::interval(BATCH_TICK);
    let mut retention_tick = tokio::time::interval(RETENTION_TICK);

    loop {
        tokio::select! {
            record = consumer.recv() => {
                let record = record?;
                let event = mw_core::decode(&record.key, &record.value, record.offset)?;
                driver.submit(event).await?;
            }
            _ = batch_tick.tick() => {
                driver.tick().await?;
            }
            _ = retention_tick.tick() => {
                if let Err(err) = driver.sink_mut().clear_log().await {
                    warn!(%err, "retention sweep failed, skipping this tick");
                }
            }
        }
    }
}
