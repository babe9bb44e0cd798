//! Batching driver (§4.5): accumulates decoded events into a fixed-size
//! cache and flushes on size or tick. The cache has exactly one owner —
//! this struct — so no locking is needed around it (§5).

use mw_core::{DecodedEvent, Sink};
use tracing::info;

pub struct BatchingDriver<S> {
    cache: Vec<DecodedEvent>,
    capacity: usize,
    sink: S,
}

impl<S: Sink> BatchingDriver<S> {
    pub fn new(sink: S, capacity: usize) -> Self {
        BatchingDriver {
            cache: Vec::with_capacity(capacity),
            capacity,
            sink,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Appends `event` to the cache; flushes synchronously if the cache has
    /// reached its configured capacity.
    pub async fn submit(&mut self, event: DecodedEvent) -> anyhow::Result<()> {
        self.cache.push(event);
        if self.cache.len() >= self.capacity {
            self.flush().await?;
        }
        Ok(())
    }

    /// Flushes unconditionally; a no-op when the cache is empty.
    pub async fn tick(&mut self) -> anyhow::Result<()> {
        self.flush().await
    }

    async fn flush(&mut self) -> anyhow::Result<()> {
        if self.cache.is_empty() {
            return Ok(());
        }

        let last_offset = self.cache.last().map(|e| e.offset).unwrap_or(-1);
        self.sink.flush(&self.cache).await?;
        info!(count = self.cache.len(), offset = last_offset, "save");
        self.cache.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct CountingSink {
        flushes: Arc<AtomicI64>,
        last_seen: Arc<AtomicI64>,
    }

    #[async_trait]
    impl Sink for CountingSink {
        async fn initialize(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn last_offset(&self) -> anyhow::Result<i64> {
            Ok(-1)
        }
        async fn flush(&mut self, batch: &[DecodedEvent]) -> anyhow::Result<()> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            self.last_seen
                .store(batch.last().unwrap().offset, Ordering::SeqCst);
            Ok(())
        }
        async fn clear_log(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn mk_event(offset: i64) -> DecodedEvent {
        mw_core::decode(
            br#"{}"#,
            format!(r#"{{"database":"db","table":"t","type":"bootstrap-start","ts":1}}"#,).as_bytes(),
            offset,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn flushes_on_capacity() {
        let sink = CountingSink::default();
        let flushes = sink.flushes.clone();
        let mut driver = BatchingDriver::new(sink, 3);

        driver.submit(mk_event(1)).await.unwrap();
        driver.submit(mk_event(2)).await.unwrap();
        assert_eq!(flushes.load(Ordering::SeqCst), 0);
        driver.submit(mk_event(3)).await.unwrap();
        assert_eq!(flushes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tick_on_empty_cache_is_a_noop() {
        let sink = CountingSink::default();
        let flushes = sink.flushes.clone();
        let mut driver = BatchingDriver::new(sink, 10);
        driver.tick().await.unwrap();
        assert_eq!(flushes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tick_flushes_partial_batch() {
        let sink = CountingSink::default();
        let flushes = sink.flushes.clone();
        let last_seen = sink.last_seen.clone();
        let mut driver = BatchingDriver::new(sink, 10);
        driver.submit(mk_event(5)).await.unwrap();
        driver.tick().await.unwrap();
        assert_eq!(flushes.load(Ordering::SeqCst), 1);
        assert_eq!(last_seen.load(Ordering::SeqCst), 5);
    }
}
