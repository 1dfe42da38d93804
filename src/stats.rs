use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::types::BlockRef;

/// Stream throughput accounting, logged periodically while the sinker runs
/// and once more on the way out.
#[derive(Debug, Default)]
pub(crate) struct Stats {
    blocks: AtomicU64,
    bytes: AtomicU64,
    blocks_at_last_log: AtomicU64,
    last_block: Mutex<Option<BlockRef>>,
}

impl Stats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_block(&self, block: &BlockRef) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
        *self.last_block.lock().expect("stats lock poisoned") = Some(block.clone());
    }

    pub fn record_bytes(&self, bytes: usize) {
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn last_block(&self) -> Option<BlockRef> {
        self.last_block.lock().expect("stats lock poisoned").clone()
    }

    /// Spawns the periodic logger; it stops when `cancel` fires.
    pub fn start(self: Arc<Self>, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately, nothing to report yet.
            interval.tick().await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => self.log_progress(every),
                }
            }
        })
    }

    fn log_progress(&self, every: Duration) {
        let blocks = self.blocks.load(Ordering::Relaxed);
        let previous = self.blocks_at_last_log.swap(blocks, Ordering::Relaxed);
        let block_rate = (blocks - previous) as f64 / every.as_secs_f64();

        info!(
            blocks,
            block_rate = format!("{block_rate:.1} blocks/s"),
            bytes = self.bytes.load(Ordering::Relaxed),
            last_block = %self.display_last_block(),
            "substreams sink stats"
        );
    }

    pub fn log_final(&self) {
        info!(
            blocks = self.blocks.load(Ordering::Relaxed),
            bytes = self.bytes.load(Ordering::Relaxed),
            last_block = %self.display_last_block(),
            "substreams sink stats (final)"
        );
    }

    fn display_last_block(&self) -> String {
        self.last_block().map_or_else(|| "<none>".to_string(), |block| block.to_string())
    }
}
