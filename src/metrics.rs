//! Process-global prometheus collectors.
//!
//! Names are stable, operator dashboards depend on them. Collectors register
//! into the default registry on first use; when several sinkers run in one
//! process they aggregate into the same series.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use prometheus::{
    IntCounter, IntGauge, IntGaugeVec, register_int_counter, register_int_gauge,
    register_int_gauge_vec,
};

pub(crate) static DATA_MESSAGE_COUNT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "substreams_sink_data_message",
        "Number of block scoped data messages received"
    )
    .unwrap()
});

pub(crate) static DATA_MESSAGE_SIZE_BYTES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "substreams_sink_data_message_size_bytes",
        "Total size of block scoped data messages received, in bytes"
    )
    .unwrap()
});

pub(crate) static UNDO_MESSAGE_COUNT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "substreams_sink_undo_message",
        "Number of block undo signals received"
    )
    .unwrap()
});

pub(crate) static UNKNOWN_MESSAGE_COUNT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "substreams_sink_unknown_message",
        "Number of unknown messages received"
    )
    .unwrap()
});

pub(crate) static PROGRESS_MESSAGE_COUNT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "substreams_sink_progress_message",
        "Number of progress messages received"
    )
    .unwrap()
});

pub(crate) static PROGRESS_TOTAL_PROCESSED_BLOCKS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "substreams_sink_progress_message_total_processed_blocks",
        "Total number of blocks processed server-side, as reported by the last progress message"
    )
    .unwrap()
});

pub(crate) static PROGRESS_LAST_BLOCK: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "substreams_sink_progress_message_last_block",
        "Highest block reached by a running job, per stage",
        &["stage"]
    )
    .unwrap()
});

pub(crate) static PROGRESS_LAST_CONTIGUOUS_BLOCK: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "substreams_sink_progress_message_last_contiguous_block",
        "End of the contiguous completed range, per stage",
        &["stage"]
    )
    .unwrap()
});

pub(crate) static PROGRESS_RUNNING_JOBS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "substreams_sink_progress_message_running_jobs",
        "Number of running jobs, per stage",
        &["stage"]
    )
    .unwrap()
});

pub(crate) static ERROR_COUNT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "substreams_sink_error",
        "Number of errors encountered on the substreams stream, retryable or not"
    )
    .unwrap()
});

pub(crate) static BACKPROCESSING_COMPLETION: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "substreams_sink_backprocessing_completion",
        "1 once the initial backfill finished and live blocks started flowing"
    )
    .unwrap()
});

pub(crate) static HEAD_BLOCK_NUMBER: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("head_block_number", "Number of the last block received").unwrap()
});

pub(crate) static HEAD_BLOCK_TIME_DRIFT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "head_block_time_drift",
        "Seconds between now and the last received block's timestamp"
    )
    .unwrap()
});

/// Records the head-block drift from a block timestamp.
pub(crate) fn set_head_block_time_drift(timestamp: &prost_types::Timestamp) {
    let Ok(seconds) = u64::try_from(timestamp.seconds) else {
        return;
    };
    let block_time = UNIX_EPOCH + Duration::from_secs(seconds);

    if let Ok(drift) = SystemTime::now().duration_since(block_time) {
        HEAD_BLOCK_TIME_DRIFT.set(i64::try_from(drift.as_secs()).unwrap_or(i64::MAX));
    } else {
        HEAD_BLOCK_TIME_DRIFT.set(0);
    }
}

/// Converts a block number to the gauge's signed domain.
pub(crate) fn block_gauge_value(number: u64) -> i64 {
    i64::try_from(number).unwrap_or(i64::MAX)
}
