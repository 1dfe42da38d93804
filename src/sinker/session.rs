use std::collections::HashMap;

use prost::Message as _;
use tokio_stream::StreamExt as _;
use tokio_util::sync::CancellationToken;
use tonic::{Code, Status};
use tracing::{debug, info, trace, warn};

use super::undo_buffer::UndoBuffer;
use crate::cursor::Cursor;
use crate::endpoint::ResponseStream;
use crate::error::{SinkError, is_retryable};
use crate::handler::SinkHandler;
use crate::liveness::LivenessChecker;
use crate::metrics::{self, block_gauge_value};
use crate::pb::sf::substreams::rpc::v2::{
    BlockScopedData, BlockUndoSignal, ModulesProgress, Response, SessionInit, response,
};
use crate::stats::Stats;
use crate::types::BlockRef;

/// How a session ended when it did not fail.
pub(crate) enum SessionEnd {
    /// The server closed the stream: the stop block was reached.
    StopBlockReached,
    /// The caller's cancellation token fired.
    Cancelled,
}

/// Classifies a stream-level status into fatal or retryable.
pub(crate) fn classify_stream_error(status: Status) -> SinkError {
    match status.code() {
        // Bad credentials or a bad request will not fix themselves on
        // reconnect, surface immediately.
        Code::Unauthenticated | Code::InvalidArgument => SinkError::Stream(status),
        _ => SinkError::retryable(SinkError::Stream(status)),
    }
}

/// One live `Blocks` call: the receive loop, message dispatch and
/// per-message bookkeeping.
///
/// The session borrows the sinker's mutable state (active cursor, undo
/// buffer, resolved start block) so that everything it learned survives into
/// the next reconnection attempt.
pub(crate) struct StreamSession<'a, H: SinkHandler> {
    pub handler: &'a mut H,
    pub cursor: &'a mut Cursor,
    pub resolved_start_block: &'a mut Option<u64>,
    pub buffer: Option<&'a mut UndoBuffer>,
    pub liveness: Option<&'a dyn LivenessChecker>,
    pub production_mode: bool,
    pub stats: &'a Stats,
    pub cancel: &'a CancellationToken,
}

impl<H: SinkHandler> StreamSession<'_, H> {
    /// Drives the stream to completion.
    ///
    /// The returned boolean tells whether at least one message was received;
    /// the sinker uses it to reset the reconnection backoff, since a session
    /// that delivered even one message was making progress.
    pub async fn run(mut self, mut stream: ResponseStream) -> (bool, Result<SessionEnd, SinkError>) {
        let mut received_message = false;

        loop {
            let item = tokio::select! {
                () = self.cancel.cancelled() => {
                    debug!("session cancelled");
                    return (received_message, Ok(SessionEnd::Cancelled));
                }
                item = stream.next() => item,
            };

            let response = match item {
                None => return (received_message, Ok(SessionEnd::StopBlockReached)),
                Some(Err(status)) => {
                    if self.cancel.is_cancelled() {
                        // Our own cancellation tore the stream down, not an
                        // error.
                        return (received_message, Ok(SessionEnd::Cancelled));
                    }
                    return (received_message, Err(classify_stream_error(status)));
                }
                Some(Ok(response)) => response,
            };

            received_message = true;

            if let Err(err) = self.dispatch(response).await {
                return (received_message, Err(err));
            }
        }
    }

    async fn dispatch(&mut self, response: Response) -> Result<(), SinkError> {
        match response.message {
            Some(response::Message::Session(session)) => {
                self.on_session(&session);
                Ok(())
            }
            Some(response::Message::Progress(progress)) => {
                self.on_progress(&progress);
                Ok(())
            }
            Some(response::Message::BlockScopedData(data)) => self.on_block_data(data).await,
            Some(response::Message::BlockUndoSignal(undo)) => self.on_undo(&undo).await,
            Some(
                response::Message::DebugSnapshotData(_)
                | response::Message::DebugSnapshotComplete(_),
            ) => {
                warn!("received a debug snapshot message, there is no reason to receive those here");
                Ok(())
            }
            None => {
                metrics::UNKNOWN_MESSAGE_COUNT.inc();
                warn!("received unknown type of message");
                Ok(())
            }
        }
    }

    fn on_session(&mut self, session: &SessionInit) {
        if self.resolved_start_block.is_some() {
            warn!(trace_id = %session.trace_id, "extra session init message received, ignoring");
            return;
        }

        info!(
            trace_id = %session.trace_id,
            resolved_start_block = session.resolved_start_block,
            linear_handoff_block = session.linear_handoff_block,
            max_parallel_workers = session.max_parallel_workers,
            "session initialized with remote endpoint"
        );
        *self.resolved_start_block = Some(session.resolved_start_block);
    }

    fn on_progress(&mut self, progress: &ModulesProgress) {
        metrics::PROGRESS_MESSAGE_COUNT.inc();

        let mut total_processed: u64 = 0;
        let mut jobs_per_stage: HashMap<u32, u64> = HashMap::new();
        let mut last_block_per_stage: HashMap<u32, u64> = HashMap::new();

        for job in &progress.running_jobs {
            total_processed = total_processed.saturating_add(job.processed_blocks);
            *jobs_per_stage.entry(job.stage).or_default() += 1;

            let job_end = job.start_block.saturating_add(job.processed_blocks);
            let last_block = last_block_per_stage.entry(job.stage).or_default();
            *last_block = (*last_block).max(job_end);
        }

        let stage_count = progress.stages.len();
        for (index, stage) in progress.stages.iter().enumerate() {
            let stage_label = index.to_string();
            let stage_index = u32::try_from(index).unwrap_or(u32::MAX);

            let running = jobs_per_stage.get(&stage_index).copied().unwrap_or(0);
            metrics::PROGRESS_RUNNING_JOBS
                .with_label_values(&[&stage_label])
                .set(i64::try_from(running).unwrap_or(i64::MAX));

            if let Some(last_block) = last_block_per_stage.get(&stage_index) {
                metrics::PROGRESS_LAST_BLOCK
                    .with_label_values(&[&stage_label])
                    .set(block_gauge_value(*last_block));
            }

            for range in &stage.completed_ranges {
                total_processed =
                    total_processed.saturating_add(range.end_block.saturating_sub(range.start_block));
            }

            // In production mode the last stage fills in around the resolved
            // start block, so its contiguous range is the one containing
            // that block. Every other stage completes front to back and the
            // first range is the contiguous one.
            let contiguous = if self.production_mode && index + 1 == stage_count {
                let active_block = self.resolved_start_block.unwrap_or(0);
                stage
                    .completed_ranges
                    .iter()
                    .find(|range| range.start_block <= active_block && active_block <= range.end_block)
            } else {
                stage.completed_ranges.first()
            };

            if let Some(range) = contiguous {
                metrics::PROGRESS_LAST_CONTIGUOUS_BLOCK
                    .with_label_values(&[&stage_label])
                    .set(block_gauge_value(range.end_block));
            }
        }

        // The server reports cumulative state, set instead of add.
        metrics::PROGRESS_TOTAL_PROCESSED_BLOCKS.set(block_gauge_value(total_processed));

        trace!(
            running_jobs = progress.running_jobs.len(),
            stages = stage_count,
            "received response Progress"
        );
    }

    async fn on_block_data(&mut self, data: BlockScopedData) -> Result<(), SinkError> {
        let block = data.clock.as_ref().map(BlockRef::from).unwrap_or_default();
        trace!(
            at = %block,
            module = data.output.as_ref().map_or("", |output| output.name.as_str()),
            "received response BlockScopedData"
        );

        // Stats and head metrics reflect the state of the stream, not the
        // state of the buffer.
        self.stats.record_block(&block);
        self.stats.record_bytes(data.encoded_len());
        metrics::HEAD_BLOCK_NUMBER.set(block_gauge_value(block.number));
        if let Some(timestamp) = data.clock.as_ref().and_then(|clock| clock.timestamp.as_ref()) {
            metrics::set_head_block_time_drift(timestamp);
        }
        metrics::DATA_MESSAGE_COUNT.inc();
        metrics::DATA_MESSAGE_SIZE_BYTES.inc_by(data.encoded_len() as u64);
        metrics::BACKPROCESSING_COMPLETION.set(1);

        *self.cursor = Cursor::parse(data.cursor.clone())?;

        let released = match self.buffer.as_deref_mut() {
            None => vec![data],
            Some(buffer) => buffer.handle_block_data(data),
        };

        for block_data in released {
            let block_cursor = Cursor::parse(block_data.cursor.clone())?;
            let is_live = self.liveness.map(|checker| {
                block_data.clock.as_ref().is_some_and(|clock| checker.is_live(clock))
            });

            if let Err(source) = self
                .handler
                .handle_block_scoped_data(&block_data, is_live, &block_cursor)
                .await
            {
                let number = block_data.clock.as_ref().map_or(0, |clock| clock.number);
                return Err(handler_error(block_cursor, number, source));
            }
        }

        Ok(())
    }

    async fn on_undo(&mut self, undo: &BlockUndoSignal) -> Result<(), SinkError> {
        let block = undo.last_valid_block.as_ref().map(BlockRef::from).unwrap_or_default();
        debug!(
            last_valid_block = %block,
            last_valid_cursor = %undo.last_valid_cursor,
            "received response BlockUndoSignal"
        );

        self.stats.record_block(&block);
        metrics::UNDO_MESSAGE_COUNT.inc();
        metrics::HEAD_BLOCK_NUMBER.set(block_gauge_value(block.number));
        // Undo signals carry no block time, the drift gauge keeps its value.

        let cursor = Cursor::parse(undo.last_valid_cursor.clone())?;
        *self.cursor = cursor.clone();

        match self.buffer.as_deref_mut() {
            None => {
                if let Err(source) = self.handler.handle_block_undo_signal(undo, &cursor).await {
                    return Err(handler_error(cursor, block.number, source));
                }
                Ok(())
            }
            // A fork deeper than the buffer fails right here; the handler
            // never sees an undo signal absorbed by the buffer.
            Some(buffer) => buffer.handle_undo(undo),
        }
    }
}

fn handler_error(cursor: Cursor, block: u64, source: anyhow::Error) -> SinkError {
    let retry = is_retryable(&source);
    let err = SinkError::Handler { cursor, block, source };
    if retry { SinkError::retryable(err) } else { err }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pb::sf::substreams::rpc::v2::{BlockRange, Job, Stage};
    use crate::test_utils::CaptureHandler;

    #[test]
    fn production_mode_progress_tracks_the_containing_range_for_the_last_stage() {
        let mut handler = CaptureHandler::default();
        let mut cursor = Cursor::new_blank();
        let mut resolved = Some(500);
        let stats = crate::stats::Stats::new();
        let cancel = CancellationToken::new();

        let mut session = StreamSession {
            handler: &mut handler,
            cursor: &mut cursor,
            resolved_start_block: &mut resolved,
            buffer: None,
            liveness: None,
            production_mode: true,
            stats: stats.as_ref(),
            cancel: &cancel,
        };

        session.on_progress(&ModulesProgress {
            running_jobs: vec![Job {
                stage: 1,
                start_block: 600,
                stop_block: 700,
                processed_blocks: 50,
                duration_ms: 1_000,
            }],
            modules_stats: Vec::new(),
            stages: vec![
                Stage {
                    modules: vec!["map_extract".to_string()],
                    completed_ranges: vec![BlockRange { start_block: 100, end_block: 200 }],
                },
                Stage {
                    modules: vec!["map_events".to_string()],
                    completed_ranges: vec![
                        BlockRange { start_block: 0, end_block: 300 },
                        BlockRange { start_block: 450, end_block: 550 },
                    ],
                },
            ],
        });

        // Non-last stage: first completed range. Last stage in production
        // mode: the range containing the resolved start block (500).
        assert_eq!(metrics::PROGRESS_LAST_CONTIGUOUS_BLOCK.with_label_values(&["0"]).get(), 200);
        assert_eq!(metrics::PROGRESS_LAST_CONTIGUOUS_BLOCK.with_label_values(&["1"]).get(), 550);
        assert_eq!(metrics::PROGRESS_LAST_BLOCK.with_label_values(&["1"]).get(), 650);
        assert_eq!(metrics::PROGRESS_RUNNING_JOBS.with_label_values(&["1"]).get(), 1);
        // 50 running + 100 + 300 + 100 completed, cumulative server state.
        assert_eq!(metrics::PROGRESS_TOTAL_PROCESSED_BLOCKS.get(), 550);
    }

    #[test]
    fn extra_session_init_is_ignored() {
        let mut handler = CaptureHandler::default();
        let mut cursor = Cursor::new_blank();
        let mut resolved = None;
        let stats = crate::stats::Stats::new();
        let cancel = CancellationToken::new();

        let mut session = StreamSession {
            handler: &mut handler,
            cursor: &mut cursor,
            resolved_start_block: &mut resolved,
            buffer: None,
            liveness: None,
            production_mode: false,
            stats: stats.as_ref(),
            cancel: &cancel,
        };

        session.on_session(&SessionInit { resolved_start_block: 100, ..Default::default() });
        session.on_session(&SessionInit { resolved_start_block: 999, ..Default::default() });

        assert_eq!(resolved, Some(100));
    }

    #[test]
    fn unauthenticated_is_fatal() {
        let err = classify_stream_error(Status::unauthenticated("bad token"));

        assert!(!err.is_retryable());
    }

    #[test]
    fn invalid_argument_is_fatal() {
        let err = classify_stream_error(Status::invalid_argument("bad start block"));

        assert!(!err.is_retryable());
    }

    #[test]
    fn other_statuses_are_retryable() {
        for status in [
            Status::unavailable("server restarting"),
            Status::internal("boom"),
            Status::deadline_exceeded("slow"),
            Status::cancelled("server side cancel"),
        ] {
            let code = status.code();
            assert!(classify_stream_error(status).is_retryable(), "code {code:?}");
        }
    }

    #[test]
    fn handler_error_keeps_the_retryable_marker() {
        let cursor = Cursor::new_blank();

        let plain = handler_error(cursor.clone(), 10, anyhow::anyhow!("nope"));
        assert!(!plain.is_retryable());

        let transient = handler_error(cursor, 10, crate::error::retryable(anyhow::anyhow!("later")));
        assert!(transient.is_retryable());
    }
}
