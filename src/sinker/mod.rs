//! The sinker: lifecycle owner of the streaming session manager.
//!
//! [`Sinker::run`] opens server-streaming `Blocks` sessions against the
//! configured endpoint, dispatches their messages into the user handler,
//! threads the resume cursor across reconnections and gates every reconnect
//! behind an exponential backoff.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use backon::ExponentialBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info};

mod backoff;
mod builder;
mod request;
mod session;
mod undo_buffer;

pub use builder::SinkerBuilder;

use backoff::RetryBackoff;
use request::RequestBuilder;
use session::{SessionEnd, StreamSession, classify_stream_error};
use undo_buffer::UndoBuffer;

use crate::cursor::Cursor;
use crate::endpoint::{BlockStreamConnector, EndpointConfig};
use crate::error::SinkError;
use crate::handler::SinkHandler;
use crate::liveness::LivenessChecker;
use crate::metrics;
use crate::pb::sf::substreams::v1::{Module, Package};
use crate::stats::Stats;
use crate::types::BlockRange;

/// Accepted instead of the expected output module type to skip type
/// validation, for sinks that support several output types.
pub const IGNORE_OUTPUT_MODULE_TYPE: &str = "@!##_IgnoreOutputModuleType_##!@";

/// Accepted instead of the output module name to read it from the package's
/// `sink_module` field.
pub const INFER_OUTPUT_MODULE_FROM_PACKAGE: &str = "@!##_InferOutputModuleFromSpkg_##!@";

/// Server execution mode requested by the sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubstreamsMode {
    Development,
    Production,
}

impl fmt::Display for SubstreamsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubstreamsMode::Development => f.write_str("development"),
            SubstreamsMode::Production => f.write_str("production"),
        }
    }
}

/// The streaming session manager.
///
/// Built with [`SinkerBuilder`]; see the crate docs for the full lifecycle.
/// [`run`](Sinker::run) blocks until the stop block is reached, the
/// [cancellation token](Sinker::cancellation_token) fires, a fatal error
/// occurs or the reconnection backoff expires.
pub struct Sinker {
    pub(crate) mode: SubstreamsMode,
    pub(crate) package: Package,
    pub(crate) output_module: Module,
    pub(crate) output_module_hash: String,
    pub(crate) endpoint: EndpointConfig,
    pub(crate) connector: Arc<dyn BlockStreamConnector>,
    pub(crate) block_range: Option<BlockRange>,
    pub(crate) undo_buffer_size: usize,
    pub(crate) infinite_retry: bool,
    pub(crate) final_blocks_only: bool,
    pub(crate) liveness: Option<Arc<dyn LivenessChecker>>,
    pub(crate) backoff: ExponentialBuilder,
    pub(crate) stats: Arc<Stats>,
    pub(crate) cancel: CancellationToken,
    /// Start block as resolved by the server, echoed in the session init
    /// message. Drives the production-mode progress accounting.
    pub(crate) resolved_start_block: Option<u64>,
}

impl Sinker {
    pub fn block_range(&self) -> Option<BlockRange> {
        self.block_range
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn output_module(&self) -> &Module {
        &self.output_module
    }

    /// The output module's hash; consumers can warn when it changed between
    /// restarts of the process.
    pub fn output_module_hash(&self) -> &str {
        &self.output_module_hash
    }

    pub fn output_module_name(&self) -> &str {
        &self.output_module.name
    }

    /// The output module's type, always `proto:`-prefixed.
    pub fn output_module_type_prefixed(&self) -> String {
        builder::sanitize_module_type(&self.output_module_type()).1
    }

    /// The output module's type, never `proto:`-prefixed.
    pub fn output_module_type_unprefixed(&self) -> String {
        builder::sanitize_module_type(&self.output_module_type()).0
    }

    fn output_module_type(&self) -> String {
        self.output_module.output.as_ref().map_or(String::new(), |output| output.r#type.clone())
    }

    pub fn endpoint_config(&self) -> &EndpointConfig {
        &self.endpoint
    }

    /// The currently resolvable API credential, if any.
    pub fn api_token(&self) -> Option<String> {
        self.endpoint.api_token()
    }

    /// Token cancelling this sinker; may be triggered from any task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Requests a graceful shutdown: [`run`](Sinker::run) returns `Ok` with
    /// the last cursor once in-flight work settles.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Streams blocks into `handler`, resuming from `cursor`.
    ///
    /// Blocks until the stop block is reached (bounded range), the
    /// cancellation token fires, a non-retryable error occurs or the
    /// reconnection backoff expires. Returns the last cursor seen, the one
    /// to persist for the next run.
    pub async fn run<H: SinkHandler>(
        &mut self,
        cursor: Cursor,
        handler: &mut H,
    ) -> Result<Cursor, SinkError> {
        let stats_cadence = if tracing::enabled!(Level::DEBUG) {
            Duration::from_secs(5)
        } else {
            Duration::from_secs(15)
        };
        let stats_cancel = self.cancel.child_token();
        let stats_task = Arc::clone(&self.stats).start(stats_cadence, stats_cancel.clone());

        info!(
            stats_refresh_each = ?stats_cadence,
            restarting_at = %cursor.block(),
            "starting sinker"
        );

        let result = self.stream_loop(cursor, handler).await;

        stats_cancel.cancel();
        let _ = stats_task.await;
        self.stats.log_final();

        match &result {
            Ok(cursor) if self.cancel.is_cancelled() => {
                info!(last_block_seen = %cursor.block(), "sinker terminated, cancellation requested");
            }
            Ok(cursor) => {
                info!(last_block_seen = %cursor.block(), "substreams ended correctly, reached your stop block");
            }
            Err(_) => {}
        }

        result
    }

    async fn stream_loop<H: SinkHandler>(
        &mut self,
        mut cursor: Cursor,
        handler: &mut H,
    ) -> Result<Cursor, SinkError> {
        let request_builder = RequestBuilder::new(
            self.package.modules.clone().unwrap_or_default(),
            self.output_module.name.clone(),
            self.mode == SubstreamsMode::Production,
            self.final_blocks_only,
            self.block_range,
            self.undo_buffer_size,
        );

        let mut backoff = RetryBackoff::new(self.backoff.clone(), self.infinite_retry);
        // The buffer survives reconnections: its blocks were received but
        // not yet released, and the resume cursor points after them.
        let mut buffer = (self.undo_buffer_size > 0).then(|| UndoBuffer::new(self.undo_buffer_size));

        loop {
            if self.cancel.is_cancelled() {
                return Ok(cursor);
            }

            let request = request_builder.build(&cursor);
            debug!(
                start_block = request.start_block_num,
                stop_block = request.stop_block_num,
                cursor = %cursor,
                "launching substreams request"
            );

            let (received_message, outcome) = match self.connector.blocks(request).await {
                Ok(stream) => {
                    let session = StreamSession {
                        handler: &mut *handler,
                        cursor: &mut cursor,
                        resolved_start_block: &mut self.resolved_start_block,
                        buffer: buffer.as_mut(),
                        liveness: self.liveness.as_deref(),
                        production_mode: self.mode == SubstreamsMode::Production,
                        stats: self.stats.as_ref(),
                        cancel: &self.cancel,
                    };
                    session.run(stream).await
                }
                Err(SinkError::Stream(status)) => (false, Err(classify_stream_error(status))),
                // Failing to even open the stream is worth a reconnect.
                Err(err) => (false, Err(SinkError::retryable(err))),
            };

            // A session that delivered even one message was making progress.
            if received_message {
                backoff.reset();
            }

            let err = match outcome {
                Ok(SessionEnd::Cancelled) => return Ok(cursor),
                Ok(SessionEnd::StopBlockReached) => {
                    if self.block_range.is_some_and(|range| range.is_bounded()) {
                        if let Err(source) = handler.handle_block_range_completion(&cursor).await {
                            let block = cursor.block().number;
                            return Err(SinkError::Handler { cursor, block, source });
                        }
                    }
                    return Ok(cursor);
                }
                Err(err) => err,
            };

            metrics::ERROR_COUNT.inc();

            if !err.is_retryable() {
                return Err(err);
            }

            let cause = err.into_cause();
            error!(error = %cause, "substreams encountered a retryable error");

            let Some(delay) = backoff.next_delay() else {
                return Err(SinkError::BackoffExpired {
                    attempts: backoff.attempts(),
                    last: Box::new(cause),
                });
            };

            info!(sleep = ?delay, "sleeping before re-connecting");
            tokio::select! {
                () = self.cancel.cancelled() => return Ok(cursor),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
