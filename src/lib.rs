//! Embeddable Substreams sink.
//!
//! This crate consumes a server-streamed sequence of block-scoped data from
//! a Substreams endpoint, reconciles chain reorganizations on behalf of a
//! downstream consumer, and delivers a well-ordered stream of block outputs
//! and undo signals to a user-supplied [`SinkHandler`] with cursor-based
//! resumability.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use substreams_sink::{
//!     Cursor, EndpointConfig, SinkHandler, SinkerBuilder, SubstreamsMode,
//! };
//! use substreams_sink::pb::sf::substreams::rpc::v2::{BlockScopedData, BlockUndoSignal};
//!
//! struct Printer;
//!
//! #[async_trait::async_trait]
//! impl SinkHandler for Printer {
//!     async fn handle_block_scoped_data(
//!         &mut self,
//!         data: &BlockScopedData,
//!         is_live: Option<bool>,
//!         cursor: &Cursor,
//!     ) -> anyhow::Result<()> {
//!         // Persist your output and `cursor` atomically here.
//!         Ok(())
//!     }
//!
//!     async fn handle_block_undo_signal(
//!         &mut self,
//!         undo: &BlockUndoSignal,
//!         cursor: &Cursor,
//!     ) -> anyhow::Result<()> {
//!         // Discard everything above `undo.last_valid_block`.
//!         Ok(())
//!     }
//! }
//!
//! # async fn example(package: substreams_sink::pb::sf::substreams::v1::Package)
//! # -> Result<(), substreams_sink::SinkError> {
//! let mut sinker = SinkerBuilder::new(
//!     SubstreamsMode::Production,
//!     package,
//!     "map_events",
//!     "a1b2c3",
//!     EndpointConfig::new("mainnet.eth.streamingfast.io:443"),
//! )
//! .undo_buffer_size(12)
//! .build()?;
//!
//! let resume_from = Cursor::new_blank(); // load the persisted cursor here
//! let last_cursor = sinker.run(resume_from, &mut Printer).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Lifecycle
//!
//! [`Sinker::run`] opens one server-streaming RPC at a time, dispatches its
//! messages into the handler and threads the resume cursor across
//! reconnections. Transient failures reconnect behind an exponential
//! backoff (15 non-productive attempts by default); authentication and
//! invalid-request errors, plain handler errors and cursor decoding
//! failures abort the run. Cancelling the
//! [token](Sinker::cancellation_token) shuts the sinker down cleanly.

pub mod endpoint;
pub mod pb;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod cursor;
mod error;
mod handler;
mod liveness;
mod metrics;
mod sinker;
mod stats;
mod types;

pub use cursor::Cursor;
pub use endpoint::{AuthKind, Authenticator, EndpointConfig};
pub use error::{RetryableError, SinkError, is_retryable, retryable};
pub use handler::SinkHandler;
pub use liveness::{DeltaLivenessChecker, LivenessChecker};
pub use sinker::{
    IGNORE_OUTPUT_MODULE_TYPE, INFER_OUTPUT_MODULE_FROM_PACKAGE, Sinker, SinkerBuilder,
    SubstreamsMode,
};
pub use types::{BlockRange, BlockRef};
