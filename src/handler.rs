use async_trait::async_trait;

use crate::cursor::Cursor;
use crate::pb::sf::substreams::rpc::v2::{BlockScopedData, BlockUndoSignal};

/// Receives the well-ordered stream of block outputs and undo signals.
///
/// The sink calls the handler synchronously from its receive loop, in the
/// exact order messages arrive from the server (modulo the undo buffer's
/// finality delay). Persist `cursor` atomically with your own side effects:
/// handing it back to [`Sinker::run`] after a restart resumes on the very
/// next block.
///
/// A returned error aborts the run, unless it is wrapped with
/// [`retryable`](crate::retryable), in which case the sink reconnects after a
/// backoff.
///
/// # Example
///
/// ```rust,ignore
/// struct Printer;
///
/// #[async_trait::async_trait]
/// impl SinkHandler for Printer {
///     async fn handle_block_scoped_data(
///         &mut self,
///         data: &BlockScopedData,
///         is_live: Option<bool>,
///         cursor: &Cursor,
///     ) -> anyhow::Result<()> {
///         let clock = data.clock.as_ref().expect("clock is always set");
///         println!("block #{} (live: {is_live:?}, cursor: {cursor})", clock.number);
///         Ok(())
///     }
///
///     async fn handle_block_undo_signal(
///         &mut self,
///         undo: &BlockUndoSignal,
///         cursor: &Cursor,
///     ) -> anyhow::Result<()> {
///         anyhow::bail!("unexpected reorg: {undo:?}")
///     }
/// }
/// ```
///
/// [`Sinker::run`]: crate::Sinker::run
#[async_trait]
pub trait SinkHandler: Send {
    /// Handles one block's worth of module output.
    ///
    /// `is_live` is `None` unless a liveness checker is configured on the
    /// sinker. `cursor` points to this very block.
    async fn handle_block_scoped_data(
        &mut self,
        data: &BlockScopedData,
        is_live: Option<bool>,
        cursor: &Cursor,
    ) -> anyhow::Result<()>;

    /// Handles a chain reorganization: every block strictly after
    /// `undo.last_valid_block` must be discarded.
    ///
    /// Never called when the sinker runs with `final_blocks_only` or with an
    /// undo buffer deep enough to absorb the fork.
    async fn handle_block_undo_signal(
        &mut self,
        undo: &BlockUndoSignal,
        cursor: &Cursor,
    ) -> anyhow::Result<()>;

    /// Optional extension, invoked exactly once when a bounded block range
    /// has been fully consumed (never on error, cancellation or unbounded
    /// streaming). `cursor` is the last cursor seen on the stream.
    async fn handle_block_range_completion(&mut self, cursor: &Cursor) -> anyhow::Result<()> {
        let _ = cursor;
        Ok(())
    }
}
