use crate::cursor::Cursor;
use crate::pb::sf::substreams::rpc::v2::Request;
use crate::pb::sf::substreams::v1::Modules;
use crate::types::BlockRange;

/// Translates the sinker configuration and the cursor accumulated so far
/// into the next `Blocks` request.
pub(crate) struct RequestBuilder {
    modules: Modules,
    output_module: String,
    production_mode: bool,
    final_blocks_only: bool,
    start_block_num: i64,
    /// 0 streams forever; a bounded range is already extended by the undo
    /// buffer capacity so that the configured end is fully released out of
    /// the finality margin.
    stop_block_num: u64,
}

impl RequestBuilder {
    pub fn new(
        modules: Modules,
        output_module: String,
        production_mode: bool,
        final_blocks_only: bool,
        block_range: Option<BlockRange>,
        undo_buffer_capacity: usize,
    ) -> Self {
        let start_block_num =
            block_range.map_or(0, |range| i64::try_from(range.start()).unwrap_or(i64::MAX));

        // The server performs poorly on the u64::MAX sentinel, an unbounded
        // range must stay at 0.
        let finality_margin = u64::try_from(undo_buffer_capacity).unwrap_or(u64::MAX);
        let stop_block_num = block_range
            .and_then(|range| range.end())
            .map_or(0, |end| end.saturating_add(finality_margin));

        Self {
            modules,
            output_module,
            production_mode,
            final_blocks_only,
            start_block_num,
            stop_block_num,
        }
    }

    pub fn build(&self, cursor: &Cursor) -> Request {
        Request {
            start_block_num: self.start_block_num,
            start_cursor: cursor.to_string(),
            stop_block_num: self.stop_block_num,
            final_blocks_only: self.final_blocks_only,
            production_mode: self.production_mode,
            output_module: self.output_module.clone(),
            modules: Some(self.modules.clone()),
            debug_initial_store_snapshot_for_modules: Vec::new(),
        }
    }
}
