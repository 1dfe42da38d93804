use std::collections::VecDeque;

use crate::SinkError;
use crate::pb::sf::substreams::rpc::v2::{BlockScopedData, BlockUndoSignal};

/// Bounded FIFO that delays delivery until blocks are `capacity` positions
/// deep, absorbing undo signals that land inside the window.
///
/// Blocks released out of the buffer are treated as final by the consumer,
/// so `capacity` must exceed the chain's expected reorg depth.
#[derive(Debug)]
pub(crate) struct UndoBuffer {
    blocks: VecDeque<BlockScopedData>,
    capacity: usize,
}

impl UndoBuffer {
    /// Creates an empty buffer holding up to `capacity` undelivered blocks.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0; the sinker represents "no buffering" as the
    /// absence of a buffer.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "undo buffer capacity must be at least 1");
        Self { blocks: VecDeque::with_capacity(capacity + 1), capacity }
    }

    /// Appends a newly received block, releasing the oldest one once the
    /// buffer runs over capacity.
    ///
    /// Released blocks are strictly increasing in block number as long as
    /// the server stream honors the protocol.
    pub fn handle_block_data(&mut self, data: BlockScopedData) -> Vec<BlockScopedData> {
        self.blocks.push_back(data);

        if self.blocks.len() > self.capacity {
            self.blocks.pop_front().into_iter().collect()
        } else {
            Vec::new()
        }
    }

    /// Drops every buffered block above `undo.last_valid_block`.
    ///
    /// Draining the buffer entirely means blocks above the undo target were
    /// already released to the consumer, which the buffer exists to prevent:
    /// the configured capacity is smaller than the reorg that just happened.
    pub fn handle_undo(&mut self, undo: &BlockUndoSignal) -> Result<(), SinkError> {
        let last_valid_block = undo.last_valid_block.as_ref().map_or(0, |block| block.number);

        while let Some(newest) = self.blocks.back() {
            let number = newest.clock.as_ref().map_or(0, |clock| clock.number);
            if number <= last_valid_block {
                return Ok(());
            }
            self.blocks.pop_back();
        }

        Err(SinkError::UndoOutOfWindow { last_valid_block, capacity: self.capacity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pb::sf::substreams::v1;

    fn block(number: u64) -> BlockScopedData {
        BlockScopedData {
            clock: Some(v1::Clock {
                id: format!("block-{number}"),
                number,
                timestamp: None,
            }),
            cursor: format!("cursor-{number}"),
            ..Default::default()
        }
    }

    fn undo_to(number: u64) -> BlockUndoSignal {
        BlockUndoSignal {
            last_valid_block: Some(v1::BlockRef { id: format!("block-{number}"), number }),
            last_valid_cursor: format!("cursor-{number}"),
        }
    }

    fn numbers(blocks: &[BlockScopedData]) -> Vec<u64> {
        blocks.iter().map(|b| b.clock.as_ref().unwrap().number).collect()
    }

    #[test]
    fn releases_oldest_once_over_capacity() {
        let mut buffer = UndoBuffer::new(2);

        assert!(buffer.handle_block_data(block(100)).is_empty());
        assert!(buffer.handle_block_data(block(101)).is_empty());
        assert_eq!(numbers(&buffer.handle_block_data(block(102))), [100]);
        assert_eq!(numbers(&buffer.handle_block_data(block(103))), [101]);
    }

    #[test]
    fn undo_inside_window_drops_forked_blocks_silently() {
        let mut buffer = UndoBuffer::new(3);

        buffer.handle_block_data(block(10));
        buffer.handle_block_data(block(11));
        buffer.handle_block_data(block(12));

        buffer.handle_undo(&undo_to(10)).unwrap();

        // The replacement chain flows through; 10 is the first release.
        assert_eq!(numbers(&buffer.handle_block_data(block(11))), []);
        assert_eq!(numbers(&buffer.handle_block_data(block(12))), [10]);
        assert_eq!(numbers(&buffer.handle_block_data(block(13))), [11]);
    }

    #[test]
    fn undo_to_newest_buffered_block_is_a_no_op() {
        let mut buffer = UndoBuffer::new(2);

        buffer.handle_block_data(block(10));
        buffer.handle_block_data(block(11));

        buffer.handle_undo(&undo_to(11)).unwrap();

        assert_eq!(numbers(&buffer.handle_block_data(block(12))), [10]);
    }

    #[test]
    fn undo_deeper_than_window_fails() {
        let mut buffer = UndoBuffer::new(2);

        buffer.handle_block_data(block(10));
        buffer.handle_block_data(block(11));
        assert_eq!(numbers(&buffer.handle_block_data(block(12))), [10]);

        let err = buffer.handle_undo(&undo_to(9)).unwrap_err();

        assert!(matches!(
            err,
            SinkError::UndoOutOfWindow { last_valid_block: 9, capacity: 2 }
        ));
    }

    #[test]
    fn undo_on_empty_buffer_fails() {
        let mut buffer = UndoBuffer::new(4);

        let err = buffer.handle_undo(&undo_to(50)).unwrap_err();

        assert!(matches!(err, SinkError::UndoOutOfWindow { last_valid_block: 50, .. }));
    }

    #[test]
    #[should_panic(expected = "undo buffer capacity must be at least 1")]
    fn zero_capacity_panics() {
        let _ = UndoBuffer::new(0);
    }
}
