use std::sync::Arc;

use substreams_sink::test_utils::{
    CaptureHandler, HandlerEvent, MockConnector, ScriptAction, ScriptedSession, block_data,
    cursor_for, undo_signal,
};
use substreams_sink::{Cursor, SinkError};

mod common;

fn session(actions: Vec<ScriptAction>) -> ScriptedSession {
    ScriptedSession::new(actions)
}

#[tokio::test]
async fn undo_within_buffer_never_reaches_the_handler() {
    // Buffer of 3: blocks 10..12 fill it, the undo to 10 drops the forked
    // 11 and 12, and the replacement chain flows out in order.
    let connector = Arc::new(MockConnector::new([session(vec![
        ScriptAction::Respond(block_data(10)),
        ScriptAction::Respond(block_data(11)),
        ScriptAction::Respond(block_data(12)),
        ScriptAction::Respond(undo_signal(10)),
        ScriptAction::Respond(block_data(11)),
        ScriptAction::Respond(block_data(12)),
        ScriptAction::Respond(block_data(13)),
        ScriptAction::Respond(block_data(14)),
        ScriptAction::Respond(block_data(15)),
    ])]));
    let mut sinker =
        common::production_sinker(Arc::clone(&connector), |builder| builder.undo_buffer_size(3));
    let mut handler = CaptureHandler::default();

    sinker.run(Cursor::new_blank(), &mut handler).await.unwrap();

    assert!(handler.undo_events().is_empty());
    assert_eq!(handler.data_numbers(), [10, 11, 12]);
}

#[tokio::test]
async fn undo_beyond_buffer_fails_the_run() {
    // Buffer of 2: after block 12 arrives, block 10 was already released.
    // An undo to 9 would retract it, which the buffer cannot do.
    let connector = Arc::new(MockConnector::new([session(vec![
        ScriptAction::Respond(block_data(10)),
        ScriptAction::Respond(block_data(11)),
        ScriptAction::Respond(block_data(12)),
        ScriptAction::Respond(undo_signal(9)),
    ])]));
    let mut sinker =
        common::production_sinker(Arc::clone(&connector), |builder| builder.undo_buffer_size(2));
    let mut handler = CaptureHandler::default();

    let err = sinker.run(Cursor::new_blank(), &mut handler).await.unwrap_err();

    assert!(matches!(err, SinkError::UndoOutOfWindow { last_valid_block: 9, capacity: 2 }));
    assert_eq!(handler.data_numbers(), [10]);
    assert_eq!(connector.requests().len(), 1, "an out-of-window undo must not retry");
}

#[tokio::test]
async fn undo_without_buffer_is_passed_to_the_handler() {
    let connector = Arc::new(MockConnector::new([session(vec![
        ScriptAction::Respond(block_data(10)),
        ScriptAction::Respond(block_data(11)),
        ScriptAction::Respond(undo_signal(10)),
        ScriptAction::Respond(block_data(11)),
        ScriptAction::Respond(block_data(12)),
    ])]));
    let mut sinker = common::production_sinker(Arc::clone(&connector), |builder| builder);
    let mut handler = CaptureHandler::default();

    let cursor = sinker.run(Cursor::new_blank(), &mut handler).await.unwrap();

    assert_eq!(
        handler.events,
        [
            HandlerEvent::Data { number: 10, cursor: cursor_for(10), is_live: None },
            HandlerEvent::Data { number: 11, cursor: cursor_for(11), is_live: None },
            HandlerEvent::Undo { last_valid_block: 10, cursor: cursor_for(10) },
            HandlerEvent::Data { number: 11, cursor: cursor_for(11), is_live: None },
            HandlerEvent::Data { number: 12, cursor: cursor_for(12), is_live: None },
        ]
    );
    assert_eq!(cursor.to_string(), cursor_for(12));
}

#[tokio::test]
async fn final_blocks_only_never_sees_an_undo_signal() {
    // With final blocks only the server never sends undo signals; the flag
    // must make it onto the wire and the buffer must be discarded so blocks
    // flow through directly.
    let connector = Arc::new(MockConnector::new([session(vec![
        ScriptAction::Respond(block_data(10)),
        ScriptAction::Respond(block_data(11)),
    ])]));
    let mut sinker = common::production_sinker(Arc::clone(&connector), |builder| {
        builder.final_blocks_only().undo_buffer_size(5)
    });
    let mut handler = CaptureHandler::default();

    sinker.run(Cursor::new_blank(), &mut handler).await.unwrap();

    assert!(connector.requests()[0].final_blocks_only);
    assert!(handler.undo_events().is_empty());
    // A live buffer of 5 would have held both blocks back.
    assert_eq!(handler.data_numbers(), [10, 11]);
}
