use std::sync::Arc;
use std::time::Duration;

use substreams_sink::test_utils::{
    CaptureHandler, HandlerEvent, MockConnector, ScriptAction, ScriptedSession, block_data,
    block_data_aged, cursor_for, session_init,
};
use substreams_sink::{BlockRange, Cursor, DeltaLivenessChecker};

mod common;

fn streaming_session(numbers: impl IntoIterator<Item = u64>) -> ScriptedSession {
    let mut actions = vec![ScriptAction::Respond(session_init(100))];
    actions.extend(numbers.into_iter().map(|number| ScriptAction::Respond(block_data(number))));
    ScriptedSession::new(actions)
}

#[tokio::test]
async fn bounded_range_without_buffer_delivers_every_block_in_order() {
    let connector = Arc::new(MockConnector::new([streaming_session(100..105)]));
    let mut sinker = common::production_sinker(Arc::clone(&connector), |builder| {
        builder.block_range(BlockRange::bounded(100, 105))
    });
    let mut handler = CaptureHandler::default();

    let cursor = sinker.run(Cursor::new_blank(), &mut handler).await.unwrap();

    assert_eq!(handler.data_numbers(), [100, 101, 102, 103, 104]);
    assert!(handler.undo_events().is_empty());
    assert_eq!(cursor.to_string(), cursor_for(104));

    // The completion hook fired exactly once, after the data, with the
    // cursor of the last block.
    assert_eq!(handler.completions().len(), 1);
    assert_eq!(
        handler.events.last(),
        Some(&HandlerEvent::RangeCompletion { cursor: cursor_for(104) })
    );
}

#[tokio::test]
async fn bounded_range_request_carries_configured_bounds() {
    let connector = Arc::new(MockConnector::new([streaming_session(100..105)]));
    let mut sinker = common::production_sinker(Arc::clone(&connector), |builder| {
        builder.block_range(BlockRange::bounded(100, 105))
    });

    sinker.run(Cursor::new_blank(), &mut CaptureHandler::default()).await.unwrap();

    let requests = connector.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].start_block_num, 100);
    assert_eq!(requests[0].stop_block_num, 105);
    assert_eq!(requests[0].start_cursor, "");
    assert_eq!(requests[0].output_module, "map_events");
    assert!(requests[0].production_mode);
    assert!(!requests[0].final_blocks_only);
}

#[tokio::test]
async fn bounded_range_with_buffer_holds_back_the_finality_margin() {
    // Range [100, 103) with a 2-deep buffer: the wire asks for 105 so the
    // last two received blocks stay behind as the finality margin.
    let connector = Arc::new(MockConnector::new([streaming_session(100..105)]));
    let mut sinker = common::production_sinker(Arc::clone(&connector), |builder| {
        builder.block_range(BlockRange::bounded(100, 103)).undo_buffer_size(2)
    });
    let mut handler = CaptureHandler::default();

    sinker.run(Cursor::new_blank(), &mut handler).await.unwrap();

    assert_eq!(connector.requests()[0].stop_block_num, 105);
    assert_eq!(handler.data_numbers(), [100, 101, 102]);
    assert_eq!(handler.completions().len(), 1);
}

#[tokio::test]
async fn liveness_flag_follows_the_configured_checker() {
    let session = ScriptedSession::new(vec![
        ScriptAction::Respond(block_data_aged(100, 0)),
        ScriptAction::Respond(block_data_aged(101, 7200)),
    ]);
    let connector = Arc::new(MockConnector::new([session]));
    let mut sinker = common::production_sinker(Arc::clone(&connector), |builder| {
        builder.liveness_checker(DeltaLivenessChecker::new(Duration::from_secs(3600)))
    });
    let mut handler = CaptureHandler::default();

    sinker.run(Cursor::new_blank(), &mut handler).await.unwrap();

    assert_eq!(
        handler.events,
        [
            HandlerEvent::Data { number: 100, cursor: cursor_for(100), is_live: Some(true) },
            HandlerEvent::Data { number: 101, cursor: cursor_for(101), is_live: Some(false) },
        ]
    );
}

#[tokio::test]
async fn without_liveness_checker_the_flag_is_absent() {
    let connector = Arc::new(MockConnector::new([streaming_session([100])]));
    let mut sinker = common::production_sinker(Arc::clone(&connector), |builder| builder);
    let mut handler = CaptureHandler::default();

    sinker.run(Cursor::new_blank(), &mut handler).await.unwrap();

    assert_eq!(
        handler.events,
        [HandlerEvent::Data { number: 100, cursor: cursor_for(100), is_live: None }]
    );
    // Unbounded stream: no range, no completion hook.
    assert!(handler.completions().is_empty());
}
