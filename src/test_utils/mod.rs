//! Scripted endpoint and capture handler for testing sinks without a live
//! Substreams provider.
//!
//! [`MockConnector`] plays back a queue of scripted sessions through the
//! [`BlockStreamConnector`] seam; each [`Sinker`](crate::Sinker) reconnect
//! consumes the next script. [`CaptureHandler`] records every handler
//! invocation for later assertions.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio_stream::StreamExt as _;
use tonic::Status;

use crate::cursor::Cursor;
use crate::endpoint::{BlockStreamConnector, ResponseStream};
use crate::error::SinkError;
use crate::handler::SinkHandler;
use crate::pb::sf::substreams::rpc::v2::{
    BlockScopedData, BlockUndoSignal, MapModuleOutput, Request, Response, SessionInit, response,
};
use crate::pb::sf::substreams::v1;
use crate::types::BlockRef;

/// One scripted step of a mock session.
pub enum ScriptAction {
    /// Yield this response.
    Respond(Response),
    /// Fail the stream with this status and end it.
    Fail(Status),
    /// Keep the stream open forever (for cancellation tests).
    Stall,
}

/// A full scripted session; the stream ends cleanly after the last action,
/// which the sink reads as "stop block reached".
pub struct ScriptedSession {
    pub actions: Vec<ScriptAction>,
}

impl ScriptedSession {
    pub fn new(actions: Vec<ScriptAction>) -> Self {
        Self { actions }
    }
}

/// Scripted [`BlockStreamConnector`]: each `blocks` call consumes the next
/// queued session and records the request it was given.
#[derive(Default)]
pub struct MockConnector {
    sessions: Mutex<VecDeque<ScriptedSession>>,
    requests: Mutex<Vec<Request>>,
}

impl MockConnector {
    pub fn new(sessions: impl IntoIterator<Item = ScriptedSession>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().expect("mock lock poisoned").clone()
    }
}

#[async_trait]
impl BlockStreamConnector for MockConnector {
    async fn blocks(&self, request: Request) -> Result<ResponseStream, SinkError> {
        self.requests.lock().expect("mock lock poisoned").push(request);

        let session = self.sessions.lock().expect("mock lock poisoned").pop_front();
        let actions = session.map_or_else(|| vec![ScriptAction::Stall], |session| session.actions);

        Ok(into_stream(actions))
    }
}

fn into_stream(actions: Vec<ScriptAction>) -> ResponseStream {
    let mut items: Vec<Result<Response, Status>> = Vec::new();
    let mut stall = false;

    for action in actions {
        match action {
            ScriptAction::Respond(response) => items.push(Ok(response)),
            // A real stream ends after its first error.
            ScriptAction::Fail(status) => {
                items.push(Err(status));
                break;
            }
            ScriptAction::Stall => {
                stall = true;
                break;
            }
        }
    }

    let head = tokio_stream::iter(items);
    if stall {
        Box::pin(head.chain(futures::stream::pending()))
    } else {
        Box::pin(head)
    }
}

/// The id every scripted block carries for `number`.
pub fn block_id(number: u64) -> String {
    format!("block-{number}")
}

/// The cursor string the scripted server issues for block `number`.
pub fn cursor_for(number: u64) -> String {
    Cursor::for_block(BlockRef::new(block_id(number), number)).to_string()
}

/// A `BlockScopedData` response for block `number`, stamped `age` seconds
/// behind the current wall clock.
pub fn block_data_aged(number: u64, age_seconds: u64) -> Response {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).expect("clock before epoch");
    let timestamp = prost_types::Timestamp {
        seconds: i64::try_from(now.as_secs() - age_seconds).expect("timestamp overflow"),
        nanos: 0,
    };

    Response {
        message: Some(response::Message::BlockScopedData(BlockScopedData {
            output: Some(MapModuleOutput {
                name: "map_events".to_string(),
                map_output: Some(prost_types::Any {
                    type_url: "type.googleapis.com/acme.Events".to_string(),
                    value: vec![0xca, 0xfe],
                }),
                debug_info: None,
            }),
            clock: Some(v1::Clock {
                id: block_id(number),
                number,
                timestamp: Some(timestamp),
            }),
            cursor: cursor_for(number),
            final_block_height: number.saturating_sub(64),
            debug_map_outputs: Vec::new(),
            debug_store_outputs: Vec::new(),
        })),
    }
}

/// A fresh `BlockScopedData` response for block `number`.
pub fn block_data(number: u64) -> Response {
    block_data_aged(number, 0)
}

/// A `BlockUndoSignal` response rewinding to `last_valid_block`.
pub fn undo_signal(last_valid_block: u64) -> Response {
    Response {
        message: Some(response::Message::BlockUndoSignal(BlockUndoSignal {
            last_valid_block: Some(v1::BlockRef {
                id: block_id(last_valid_block),
                number: last_valid_block,
            }),
            last_valid_cursor: cursor_for(last_valid_block),
        })),
    }
}

/// A `Session` response resolving the start block.
pub fn session_init(resolved_start_block: u64) -> Response {
    Response {
        message: Some(response::Message::Session(SessionInit {
            trace_id: "00000000000000000000000000000000".to_string(),
            resolved_start_block,
            linear_handoff_block: resolved_start_block,
            max_parallel_workers: 10,
        })),
    }
}

/// What a [`CaptureHandler`] saw, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerEvent {
    Data { number: u64, cursor: String, is_live: Option<bool> },
    Undo { last_valid_block: u64, cursor: String },
    RangeCompletion { cursor: String },
}

/// Handler recording every invocation, with optional one-shot failure
/// injection on a specific block.
#[derive(Default)]
pub struct CaptureHandler {
    pub events: Vec<HandlerEvent>,
    /// Fail the data handler once at this block; the bool marks the error
    /// retryable.
    pub fail_data_at: Option<(u64, bool)>,
}

impl CaptureHandler {
    /// Block numbers delivered to the data handler, in order.
    pub fn data_numbers(&self) -> Vec<u64> {
        self.events
            .iter()
            .filter_map(|event| match event {
                HandlerEvent::Data { number, .. } => Some(*number),
                _ => None,
            })
            .collect()
    }

    pub fn undo_events(&self) -> Vec<&HandlerEvent> {
        self.events
            .iter()
            .filter(|event| matches!(event, HandlerEvent::Undo { .. }))
            .collect()
    }

    pub fn completions(&self) -> Vec<&HandlerEvent> {
        self.events
            .iter()
            .filter(|event| matches!(event, HandlerEvent::RangeCompletion { .. }))
            .collect()
    }
}

#[async_trait]
impl SinkHandler for CaptureHandler {
    async fn handle_block_scoped_data(
        &mut self,
        data: &BlockScopedData,
        is_live: Option<bool>,
        cursor: &Cursor,
    ) -> anyhow::Result<()> {
        let number = data.clock.as_ref().map_or(0, |clock| clock.number);

        if let Some((fail_at, retryable)) = self.fail_data_at {
            if number == fail_at {
                self.fail_data_at = None;
                let err = anyhow::anyhow!("injected failure at block #{number}");
                return Err(if retryable { crate::error::retryable(err) } else { err });
            }
        }

        self.events.push(HandlerEvent::Data { number, cursor: cursor.to_string(), is_live });
        Ok(())
    }

    async fn handle_block_undo_signal(
        &mut self,
        undo: &BlockUndoSignal,
        cursor: &Cursor,
    ) -> anyhow::Result<()> {
        self.events.push(HandlerEvent::Undo {
            last_valid_block: undo.last_valid_block.as_ref().map_or(0, |block| block.number),
            cursor: cursor.to_string(),
        });
        Ok(())
    }

    async fn handle_block_range_completion(&mut self, cursor: &Cursor) -> anyhow::Result<()> {
        self.events.push(HandlerEvent::RangeCompletion { cursor: cursor.to_string() });
        Ok(())
    }
}

/// A minimal package with a map module (`map_events`), a store module
/// (`store_totals`) and `sink_module` set to `sink_module_name`.
pub fn test_package(sink_module_name: &str, output_type: &str) -> v1::Package {
    v1::Package {
        proto_files: Vec::new(),
        version: 1,
        modules: Some(v1::Modules {
            modules: vec![
                v1::Module {
                    name: "map_events".to_string(),
                    binary_index: 0,
                    binary_entrypoint: "map_events".to_string(),
                    inputs: vec![v1::module::Input {
                        input: Some(v1::module::input::Input::Source(v1::module::input::Source {
                            r#type: "sf.ethereum.type.v2.Block".to_string(),
                        })),
                    }],
                    output: Some(v1::module::Output { r#type: output_type.to_string() }),
                    initial_block: 0,
                    kind: Some(v1::module::Kind::KindMap(v1::module::KindMap {
                        output_type: output_type.to_string(),
                    })),
                },
                v1::Module {
                    name: "store_totals".to_string(),
                    binary_index: 0,
                    binary_entrypoint: "store_totals".to_string(),
                    inputs: Vec::new(),
                    output: None,
                    initial_block: 0,
                    kind: Some(v1::module::Kind::KindStore(v1::module::KindStore {
                        update_policy: v1::module::kind_store::UpdatePolicy::Add as i32,
                        value_type: "int64".to_string(),
                    })),
                },
            ],
            binaries: vec![v1::Binary { r#type: "wasm/rust-v1".to_string(), content: Vec::new() }],
        }),
        module_meta: Vec::new(),
        package_meta: vec![v1::PackageMetadata {
            version: "v0.1.0".to_string(),
            url: String::new(),
            name: "test_package".to_string(),
            doc: String::new(),
        }],
        sink_config: None,
        sink_module: sink_module_name.to_string(),
    }
}
