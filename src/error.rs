use thiserror::Error;

use crate::cursor::Cursor;

/// Errors surfaced by the sink.
///
/// Retryability is a wrapper, not a variant family: transient failures are
/// boxed inside [`SinkError::Retryable`] and detected with
/// [`SinkError::is_retryable`]. Everything else aborts the run immediately.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("invalid cursor {value:?}: {reason}")]
    InvalidCursor { value: String, reason: String },

    #[error(
        "undo signal to block #{last_valid_block} rewinds past the whole {capacity}-block undo buffer"
    )]
    UndoOutOfWindow { last_valid_block: u64, capacity: usize },

    #[error("invalid header {0:?}, expected \"key: value\"")]
    InvalidHeader(String),

    #[error("invalid metadata in header {0:?}")]
    InvalidHeaderValue(String),

    #[error("invalid endpoint {endpoint:?}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("output module {name:?} not found in package")]
    OutputModuleNotFound { name: String },

    #[error("output module {name:?} is not of kind 'map'")]
    OutputModuleNotMap { name: String },

    #[error(
        "sink only supports map modules with output type {expected:?} but module {name:?} outputs {actual:?}"
    )]
    UnexpectedOutputType {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("package does not name a sink module, cannot infer the output module")]
    NoSinkModule,

    #[error("package carries no modules")]
    NoModules,

    #[error("transport: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("stream failure: {0}")]
    Stream(#[source] tonic::Status),

    #[error("handler failed at block {block}")]
    Handler {
        cursor: Cursor,
        block: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("backoff expired after {attempts} non-productive attempts")]
    BackoffExpired {
        attempts: u32,
        #[source]
        last: Box<SinkError>,
    },

    /// Marks the inner error as safe to retry at the session boundary.
    #[error(transparent)]
    Retryable(Box<SinkError>),
}

impl SinkError {
    /// Wraps `err` so the run loop reconnects instead of aborting.
    pub(crate) fn retryable(err: SinkError) -> SinkError {
        SinkError::Retryable(Box::new(err))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SinkError::Retryable(_))
    }

    /// Unwraps the retryable marker, if any, exposing the underlying cause.
    pub fn into_cause(self) -> SinkError {
        match self {
            SinkError::Retryable(inner) => *inner,
            other => other,
        }
    }
}

/// Marker wrapping a handler error so the sink treats it as transient.
///
/// Handlers report failures as plain [`anyhow::Error`] values; wrapping one
/// with [`retryable`] opts that particular failure into backoff-gated
/// reconnection instead of aborting the run.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct RetryableError(#[from] pub anyhow::Error);

/// Marks a handler error as retryable.
pub fn retryable(err: impl Into<anyhow::Error>) -> anyhow::Error {
    anyhow::Error::new(RetryableError(err.into()))
}

/// True when `err` carries the [`RetryableError`] marker anywhere in its
/// chain.
pub fn is_retryable(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.downcast_ref::<RetryableError>().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_marker_is_detected_through_context() {
        let err = retryable(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "gone"))
            .context("handling block #42");

        assert!(is_retryable(&err));
    }

    #[test]
    fn plain_handler_error_is_not_retryable() {
        let err = anyhow::anyhow!("constraint violation");

        assert!(!is_retryable(&err));
    }

    #[test]
    fn sink_error_retryable_round_trip() {
        let err = SinkError::retryable(SinkError::Stream(tonic::Status::unavailable("down")));

        assert!(err.is_retryable());
        assert!(
            matches!(err.into_cause(), SinkError::Stream(status) if status.code() == tonic::Code::Unavailable)
        );
    }
}
