use std::sync::Arc;

use backon::ExponentialBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::backoff::RetryBackoff;
use super::{IGNORE_OUTPUT_MODULE_TYPE, INFER_OUTPUT_MODULE_FROM_PACKAGE, Sinker, SubstreamsMode};
use crate::SinkError;
use crate::endpoint::{BlockStreamConnector, EndpointConfig, GrpcConnector};
use crate::liveness::LivenessChecker;
use crate::pb::sf::substreams::v1::{Package, module};
use crate::stats::Stats;
use crate::types::BlockRange;

/// Builder/configuration for a [`Sinker`].
///
/// ```rust,no_run
/// use substreams_sink::{EndpointConfig, SinkerBuilder, SubstreamsMode};
/// # fn package() -> substreams_sink::pb::sf::substreams::v1::Package { unimplemented!() }
///
/// # fn main() -> Result<(), substreams_sink::SinkError> {
/// let sinker = SinkerBuilder::new(
///     SubstreamsMode::Production,
///     package(),
///     "map_events",
///     "a1b2c3",
///     EndpointConfig::new("mainnet.eth.streamingfast.io:443"),
/// )
/// .undo_buffer_size(12)
/// .build()?;
/// # Ok(())
/// # }
/// ```
pub struct SinkerBuilder {
    mode: SubstreamsMode,
    package: Package,
    output_module_name: String,
    expected_output_type: String,
    output_module_hash: String,
    endpoint: EndpointConfig,
    block_range: Option<BlockRange>,
    undo_buffer_size: usize,
    infinite_retry: bool,
    final_blocks_only: bool,
    liveness: Option<Arc<dyn LivenessChecker>>,
    backoff: ExponentialBuilder,
    raw_headers: Vec<String>,
    connector: Option<Arc<dyn BlockStreamConnector>>,
}

impl SinkerBuilder {
    /// Creates a builder for a sinker consuming `output_module_name` of
    /// `package` from `endpoint`.
    ///
    /// `output_module_hash` is the hex module hash computed by the manifest
    /// tooling; consumers use it to detect module changes across restarts.
    /// Pass [`INFER_OUTPUT_MODULE_FROM_PACKAGE`] as the module name to use
    /// the package's `sink_module` field.
    pub fn new(
        mode: SubstreamsMode,
        package: Package,
        output_module_name: impl Into<String>,
        output_module_hash: impl Into<String>,
        endpoint: EndpointConfig,
    ) -> Self {
        Self {
            mode,
            package,
            output_module_name: output_module_name.into(),
            expected_output_type: IGNORE_OUTPUT_MODULE_TYPE.to_string(),
            output_module_hash: output_module_hash.into(),
            endpoint,
            block_range: None,
            undo_buffer_size: 0,
            infinite_retry: false,
            final_blocks_only: false,
            liveness: None,
            backoff: RetryBackoff::default_builder(),
            raw_headers: Vec::new(),
            connector: None,
        }
    }

    /// Bounds the sink to `range`; without one the sink streams forever.
    #[must_use]
    pub fn block_range(mut self, range: BlockRange) -> Self {
        self.block_range = Some(range);
        self
    }

    /// Buffers up to `size` blocks before delivery so reorgs within that
    /// window are absorbed without ever reaching the handler. 0 disables
    /// buffering.
    #[must_use]
    pub fn undo_buffer_size(mut self, size: usize) -> Self {
        self.undo_buffer_size = size;
        self
    }

    /// Requests final blocks only. The server then never sends undo
    /// signals; an undo buffer, if configured, is discarded.
    #[must_use]
    pub fn final_blocks_only(mut self) -> Self {
        self.final_blocks_only = true;
        self
    }

    /// Removes the cap on consecutive non-productive reconnection attempts.
    #[must_use]
    pub fn infinite_retry(mut self) -> Self {
        self.infinite_retry = true;
        self
    }

    /// Replaces the default reconnection backoff curve. The attempt cap
    /// still applies unless [`infinite_retry`](Self::infinite_retry) is set.
    #[must_use]
    pub fn retry_backoff(mut self, backoff: ExponentialBuilder) -> Self {
        self.backoff = backoff;
        self
    }

    /// Enables per-block liveness reporting through `checker`.
    #[must_use]
    pub fn liveness_checker(mut self, checker: impl LivenessChecker + 'static) -> Self {
        self.liveness = Some(Arc::new(checker));
        self
    }

    /// Appends raw `"key: value"` headers to every RPC. Malformed headers
    /// fail [`build`](Self::build).
    #[must_use]
    pub fn extra_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.raw_headers.extend(headers.into_iter().map(Into::into));
        self
    }

    /// Only accepts an output module whose type matches `expected` (a
    /// comma-separated list, `proto:`-prefixed or not). The default is to
    /// accept any type.
    #[must_use]
    pub fn expect_output_type(mut self, expected: impl Into<String>) -> Self {
        self.expected_output_type = expected.into();
        self
    }

    /// Replaces the gRPC transport, for tests or custom wiring.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn BlockStreamConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Validates the configuration and assembles the sinker.
    pub fn build(self) -> Result<Sinker, SinkError> {
        let modules = self.package.modules.as_ref().ok_or(SinkError::NoModules)?;

        let resolved_name = if self.output_module_name == INFER_OUTPUT_MODULE_FROM_PACKAGE {
            debug!("inferring output module name from package");
            if self.package.sink_module.is_empty() {
                return Err(SinkError::NoSinkModule);
            }
            self.package.sink_module.clone()
        } else {
            self.output_module_name.clone()
        };

        let output_module = modules
            .modules
            .iter()
            .find(|module| module.name == resolved_name)
            .cloned()
            .ok_or_else(|| SinkError::OutputModuleNotFound { name: resolved_name.clone() })?;

        if !matches!(output_module.kind, Some(module::Kind::KindMap(_))) {
            return Err(SinkError::OutputModuleNotMap { name: resolved_name });
        }

        let actual_type =
            output_module.output.as_ref().map_or(String::new(), |output| output.r#type.clone());
        if self.expected_output_type != IGNORE_OUTPUT_MODULE_TYPE
            && !self.expected_output_type.is_empty()
        {
            let (unprefixed_expected, prefixed_expected) =
                sanitize_module_types(&self.expected_output_type);
            let (unprefixed_actual, prefixed_actual) = sanitize_module_type(&actual_type);

            if !prefixed_expected.contains(&prefixed_actual) {
                return Err(SinkError::UnexpectedOutputType {
                    name: resolved_name,
                    expected: unprefixed_expected.join(", "),
                    actual: unprefixed_actual,
                });
            }
        }

        let mut undo_buffer_size = self.undo_buffer_size;
        if self.final_blocks_only && undo_buffer_size > 0 {
            debug!("discarding undo buffer since final blocks only requested");
            undo_buffer_size = 0;
        }

        let endpoint = self.endpoint.extra_headers(&self.raw_headers)?;

        let connector: Arc<dyn BlockStreamConnector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(GrpcConnector::new(endpoint.clone())?),
        };

        info!(
            mode = %self.mode,
            module_count = modules.modules.len(),
            output_module_name = %output_module.name,
            output_module_type = %actual_type,
            output_module_hash = %self.output_module_hash,
            endpoint = %endpoint,
            undo_buffer_size,
            block_range = %self
                .block_range
                .map_or_else(|| "<none>".to_string(), |range| range.to_string()),
            infinite_retry = self.infinite_retry,
            final_blocks_only = self.final_blocks_only,
            liveness_checker = self.liveness.is_some(),
            "sinker configured"
        );

        Ok(Sinker {
            mode: self.mode,
            package: self.package,
            output_module,
            output_module_hash: self.output_module_hash,
            endpoint,
            connector,
            block_range: self.block_range,
            undo_buffer_size,
            infinite_retry: self.infinite_retry,
            final_blocks_only: self.final_blocks_only,
            liveness: self.liveness,
            backoff: self.backoff,
            stats: Stats::new(),
            cancel: CancellationToken::new(),
            resolved_start_block: None,
        })
    }
}

/// Returns the unprefixed and `proto:`-prefixed forms of a module type:
/// `com.acme` and `proto:com.acme` both map to `("com.acme", "proto:com.acme")`.
pub(crate) fn sanitize_module_type(input: &str) -> (String, String) {
    match input.strip_prefix("proto:") {
        Some(unprefixed) => (unprefixed.to_string(), input.to_string()),
        None => (input.to_string(), format!("proto:{input}")),
    }
}

/// [`sanitize_module_type`] over a comma-separated list.
fn sanitize_module_types(input: &str) -> (Vec<String>, Vec<String>) {
    input
        .split(',')
        .map(|part| sanitize_module_type(part.trim()))
        .unzip()
}
