// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use substreams_sink::test_utils::{MockConnector, test_package};
use substreams_sink::{EndpointConfig, Sinker, SinkerBuilder, SubstreamsMode};

/// A production-mode sinker wired to the scripted connector; `configure`
/// applies per-test options.
pub fn production_sinker(
    connector: Arc<MockConnector>,
    configure: impl FnOnce(SinkerBuilder) -> SinkerBuilder,
) -> Sinker {
    let builder = SinkerBuilder::new(
        SubstreamsMode::Production,
        test_package("map_events", "proto:acme.Events"),
        "map_events",
        "cafe0123",
        EndpointConfig::new("localhost:9000").plaintext(true),
    )
    .connector(connector);

    configure(builder).build().expect("valid sinker configuration")
}

/// A backoff curve small enough for tests that exercise reconnection.
pub fn fast_backoff() -> backon::ExponentialBuilder {
    backon::ExponentialBuilder::default()
        .with_min_delay(std::time::Duration::from_millis(1))
        .with_max_delay(std::time::Duration::from_millis(2))
}
