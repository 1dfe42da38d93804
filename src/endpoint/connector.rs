use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::{Request as GrpcRequest, Status};
use tracing::{debug, warn};

use super::config::EndpointConfig;
use crate::SinkError;
use crate::pb::sf::substreams::rpc::v2::{Request, Response};

/// Server-streamed responses, boxed so alternative transports (including the
/// scripted test endpoint) can slot in behind the same seam.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<Response, Status>> + Send>>;

/// Opens one `Blocks` stream per session attempt.
#[async_trait]
pub trait BlockStreamConnector: Send + Sync {
    async fn blocks(&self, request: Request) -> Result<ResponseStream, SinkError>;
}

const BLOCKS_METHOD: &str = "/sf.substreams.rpc.v2.Stream/Blocks";

/// gRPC transport for a configured endpoint.
///
/// The channel is built lazily, connectivity problems surface as (retryable)
/// stream failures on the first call rather than at construction.
pub struct GrpcConnector {
    config: EndpointConfig,
    channel: Channel,
}

impl GrpcConnector {
    pub fn new(config: EndpointConfig) -> Result<Self, SinkError> {
        let uri = config.uri();
        let mut endpoint =
            Endpoint::from_shared(uri.clone()).map_err(|source| SinkError::InvalidEndpoint {
                endpoint: uri,
                source,
            })?;

        if !config.is_plaintext() {
            if config.is_insecure() {
                // rustls offers no verification bypass; requesting insecure
                // still verifies against native roots.
                warn!("insecure TLS requested, certificates are still verified");
            }
            endpoint = endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?;
        }

        Ok(Self { channel: endpoint.connect_lazy(), config })
    }
}

#[async_trait]
impl BlockStreamConnector for GrpcConnector {
    async fn blocks(&self, request: Request) -> Result<ResponseStream, SinkError> {
        // Credentials are resolved again on every session, external rotation
        // takes effect on reconnect.
        let metadata = self.config.metadata()?;

        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready().await.map_err(SinkError::Transport)?;

        debug!(endpoint = self.config.endpoint(), "calling {BLOCKS_METHOD}");

        let mut grpc_request = GrpcRequest::new(request);
        *grpc_request.metadata_mut() = metadata;

        let codec: ProstCodec<Request, Response> = ProstCodec::default();
        let response = grpc
            .server_streaming(grpc_request, PathAndQuery::from_static(BLOCKS_METHOD), codec)
            .await
            .map_err(SinkError::Stream)?;

        Ok(Box::pin(response.into_inner()))
    }
}
