//! Aggregated Discovery Service (ADS) implementation.
//!
//! ADS multiplexes all xDS resource types over a single gRPC stream,
//! ensuring consistent ordering of configuration updates. The service trait
//! and its tonic server are written out by hand in the shape `tonic-build`
//! would generate, so no protobuf toolchain is needed at build time.

use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::codegen::{BoxFuture, Service, StdError};
use tonic::{Request, Response, Status, Streaming};
use tracing::{info_span, instrument, Instrument};

use xds_cache::ShardedCache;
use xds_types::envoy::service::discovery::v3::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};

use crate::config::ServerConfig;
use crate::delta::DeltaConnection;
use crate::metrics::XdsMetrics;
use crate::shutdown::ShutdownController;
use crate::sotw::SotwConnection;

/// Fully qualified service name.
pub const SERVICE_NAME: &str = "envoy.service.discovery.v3.AggregatedDiscoveryService";

const STREAM_PATH: &str =
    "/envoy.service.discovery.v3.AggregatedDiscoveryService/StreamAggregatedResources";
const DELTA_PATH: &str =
    "/envoy.service.discovery.v3.AggregatedDiscoveryService/DeltaAggregatedResources";

/// Response stream type for SotW ADS.
pub type AdsResponseStream = ReceiverStream<Result<DiscoveryResponse, Status>>;

/// Response stream type for delta ADS.
pub type DeltaAdsResponseStream = ReceiverStream<Result<DeltaDiscoveryResponse, Status>>;

/// Aggregated discovery service, as a tonic server expects it.
#[async_trait]
pub trait AggregatedDiscoveryService: Send + Sync + 'static {
    /// Server streaming response type for StreamAggregatedResources.
    type StreamAggregatedResourcesStream: Stream<Item = Result<DiscoveryResponse, Status>>
        + Send
        + 'static;

    /// Bidirectional streaming RPC for xDS.
    async fn stream_aggregated_resources(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamAggregatedResourcesStream>, Status>;

    /// Server streaming response type for DeltaAggregatedResources.
    type DeltaAggregatedResourcesStream: Stream<Item = Result<DeltaDiscoveryResponse, Status>>
        + Send
        + 'static;

    /// Bidirectional streaming RPC for delta xDS.
    async fn delta_aggregated_resources(
        &self,
        request: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaAggregatedResourcesStream>, Status>;
}

/// Aggregated Discovery Service backed by a [`ShardedCache`].
#[derive(Debug, Clone)]
pub struct AdsService {
    cache: Arc<ShardedCache>,
    config: Arc<ServerConfig>,
    metrics: XdsMetrics,
    shutdown: ShutdownController,
}

impl AdsService {
    /// Create a new ADS service.
    pub fn new(
        cache: Arc<ShardedCache>,
        config: Arc<ServerConfig>,
        metrics: XdsMetrics,
        shutdown: ShutdownController,
    ) -> Self {
        Self {
            cache,
            config,
            metrics,
            shutdown,
        }
    }

    /// Get a reference to the cache.
    pub fn cache(&self) -> &Arc<ShardedCache> {
        &self.cache
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Convert this service into a tonic service for `Server::add_service`.
    pub fn into_service(self) -> AggregatedDiscoveryServiceServer<Self> {
        let max_request_size = self.config.max_request_size;
        AggregatedDiscoveryServiceServer::new(self).max_decoding_message_size(max_request_size)
    }

    /// Spawn a state-of-the-world connection over `requests`.
    ///
    /// Works with any request stream, which keeps the protocol testable
    /// without a transport.
    pub fn open_sotw_stream<S>(&self, requests: S) -> AdsResponseStream
    where
        S: Stream<Item = Result<DiscoveryRequest, Status>> + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.config.response_buffer_size.max(1));
        let connection = SotwConnection::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.config),
            self.metrics.clone(),
            self.shutdown.clone(),
        );
        let span = info_span!("sotw_stream", stream = %connection.stream_id());
        tokio::spawn(connection.run(requests, tx).instrument(span));
        ReceiverStream::new(rx)
    }

    /// Spawn an incremental connection over `requests`.
    pub fn open_delta_stream<S>(&self, requests: S) -> DeltaAdsResponseStream
    where
        S: Stream<Item = Result<DeltaDiscoveryRequest, Status>> + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.config.response_buffer_size.max(1));
        let connection = DeltaConnection::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.config),
            self.metrics.clone(),
            self.shutdown.clone(),
        );
        let span = info_span!("delta_stream", stream = %connection.stream_id());
        tokio::spawn(connection.run(requests, tx).instrument(span));
        ReceiverStream::new(rx)
    }
}

#[async_trait]
impl AggregatedDiscoveryService for AdsService {
    type StreamAggregatedResourcesStream = AdsResponseStream;

    #[instrument(skip(self, request), name = "ads_stream")]
    async fn stream_aggregated_resources(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        if !self.config.enable_sotw {
            return Err(Status::unimplemented("state-of-the-world xDS is disabled"));
        }
        Ok(Response::new(self.open_sotw_stream(request.into_inner())))
    }

    type DeltaAggregatedResourcesStream = DeltaAdsResponseStream;

    #[instrument(skip(self, request), name = "ads_delta_stream")]
    async fn delta_aggregated_resources(
        &self,
        request: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaAggregatedResourcesStream>, Status> {
        if !self.config.enable_delta {
            return Err(Status::unimplemented("delta xDS is disabled"));
        }
        Ok(Response::new(self.open_delta_stream(request.into_inner())))
    }
}

/// Tonic server for any [`AggregatedDiscoveryService`].
#[derive(Debug)]
pub struct AggregatedDiscoveryServiceServer<T> {
    inner: Arc<T>,
    max_decoding_message_size: Option<usize>,
    max_encoding_message_size: Option<usize>,
}

impl<T: AggregatedDiscoveryService> AggregatedDiscoveryServiceServer<T> {
    /// Wrap a service.
    pub fn new(inner: T) -> Self {
        Self::from_arc(Arc::new(inner))
    }

    /// Wrap a shared service.
    pub fn from_arc(inner: Arc<T>) -> Self {
        Self {
            inner,
            max_decoding_message_size: None,
            max_encoding_message_size: None,
        }
    }

    /// Limit the size of decoded requests.
    pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
        self.max_decoding_message_size = Some(limit);
        self
    }

    /// Limit the size of encoded responses.
    pub fn max_encoding_message_size(mut self, limit: usize) -> Self {
        self.max_encoding_message_size = Some(limit);
        self
    }
}

impl<T> Clone for AggregatedDiscoveryServiceServer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            max_decoding_message_size: self.max_decoding_message_size,
            max_encoding_message_size: self.max_encoding_message_size,
        }
    }
}

impl<T, B> Service<http::Request<B>> for AggregatedDiscoveryServiceServer<T>
where
    T: AggregatedDiscoveryService,
    B: tonic::codegen::Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let max_decoding = self.max_decoding_message_size;
        let max_encoding = self.max_encoding_message_size;

        match req.uri().path() {
            STREAM_PATH => {
                struct StreamSvc<T: AggregatedDiscoveryService>(Arc<T>);

                impl<T: AggregatedDiscoveryService>
                    tonic::server::StreamingService<DiscoveryRequest> for StreamSvc<T>
                {
                    type Response = DiscoveryResponse;
                    type ResponseStream = T::StreamAggregatedResourcesStream;
                    type Future = BoxFuture<Response<Self::ResponseStream>, Status>;

                    fn call(&mut self, request: Request<Streaming<DiscoveryRequest>>) -> Self::Future {
                        let inner = Arc::clone(&self.0);
                        Box::pin(async move { inner.stream_aggregated_resources(request).await })
                    }
                }

                let inner = Arc::clone(&self.inner);
                Box::pin(async move {
                    let mut grpc = tonic::server::Grpc::new(tonic::codec::ProstCodec::default())
                        .apply_max_message_size_config(max_decoding, max_encoding);
                    Ok(grpc.streaming(StreamSvc(inner), req).await)
                })
            }
            DELTA_PATH => {
                struct DeltaSvc<T: AggregatedDiscoveryService>(Arc<T>);

                impl<T: AggregatedDiscoveryService>
                    tonic::server::StreamingService<DeltaDiscoveryRequest> for DeltaSvc<T>
                {
                    type Response = DeltaDiscoveryResponse;
                    type ResponseStream = T::DeltaAggregatedResourcesStream;
                    type Future = BoxFuture<Response<Self::ResponseStream>, Status>;

                    fn call(
                        &mut self,
                        request: Request<Streaming<DeltaDiscoveryRequest>>,
                    ) -> Self::Future {
                        let inner = Arc::clone(&self.0);
                        Box::pin(async move { inner.delta_aggregated_resources(request).await })
                    }
                }

                let inner = Arc::clone(&self.inner);
                Box::pin(async move {
                    let mut grpc = tonic::server::Grpc::new(tonic::codec::ProstCodec::default())
                        .apply_max_message_size_config(max_decoding, max_encoding);
                    Ok(grpc.streaming(DeltaSvc(inner), req).await)
                })
            }
            _ => Box::pin(async move {
                let mut response = http::Response::new(tonic::body::empty_body());
                let headers = response.headers_mut();
                headers.insert(
                    Status::GRPC_STATUS,
                    (tonic::Code::Unimplemented as i32).into(),
                );
                headers.insert(
                    http::header::CONTENT_TYPE,
                    tonic::metadata::GRPC_CONTENT_TYPE,
                );
                Ok(response)
            }),
        }
    }
}

impl<T> tonic::server::NamedService for AggregatedDiscoveryServiceServer<T> {
    const NAME: &'static str = SERVICE_NAME;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    fn service(config: ServerConfig) -> AdsService {
        AdsService::new(
            Arc::new(ShardedCache::new()),
            Arc::new(config),
            XdsMetrics::new(),
            ShutdownController::new(),
        )
    }

    #[test]
    fn service_name() {
        use tonic::server::NamedService;
        assert_eq!(
            <AggregatedDiscoveryServiceServer<AdsService> as NamedService>::NAME,
            "envoy.service.discovery.v3.AggregatedDiscoveryService"
        );
    }

    #[test]
    fn into_service_applies_request_limit() {
        let config = ServerConfig {
            max_request_size: 1024,
            ..Default::default()
        };
        let server = service(config).into_service();
        assert_eq!(server.max_decoding_message_size, Some(1024));
    }

    #[tokio::test]
    async fn unknown_method_is_unimplemented() {
        let server = service(ServerConfig::default()).into_service();
        let request = http::Request::builder()
            .uri("/envoy.service.discovery.v3.AggregatedDiscoveryService/Nope")
            .body(tonic::body::empty_body())
            .unwrap();

        let response = server.oneshot(request).await.unwrap();
        let status = response.headers().get("grpc-status").unwrap();
        assert_eq!(status, &(tonic::Code::Unimplemented as i32).to_string());
    }
}
