//! Discovery streams over a real gRPC connection.
//!
//! The client side is built the way `tonic-build` would generate it: a
//! [`Grpc`] client with a [`ProstCodec`] on the ADS method paths.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::uri::PathAndQuery;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::client::Grpc;
use tonic::codec::{ProstCodec, Streaming};
use tonic::transport::{Channel, Endpoint};
use xds_controlplane::prelude::*;
use xds_controlplane::types::envoy::config::core::v3::Node;
use xds_controlplane::types::envoy::service::discovery::v3::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};

use crate::{cluster, cluster_with_timeout, listener};

const SOTW_PATH: &str =
    "/envoy.service.discovery.v3.AggregatedDiscoveryService/StreamAggregatedResources";
const DELTA_PATH: &str =
    "/envoy.service.discovery.v3.AggregatedDiscoveryService/DeltaAggregatedResources";
const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

struct Harness {
    cache: Arc<ShardedCache>,
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    server: JoinHandle<XdsResult<()>>,
}

impl Harness {
    async fn start(configure: impl FnOnce(XdsServerBuilder) -> XdsServerBuilder) -> Self {
        let cache = Arc::new(ShardedCache::new());
        let addr = free_addr();
        let server = configure(XdsServer::builder().cache(Arc::clone(&cache)))
            .graceful_shutdown(Duration::from_secs(1))
            .build()
            .unwrap();

        let (stop, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(server.serve_with_shutdown(addr, async move {
            let _ = stopped.await;
        }));

        Self {
            cache,
            addr,
            stop,
            server,
        }
    }

    async fn client(&self) -> Grpc<Channel> {
        let endpoint = Endpoint::from_shared(format!("http://{}", self.addr)).unwrap();
        for _ in 0..100 {
            if let Ok(channel) = endpoint.connect().await {
                return Grpc::new(channel);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("server at {} never came up", self.addr);
    }

    async fn stop(self) {
        let _ = self.stop.send(());
        tokio::time::timeout(WAIT, self.server)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

struct SotwStream {
    requests: mpsc::Sender<DiscoveryRequest>,
    responses: Streaming<DiscoveryResponse>,
}

impl SotwStream {
    async fn open(grpc: &mut Grpc<Channel>) -> Result<Self, tonic::Status> {
        let (requests, rx) = mpsc::channel(8);
        grpc.ready().await.unwrap();
        let codec: ProstCodec<DiscoveryRequest, DiscoveryResponse> = ProstCodec::default();
        let responses = grpc
            .streaming(
                tonic::Request::new(ReceiverStream::new(rx)),
                PathAndQuery::from_static(SOTW_PATH),
                codec,
            )
            .await?
            .into_inner();
        Ok(Self {
            requests,
            responses,
        })
    }

    async fn send(&self, request: DiscoveryRequest) {
        self.requests.send(request).await.unwrap();
    }

    async fn recv(&mut self) -> DiscoveryResponse {
        tokio::time::timeout(WAIT, self.responses.message())
            .await
            .expect("timed out waiting for a response")
            .unwrap()
            .expect("stream ended")
    }

    async fn assert_quiet(&mut self) {
        assert!(tokio::time::timeout(QUIET, self.responses.message()).await.is_err());
    }
}

fn request(node: &str, kind: ResourceKind, version: &str, nonce: &str) -> DiscoveryRequest {
    DiscoveryRequest {
        version_info: version.to_string(),
        node: Some(Node {
            id: node.to_string(),
            ..Default::default()
        }),
        type_url: kind.type_url().to_string(),
        response_nonce: nonce.to_string(),
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sotw_push_ack_and_update() {
    let harness = Harness::start(|b| b.control_plane_id("cp-it")).await;
    let node = NodeId::new("fleet-a");
    harness
        .cache
        .update(&node, ResourceKind::Cluster, "svc-1", cluster("svc-1"))
        .unwrap();

    let mut grpc = harness.client().await;
    let mut stream = SotwStream::open(&mut grpc).await.unwrap();

    stream.send(request("fleet-a", ResourceKind::Cluster, "", "")).await;
    let first = stream.recv().await;
    assert_eq!(first.type_url, ResourceKind::CLUSTER_TYPE_URL);
    assert_eq!(first.resources.len(), 1);
    assert_eq!(first.control_plane.as_ref().unwrap().identifier, "cp-it");
    assert_eq!(
        first.version_info,
        harness.cache.version(&node, ResourceKind::Cluster).to_string()
    );

    stream
        .send(request("fleet-a", ResourceKind::Cluster, &first.version_info, &first.nonce))
        .await;
    stream.assert_quiet().await;

    harness
        .cache
        .update(&node, ResourceKind::Cluster, "svc-1", cluster_with_timeout("svc-1", 500))
        .unwrap();
    let second = stream.recv().await;
    assert_ne!(second.nonce, first.nonce);
    let version = |r: &DiscoveryResponse| ResourceVersion::parse(&r.version_info).unwrap();
    assert!(version(&second) > version(&first));

    drop(stream);
    drop(grpc);
    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_node_is_refused() {
    let harness = Harness::start(|b| b).await;
    harness
        .cache
        .update(&NodeId::new("fleet-a"), ResourceKind::Cluster, "svc-1", cluster("svc-1"))
        .unwrap();

    let mut grpc = harness.client().await;
    let mut stream = SotwStream::open(&mut grpc).await.unwrap();
    stream.send(request("fleet-ghost", ResourceKind::Cluster, "", "")).await;

    let status = tokio::time::timeout(WAIT, stream.responses.message())
        .await
        .expect("timed out waiting for the refusal")
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::InvalidArgument);
    assert!(status.message().contains("fleet-ghost"));

    drop(stream);
    drop(grpc);
    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_node_is_served_when_allowed() {
    let harness = Harness::start(|b| b.require_known_node(false)).await;

    let mut grpc = harness.client().await;
    let mut stream = SotwStream::open(&mut grpc).await.unwrap();
    stream.send(request("fleet-new", ResourceKind::Cluster, "", "")).await;
    stream.assert_quiet().await;

    harness
        .cache
        .update(&NodeId::new("fleet-new"), ResourceKind::Cluster, "svc-1", cluster("svc-1"))
        .unwrap();
    assert_eq!(stream.recv().await.resources.len(), 1);

    drop(stream);
    drop(grpc);
    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn kinds_share_one_stream() {
    let harness = Harness::start(|b| b).await;
    let node = NodeId::new("fleet-a");
    harness
        .cache
        .update(&node, ResourceKind::Cluster, "svc-1", cluster("svc-1"))
        .unwrap();
    harness
        .cache
        .update(&node, ResourceKind::Listener, "http", listener("http", 8080, "routes"))
        .unwrap();

    let mut grpc = harness.client().await;
    let mut stream = SotwStream::open(&mut grpc).await.unwrap();

    stream.send(request("fleet-a", ResourceKind::Cluster, "", "")).await;
    stream.send(request("fleet-a", ResourceKind::Listener, "", "")).await;

    let mut seen = vec![stream.recv().await.type_url, stream.recv().await.type_url];
    seen.sort();
    assert_eq!(
        seen,
        vec![
            ResourceKind::CLUSTER_TYPE_URL.to_string(),
            ResourceKind::LISTENER_TYPE_URL.to_string(),
        ]
    );

    drop(stream);
    drop(grpc);
    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nodes_only_see_their_own_writes() {
    let harness = Harness::start(|b| b).await;
    for node in ["fleet-a", "fleet-b"] {
        harness
            .cache
            .update(&NodeId::new(node), ResourceKind::Cluster, "svc-1", cluster("svc-1"))
            .unwrap();
    }

    let mut grpc = harness.client().await;
    let mut a = SotwStream::open(&mut grpc).await.unwrap();
    let mut b = SotwStream::open(&mut grpc).await.unwrap();

    for (stream, node) in [(&mut a, "fleet-a"), (&mut b, "fleet-b")] {
        stream.send(request(node, ResourceKind::Cluster, "", "")).await;
        let response = stream.recv().await;
        stream
            .send(request(node, ResourceKind::Cluster, &response.version_info, &response.nonce))
            .await;
    }

    harness
        .cache
        .update(&NodeId::new("fleet-b"), ResourceKind::Cluster, "svc-2", cluster("svc-2"))
        .unwrap();

    assert_eq!(b.recv().await.resources.len(), 2);
    a.assert_quiet().await;

    drop((a, b, grpc));
    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconnect_at_current_version_is_not_pushed() {
    let harness = Harness::start(|b| b).await;
    let node = NodeId::new("fleet-a");
    let version = harness
        .cache
        .update(&node, ResourceKind::Cluster, "svc-1", cluster("svc-1"))
        .unwrap();

    let mut grpc = harness.client().await;
    let mut stream = SotwStream::open(&mut grpc).await.unwrap();
    stream
        .send(request("fleet-a", ResourceKind::Cluster, &version.to_string(), ""))
        .await;
    stream.assert_quiet().await;

    harness
        .cache
        .update(&node, ResourceKind::Cluster, "svc-2", cluster("svc-2"))
        .unwrap();
    assert_eq!(stream.recv().await.resources.len(), 2);

    drop(stream);
    drop(grpc);
    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delta_over_grpc() {
    let harness = Harness::start(|b| b.enable_delta()).await;
    let node = NodeId::new("fleet-a");
    harness
        .cache
        .update(&node, ResourceKind::Cluster, "svc-1", cluster("svc-1"))
        .unwrap();
    harness
        .cache
        .update(&node, ResourceKind::Cluster, "svc-2", cluster("svc-2"))
        .unwrap();

    let mut grpc = harness.client().await;
    grpc.ready().await.unwrap();
    let (requests, rx) = mpsc::channel(8);
    let codec: ProstCodec<DeltaDiscoveryRequest, DeltaDiscoveryResponse> = ProstCodec::default();
    let mut responses = grpc
        .streaming(
            tonic::Request::new(ReceiverStream::new(rx)),
            PathAndQuery::from_static(DELTA_PATH),
            codec,
        )
        .await
        .unwrap()
        .into_inner();

    let subscribe = DeltaDiscoveryRequest {
        node: Some(Node {
            id: "fleet-a".to_string(),
            ..Default::default()
        }),
        type_url: ResourceKind::CLUSTER_TYPE_URL.to_string(),
        ..Default::default()
    };
    requests.send(subscribe.clone()).await.unwrap();

    let first = tokio::time::timeout(WAIT, responses.message())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let mut names: Vec<&str> = first.resources.iter().map(|r| r.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["svc-1", "svc-2"]);
    assert!(first.resources.iter().all(|r| !r.version.is_empty()));

    requests
        .send(DeltaDiscoveryRequest {
            response_nonce: first.nonce.clone(),
            ..subscribe
        })
        .await
        .unwrap();

    harness
        .cache
        .update(&node, ResourceKind::Cluster, "svc-2", cluster_with_timeout("svc-2", 250))
        .unwrap();
    let second = tokio::time::timeout(WAIT, responses.message())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(second.resources.len(), 1);
    assert_eq!(second.resources[0].name, "svc-2");
    assert!(second.removed_resources.is_empty());

    drop((requests, responses, grpc));
    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delta_disabled_is_unimplemented() {
    let harness = Harness::start(|b| b.disable_delta()).await;

    let mut grpc = harness.client().await;
    grpc.ready().await.unwrap();
    let (_requests, rx) = mpsc::channel::<DeltaDiscoveryRequest>(1);
    let codec: ProstCodec<DeltaDiscoveryRequest, DeltaDiscoveryResponse> = ProstCodec::default();
    let status = grpc
        .streaming(
            tonic::Request::new(ReceiverStream::new(rx)),
            PathAndQuery::from_static(DELTA_PATH),
            codec,
        )
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::Unimplemented);

    drop(grpc);
    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn debug_api_serves_alongside_grpc() {
    let debug_addr = free_addr();
    let harness = Harness::start(|b| b.debug_api(debug_addr)).await;
    harness
        .cache
        .update(&NodeId::new("fleet-a"), ResourceKind::Cluster, "svc-1", cluster("svc-1"))
        .unwrap();

    let mut body = None;
    for _ in 0..100 {
        if let Ok(mut socket) = tokio::net::TcpStream::connect(debug_addr).await {
            socket
                .write_all(
                    b"GET /api/v1/nodes/fleet-a/clusters HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
                )
                .await
                .unwrap();
            let mut response = String::new();
            socket.read_to_string(&mut response).await.unwrap();
            body = Some(response);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let response = body.expect("debug API never came up");
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("\"svc-1\""), "{response}");

    harness.stop().await;
    assert!(tokio::net::TcpStream::connect(debug_addr).await.is_err());
}
