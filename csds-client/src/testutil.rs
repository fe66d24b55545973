//! Mock CSDS control plane for tests.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use envoy_types::pb::envoy::config::core::v3::Node;
use envoy_types::pb::envoy::service::status::v3::client_status_discovery_service_server::{
    ClientStatusDiscoveryService, ClientStatusDiscoveryServiceServer,
};
use envoy_types::pb::envoy::service::status::v3::{
    client_config::GenericXdsConfig, ClientConfig, ClientStatusRequest, ClientStatusResponse,
    ConfigStatus,
};
use envoy_types::pb::google::protobuf::{value::Kind, Struct, Value};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status};

use crate::transport::tonic::USER_PROJECT_HEADER;

pub(crate) const CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";

/// Answers every request with one client named after the request's node id.
///
/// The first `rejections` streams fail their first exchange with a
/// security-policy status.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockCsdsServer {
    rejections: usize,
    streams: Arc<AtomicUsize>,
}

impl MockCsdsServer {
    pub(crate) fn rejecting(rejections: usize) -> Self {
        Self {
            rejections,
            ..Default::default()
        }
    }

    pub(crate) fn streams_opened(&self) -> usize {
        self.streams.load(Ordering::SeqCst)
    }
}

fn string_value(s: &str) -> Value {
    Value {
        kind: Some(Kind::StringValue(s.to_string())),
    }
}

fn response_for(request: &ClientStatusRequest, user_project: &str) -> ClientStatusResponse {
    let node_id = request.node.as_ref().map(|n| n.id.clone()).unwrap_or_default();
    let metadata = Struct {
        fields: [
            ("XDS_STREAM_TYPE".to_string(), string_value("ADS")),
            ("USER_PROJECT".to_string(), string_value(user_project)),
        ]
        .into_iter()
        .collect(),
    };

    ClientStatusResponse {
        config: vec![ClientConfig {
            node: Some(Node {
                id: node_id,
                metadata: Some(metadata),
                ..Default::default()
            }),
            generic_xds_configs: vec![GenericXdsConfig {
                type_url: CLUSTER_TYPE_URL.to_string(),
                name: "cluster-a".to_string(),
                config_status: ConfigStatus::Synced as i32,
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

#[tonic::async_trait]
impl ClientStatusDiscoveryService for MockCsdsServer {
    type StreamClientStatusStream =
        Pin<Box<dyn Stream<Item = std::result::Result<ClientStatusResponse, Status>> + Send>>;

    async fn stream_client_status(
        &self,
        request: Request<tonic::Streaming<ClientStatusRequest>>,
    ) -> std::result::Result<Response<Self::StreamClientStatusStream>, Status> {
        let reject = self.streams.fetch_add(1, Ordering::SeqCst) < self.rejections;
        let user_project = request
            .metadata()
            .get(USER_PROJECT_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let mut inbound = request.into_inner();

        let outbound = async_stream::try_stream! {
            while let Some(req) = inbound.next().await {
                let req = req?;
                if reject {
                    Err(Status::permission_denied("Request rejected by RpcSecurityPolicy"))?;
                }
                yield response_for(&req, &user_project);
            }
        };

        Ok(Response::new(Box::pin(outbound)))
    }

    async fn fetch_client_status(
        &self,
        request: Request<ClientStatusRequest>,
    ) -> std::result::Result<Response<ClientStatusResponse>, Status> {
        Ok(Response::new(response_for(request.get_ref(), "")))
    }
}

pub(crate) async fn start_mock_server(server: MockCsdsServer) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(ClientStatusDiscoveryServiceServer::new(server))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    // Give the server a moment to start
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    addr
}
