//! `tonic` based transport implementation.
//!
//! Streams are opened with the envoy-types generated
//! `ClientStatusDiscoveryService` client. Outbound requests go through a
//! bounded channel so that sending never waits for the server's response
//! headers.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use envoy_types::pb::envoy::service::status::v3::{
    client_status_discovery_service_client::ClientStatusDiscoveryServiceClient,
    ClientStatusRequest, ClientStatusResponse,
};
use google_cloud_auth::credentials::Credentials;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::metadata::{Ascii, MetadataMap, MetadataValue};
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::{Status, Streaming};
use tracing::debug;

use crate::auth;
use crate::codec::prost::{decode_response, encode_request};
use crate::error::{Error, Result};
use crate::message::{StatusRequest, StatusResponse};
use crate::transport::{Transport, TransportStream};

const CSDS_CHANNEL_BUFFER_SIZE: usize = 16;

/// Header naming the project billed for the request.
pub const USER_PROJECT_HEADER: &str = "x-goog-user-project";

type CallResult = std::result::Result<Streaming<ClientStatusResponse>, Status>;
type CallFuture = Pin<Box<dyn Future<Output = CallResult> + Send>>;

/// Factory for CSDS streams using tonic.
///
/// Every stream opened carries the credential headers and the user project
/// header, if configured.
#[derive(Clone)]
pub struct TonicTransport {
    client: ClientStatusDiscoveryServiceClient<Channel>,
    credentials: Option<Credentials>,
    user_project: Option<MetadataValue<Ascii>>,
}

impl fmt::Debug for TonicTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TonicTransport")
            .field("credentials", &self.credentials.as_ref().map(|_| "<credentials>"))
            .field("user_project", &self.user_project)
            .finish_non_exhaustive()
    }
}

impl TonicTransport {
    /// Create a transport from an existing tonic [`Channel`].
    pub fn from_channel(channel: Channel) -> Self {
        Self {
            client: ClientStatusDiscoveryServiceClient::new(channel),
            credentials: None,
            user_project: None,
        }
    }

    /// Connect to a control plane.
    ///
    /// A URI without a scheme is treated as `https`. `https` URIs use TLS
    /// with the webpki root certificates.
    pub async fn connect(uri: impl AsRef<str>) -> Result<Self> {
        let uri = uri.as_ref();
        let uri = if uri.contains("://") {
            uri.to_string()
        } else {
            format!("https://{uri}")
        };

        let mut endpoint =
            Endpoint::from_shared(uri).map_err(|e| Error::Connection(e.to_string()))?;
        if endpoint.uri().scheme_str() == Some("https") {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new().with_webpki_roots())
                .map_err(|e| Error::Connection(e.to_string()))?;
        }

        debug!(uri = %endpoint.uri(), "connecting to control plane");
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        Ok(Self::from_channel(channel))
    }

    /// Attach `credentials` to every stream.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Attach the [`USER_PROJECT_HEADER`] to every stream.
    pub fn with_user_project(mut self, project: &str) -> Result<Self> {
        let value = project
            .parse::<MetadataValue<Ascii>>()
            .map_err(|_| {
                Error::Validation(format!("project number {project:?} is not visible ASCII"))
            })?;
        self.user_project = Some(value);
        Ok(self)
    }

    async fn call_metadata(&self) -> Result<MetadataMap> {
        let mut metadata = match &self.credentials {
            Some(credentials) => MetadataMap::from_headers(auth::headers(credentials).await?),
            None => MetadataMap::new(),
        };
        if let Some(project) = &self.user_project {
            metadata.insert(USER_PROJECT_HEADER, project.clone());
        }
        Ok(metadata)
    }
}

impl Transport for TonicTransport {
    type Stream = TonicStatusStream;

    async fn new_stream(&self) -> Result<Self::Stream> {
        let metadata = self.call_metadata().await?;
        let (tx, rx) = mpsc::channel::<ClientStatusRequest>(CSDS_CHANNEL_BUFFER_SIZE);

        let mut request = tonic::Request::new(ReceiverStream::new(rx));
        *request.metadata_mut() = metadata;

        // The call is driven on the first `recv`. Requests sent before then
        // wait in the channel.
        let mut client = self.client.clone();
        let call: CallFuture = Box::pin(async move {
            client
                .stream_client_status(request)
                .await
                .map(tonic::Response::into_inner)
        });

        debug!("opened CSDS stream");
        Ok(TonicStatusStream {
            sender: Some(tx),
            inbound: Inbound::Pending(call),
        })
    }
}

enum Inbound {
    Pending(CallFuture),
    Open(Streaming<ClientStatusResponse>),
    Failed,
}

/// A bidirectional CSDS stream backed by tonic.
pub struct TonicStatusStream {
    sender: Option<mpsc::Sender<ClientStatusRequest>>,
    inbound: Inbound,
}

impl fmt::Debug for TonicStatusStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inbound = match self.inbound {
            Inbound::Pending(_) => "pending",
            Inbound::Open(_) => "open",
            Inbound::Failed => "failed",
        };
        f.debug_struct("TonicStatusStream")
            .field("send_open", &self.sender.is_some())
            .field("inbound", &inbound)
            .finish()
    }
}

impl TransportStream for TonicStatusStream {
    async fn send(&mut self, request: &StatusRequest) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(Error::StreamClosed)?;
        sender
            .send(encode_request(request))
            .await
            .map_err(|_| Error::StreamClosed)
    }

    async fn recv(&mut self) -> Result<Option<StatusResponse>> {
        if let Inbound::Pending(_) = self.inbound {
            if let Inbound::Pending(call) = std::mem::replace(&mut self.inbound, Inbound::Failed) {
                self.inbound = Inbound::Open(call.await?);
            }
        }

        match &mut self.inbound {
            Inbound::Open(streaming) => Ok(streaming.message().await?.map(decode_response)),
            _ => Err(Error::StreamClosed),
        }
    }

    async fn close_send(&mut self) -> Result<()> {
        if self.sender.take().is_some() {
            debug!("closed send side of CSDS stream");
        }
        Ok(())
    }
}
