//! Client interface through which the user queries a control plane.
//!
//! A [`Session`] sends the status request on one CSDS stream, renders each
//! response and, in monitor mode, repeats after the configured interval until
//! cancelled. A stream rejected by the control plane's security policy is
//! replaced by a fresh stream on the same connection.

use std::io::Write;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth;
use crate::error::Result;
use crate::matcher::{MatcherBuilder, NodeSelection};
use crate::message::StatusRequest;
use crate::report::Renderer;
use crate::transport::{Transport, TransportStream};

pub mod config;
pub mod retry;

use config::SessionOptions;
use retry::{classify, Backoff, ErrorClass};

/// State carried from one exchange to the next.
#[derive(Debug)]
pub struct SessionState<S> {
    stream: S,
    backoff: Backoff,
    exchanges: usize,
    reopens: usize,
}

impl<S: TransportStream> SessionState<S> {
    /// Completed exchanges.
    pub fn exchanges(&self) -> usize {
        self.exchanges
    }

    /// Streams opened to replace rejected ones.
    pub fn reopens(&self) -> usize {
        self.reopens
    }

    /// Half-close the current stream.
    pub async fn close(mut self) -> Result<()> {
        self.stream.close_send().await
    }
}

/// Drives request/response exchanges over a [`Transport`].
#[derive(Debug)]
pub struct Session<T: Transport> {
    transport: T,
    request: StatusRequest,
    options: SessionOptions,
    renderer: Renderer,
}

impl<T: Transport> Session<T> {
    /// Create a session sending `request` on streams opened from `transport`.
    pub fn new(
        transport: T,
        request: StatusRequest,
        options: SessionOptions,
        renderer: Renderer,
    ) -> Self {
        Self {
            transport,
            request,
            options,
            renderer,
        }
    }

    /// Run the session, writing reports to `out`.
    ///
    /// Runs a single exchange unless the monitor interval is non-zero, in
    /// which case it polls until `cancel` fires. Cancellation ends the
    /// session successfully.
    pub async fn run<W: Write + ?Sized>(
        &self,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut state = tokio::select! {
            state = self.open() => state?,
            _ = cancel.cancelled() => return Ok(()),
        };

        loop {
            state = tokio::select! {
                state = self.step(state, &mut *out) => state?,
                _ = cancel.cancelled() => {
                    debug!("session cancelled during exchange");
                    return Ok(());
                }
            };

            if !self.options.is_monitor_mode() {
                return state.close().await;
            }

            info!(
                exchanges = state.exchanges(),
                interval = ?self.options.monitor_interval,
                "waiting for next exchange"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.options.monitor_interval) => {}
                _ = cancel.cancelled() => {
                    debug!(exchanges = state.exchanges(), "session cancelled");
                    return state.close().await;
                }
            }
        }
    }

    /// Open the first stream.
    pub async fn open(&self) -> Result<SessionState<T::Stream>> {
        Ok(SessionState {
            stream: self.transport.new_stream().await?,
            backoff: Backoff::new(self.options.retry_policy.clone()),
            exchanges: 0,
            reopens: 0,
        })
    }

    /// Complete one exchange, replacing the stream while the control plane
    /// rejects it.
    ///
    /// Errors other than a security-policy rejection are returned on first
    /// occurrence.
    pub async fn step<W: Write + ?Sized>(
        &self,
        mut state: SessionState<T::Stream>,
        out: &mut W,
    ) -> Result<SessionState<T::Stream>> {
        loop {
            let error = match self.exchange(&mut state.stream, &mut *out).await {
                Ok(()) => {
                    debug!("exchange complete");
                    state.backoff.reset();
                    state.exchanges += 1;
                    return Ok(state);
                }
                Err(error) => error,
            };

            if classify(&error) == ErrorClass::Fatal {
                return Err(error);
            }
            let Some(delay) = state.backoff.next_backoff() else {
                return Err(error);
            };
            warn!(%error, ?delay, "stream rejected, re-opening");
            tokio::time::sleep(delay).await;

            state.stream = self.transport.new_stream().await?;
            state.reopens += 1;
        }
    }

    async fn exchange<W: Write + ?Sized>(
        &self,
        stream: &mut T::Stream,
        out: &mut W,
    ) -> Result<()> {
        stream.send(&self.request).await?;
        // End of stream renders as an empty response.
        let response = stream.recv().await?.unwrap_or_default();
        self.renderer.render(&response, &self.options, out)
    }
}

/// A configured CSDS client.
///
/// # Example
///
/// ```no_run
/// use csds_client::{CsdsClient, Renderer, SessionOptions};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> csds_client::Result<()> {
/// let options = SessionOptions::new("trafficdirector.googleapis.com:443")
///     .with_request_file("request.yaml");
/// let client = CsdsClient::new(options)?;
/// client.run(Renderer::default(), &CancellationToken::new()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CsdsClient {
    options: SessionOptions,
    selection: NodeSelection,
}

impl CsdsClient {
    /// Build the node selection from the request documents in `options` and
    /// validate it for the configured platform.
    pub fn new(options: SessionOptions) -> Result<Self> {
        let mut builder = MatcherBuilder::new();
        if let Some(path) = &options.request_file {
            builder = builder.with_request_file(path);
        }
        if let Some(yaml) = &options.request_yaml {
            builder = builder.with_request_yaml(yaml);
        }
        let selection = builder.build(options.platform)?;
        Ok(Self { options, selection })
    }

    /// The validated node selection.
    pub fn selection(&self) -> &NodeSelection {
        &self.selection
    }

    /// Connect and run the session, writing reports to stdout.
    ///
    /// The connection is released when this returns.
    pub async fn run(&self, renderer: Renderer, cancel: &CancellationToken) -> Result<()> {
        let transport = auth::connect(&self.options, &self.selection).await?;
        let session = Session::new(
            transport,
            self.selection.to_request(),
            self.options.clone(),
            renderer,
        );
        session.run(&mut std::io::stdout(), cancel).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tonic::Status;

    use super::*;
    use crate::client::retry::RetryPolicy;
    use crate::error::Error;
    use crate::message::{ClientConfig, ClientNode, StatusResponse, XdsConfigEntry};
    use crate::testutil::{start_mock_server, MockCsdsServer, CLUSTER_TYPE_URL};
    use crate::transport::tonic::TonicTransport;

    type Script = Arc<Mutex<VecDeque<Result<Option<StatusResponse>>>>>;

    /// Scripted transport: every `recv`, on any stream, pops the next outcome.
    #[derive(Debug, Default, Clone)]
    struct ScriptedTransport {
        script: Script,
        sent: Arc<Mutex<Vec<StatusRequest>>>,
        streams_opened: Arc<AtomicUsize>,
        closed: Arc<AtomicBool>,
        cancel_when_drained: Option<CancellationToken>,
    }

    impl ScriptedTransport {
        fn new(outcomes: Vec<Result<Option<StatusResponse>>>) -> Self {
            Self {
                script: Arc::new(Mutex::new(outcomes.into())),
                ..Default::default()
            }
        }
    }

    #[derive(Debug)]
    struct ScriptedStream {
        transport: ScriptedTransport,
    }

    impl Transport for ScriptedTransport {
        type Stream = ScriptedStream;

        async fn new_stream(&self) -> Result<Self::Stream> {
            self.streams_opened.fetch_add(1, Ordering::SeqCst);
            Ok(ScriptedStream {
                transport: self.clone(),
            })
        }
    }

    impl TransportStream for ScriptedStream {
        async fn send(&mut self, request: &StatusRequest) -> Result<()> {
            self.transport.sent.lock().unwrap().push(request.clone());
            Ok(())
        }

        async fn recv(&mut self) -> Result<Option<StatusResponse>> {
            let mut script = self.transport.script.lock().unwrap();
            let outcome = script.pop_front().unwrap_or(Ok(None));
            if script.is_empty() {
                if let Some(cancel) = &self.transport.cancel_when_drained {
                    cancel.cancel();
                }
            }
            outcome
        }

        async fn close_send(&mut self) -> Result<()> {
            self.transport.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn response(node_id: &str) -> StatusResponse {
        StatusResponse {
            clients: vec![ClientConfig {
                node: Some(ClientNode {
                    id: node_id.to_string(),
                    ..Default::default()
                }),
                xds_configs: vec![XdsConfigEntry {
                    type_url: CLUSTER_TYPE_URL.to_string(),
                    config_status: "SYNCED".to_string(),
                    ..Default::default()
                }],
            }],
        }
    }

    fn rejection() -> Error {
        Error::Stream(Status::permission_denied(
            "Request rejected by RpcSecurityPolicy",
        ))
    }

    fn request() -> StatusRequest {
        StatusRequest {
            node_matchers: vec![],
            node_id: "csds-client".to_string(),
        }
    }

    fn session(
        transport: ScriptedTransport,
        options: SessionOptions,
    ) -> Session<ScriptedTransport> {
        Session::new(transport, request(), options, Renderer::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_exchange() {
        let transport = ScriptedTransport::new(vec![Ok(Some(response("node-1")))]);
        let session = session(transport.clone(), SessionOptions::new("x"));

        let mut out = Vec::new();
        session.run(&mut out, &CancellationToken::new()).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("Client ID"));
        assert!(out.contains("CDS   SYNCED"));
        assert_eq!(transport.streams_opened.load(Ordering::SeqCst), 1);
        assert!(transport.closed.load(Ordering::SeqCst));

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].node_id, "csds-client");
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_of_stream_renders_empty_report() {
        let transport = ScriptedTransport::new(vec![Ok(None)]);
        let session = session(transport, SessionOptions::new("x"));

        let mut out = Vec::new();
        session.run(&mut out, &CancellationToken::new()).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No xDS clients connected.\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_reopens_stream() {
        let transport =
            ScriptedTransport::new(vec![Err(rejection()), Ok(Some(response("node-1")))]);
        let session = session(transport.clone(), SessionOptions::new("x"));

        let mut out = Vec::new();
        session.run(&mut out, &CancellationToken::new()).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.matches("Client ID").count(), 1);
        assert_eq!(transport.streams_opened.load(Ordering::SeqCst), 2);
        assert_eq!(transport.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_tracks_state() {
        let transport = ScriptedTransport::new(vec![
            Err(rejection()),
            Err(rejection()),
            Ok(Some(response("node-1"))),
        ]);
        let session = session(transport, SessionOptions::new("x"));

        let state = session.open().await.unwrap();
        let state = session.step(state, &mut std::io::sink()).await.unwrap();
        assert_eq!(state.exchanges(), 1);
        assert_eq!(state.reopens(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_surfaces() {
        let transport = ScriptedTransport::new(vec![
            Err(Error::Stream(Status::internal("boom"))),
            Ok(Some(response("node-1"))),
        ]);
        let session = session(transport.clone(), SessionOptions::new("x"));

        let mut out = Vec::new();
        let err = session
            .run(&mut out, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Stream(status) if status.message() == "boom"));
        assert!(out.is_empty());
        assert_eq!(transport.streams_opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_limit() {
        let transport = ScriptedTransport::new(vec![
            Err(rejection()),
            Err(rejection()),
            Ok(Some(response("node-1"))),
        ]);
        let policy = RetryPolicy::default().with_max_attempts(Some(1));
        let session = session(
            transport.clone(),
            SessionOptions::new("x").with_retry_policy(policy),
        );

        let err = session
            .run(&mut std::io::sink(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Stream(_)));
        assert_eq!(transport.streams_opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_error_is_fatal() {
        let mut bad = response("node-1");
        bad.clients[0].xds_configs[0].type_url = "type.googleapis.com/unknown".to_string();
        let transport = ScriptedTransport::new(vec![Ok(Some(bad))]);
        let session = session(transport, SessionOptions::new("x"));

        let err = session
            .run(&mut std::io::sink(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedConfigType(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_mode_until_cancelled() {
        let cancel = CancellationToken::new();
        let mut transport = ScriptedTransport::new(vec![
            Ok(Some(response("node-1"))),
            Ok(Some(response("node-2"))),
            Ok(Some(response("node-3"))),
        ]);
        transport.cancel_when_drained = Some(cancel.clone());
        let options = SessionOptions::new("x").with_monitor_interval(Duration::from_secs(10));
        let session = session(transport.clone(), options);

        let mut out = Vec::new();
        session.run(&mut out, &cancel).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.matches("Client ID").count(), 3);
        assert!(out.contains("node-3"));
        assert_eq!(transport.sent.lock().unwrap().len(), 3);
        assert!(transport.closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_mode_resets_backoff_after_exchange() {
        let cancel = CancellationToken::new();
        let mut transport = ScriptedTransport::new(vec![
            Err(rejection()),
            Ok(Some(response("node-1"))),
            Err(rejection()),
            Ok(Some(response("node-2"))),
        ]);
        transport.cancel_when_drained = Some(cancel.clone());
        let policy = RetryPolicy::default().with_max_attempts(Some(1));
        let options = SessionOptions::new("x")
            .with_monitor_interval(Duration::from_secs(10))
            .with_retry_policy(policy);
        let session = session(transport.clone(), options);

        let mut out = Vec::new();
        session.run(&mut out, &cancel).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.matches("Client ID").count(), 2);
        assert!(out.contains("node-2"));
        assert_eq!(transport.streams_opened.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let transport = ScriptedTransport::new(vec![Ok(Some(response("node-1")))]);
        let options = SessionOptions::new("x").with_monitor_interval(Duration::from_secs(1));
        let session = session(transport, options);

        let mut out = Vec::new();
        session.run(&mut out, &cancel).await.unwrap();
    }

    #[test]
    fn test_csds_client_requires_input() {
        let err = CsdsClient::new(SessionOptions::new("x")).unwrap_err();
        assert!(matches!(err, Error::MissingInput));
    }

    #[test]
    fn test_csds_client_builds_selection() {
        let yaml = r#"
node_matchers:
  - node_metadatas:
      - path: [{key: TRAFFICDIRECTOR_GCP_PROJECT_NUMBER}]
        value: {string_match: {exact: "123"}}
      - path: [{key: TRAFFICDIRECTOR_NETWORK_NAME}]
        value: {string_match: {exact: default}}
"#;
        let client = CsdsClient::new(SessionOptions::new("x").with_request_yaml(yaml)).unwrap();
        assert_eq!(
            client
                .selection()
                .value_by_key("TRAFFICDIRECTOR_GCP_PROJECT_NUMBER"),
            "123"
        );
    }

    #[tokio::test]
    async fn test_session_over_tonic_recovers_from_rejection() {
        let server = MockCsdsServer::rejecting(1);
        let addr = start_mock_server(server.clone()).await;
        let transport = TonicTransport::connect(format!("http://{addr}"))
            .await
            .unwrap();
        let policy = RetryPolicy::default()
            .with_initial_backoff(Duration::from_millis(10))
            .unwrap();
        let session = Session::new(
            transport,
            request(),
            SessionOptions::new("x").with_retry_policy(policy),
            Renderer::default(),
        );

        let mut out = Vec::new();
        session.run(&mut out, &CancellationToken::new()).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("csds-client"));
        assert!(out.contains("CDS   SYNCED"));
        assert_eq!(server.streams_opened(), 2);
    }
}
