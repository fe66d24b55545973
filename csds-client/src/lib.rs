//! A diagnostic client for the xDS [Client Status Discovery Service][csds].
//!
//! This crate queries a control plane for the configuration state of every
//! data-plane client connected to it, and renders it as a status table. It
//! handles:
//! - Building and validating the node matchers from YAML request documents
//! - Authenticating to the control plane
//! - Driving the CSDS stream, once or on an interval, re-opening streams the
//!   control plane rejects
//! - Rendering responses, with optional node id filtering and a JSON config
//!   dump
//!
//! # Example
//!
//! ```no_run
//! use csds_client::{CsdsClient, Renderer, SessionOptions};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> csds_client::Result<()> {
//! let options = SessionOptions::new("trafficdirector.googleapis.com:443")
//!     .with_request_yaml(
//!         r#"
//! node_matchers:
//!   - node_metadatas:
//!       - path: [{key: TRAFFICDIRECTOR_GCP_PROJECT_NUMBER}]
//!         value: {string_match: {exact: "123456789"}}
//!       - path: [{key: TRAFFICDIRECTOR_NETWORK_NAME}]
//!         value: {string_match: {exact: default}}
//! "#,
//!     )
//!     .with_monitor_interval(Duration::from_secs(5));
//!
//! let cancel = CancellationToken::new();
//! CsdsClient::new(options)?
//!     .run(Renderer::default(), &cancel)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! [csds]: https://www.envoyproxy.io/docs/envoy/latest/api-v3/service/status/v3/csds.proto

pub mod auth;
pub mod client;
pub mod codec;
pub mod error;
pub mod matcher;
pub mod message;
pub mod report;
pub mod transport;

#[cfg(test)]
mod testutil;

pub use client::config::{AuthnMode, FilterMode, Platform, SessionOptions, DEFAULT_SERVICE_URI};
pub use client::retry::{classify, Backoff, ErrorClass, RetryPolicy};
pub use client::{CsdsClient, Session, SessionState};
pub use error::{Conflict, Error, Result};
pub use matcher::{MatcherBuilder, NodeSelection};
pub use message::{
    ClientConfig, ClientNode, Node, NodeMatcher, StatusRequest, StatusResponse, StringMatcher,
    StructMatcher, ValueMatcher, XdsConfigEntry,
};
pub use report::{ConfigDump, DetailFormatter, NodeFilter, Renderer, XdsKind};
pub use transport::tonic::TonicTransport;
pub use transport::{Transport, TransportStream};
