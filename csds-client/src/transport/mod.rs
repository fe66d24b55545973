//! Provides abstraction for transport layers.

use std::future::Future;

use crate::error::Result;
use crate::message::{StatusRequest, StatusResponse};

pub mod tonic;

/// Factory for CSDS streams over an established, authenticated connection.
///
/// This abstraction allows for different transport implementations:
/// - Tonic-based gRPC transport
/// - Mock transport for testing
pub trait Transport: Send + Sync + 'static {
    /// The stream type produced by this transport.
    type Stream: TransportStream;

    /// Opens a new bidirectional `StreamClientStatus` stream.
    ///
    /// This may be called multiple times to replace a rejected stream.
    fn new_stream(&self) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// A bidirectional CSDS stream.
pub trait TransportStream: Send + 'static {
    /// Send a status request.
    fn send(&mut self, request: &StatusRequest) -> impl Future<Output = Result<()>> + Send;

    /// Receive the next status response.
    ///
    /// Returns:
    /// - `Ok(Some(response))` - Received a response.
    /// - `Ok(None)` - Stream closed normally.
    /// - `Err(_)` - Stream error.
    fn recv(&mut self) -> impl Future<Output = Result<Option<StatusResponse>>> + Send;

    /// Close the send side of the stream.
    fn close_send(&mut self) -> impl Future<Output = Result<()>> + Send;
}
