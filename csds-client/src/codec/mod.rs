//! Conversion between crate-owned messages and the CSDS wire format.
//!
//! The session driver and the report renderer only see the types in
//! [`message`](crate::message). The codec converts them to and from the
//! `envoy.service.status.v3` protobufs used by the gRPC transport.

pub mod prost;
