//! Core library for `grpcurl`: programmatic gRPC server introspection and
//! invocation with no compile-time knowledge of the server's proto schema.
//!
//! Schemas are resolved at runtime either via the server's reflection
//! service ([`reflection::ServerSource`]) or from a pre-built
//! `FileDescriptorSet` / `.proto` sources ([`descriptor::FileSource`]).
//! Requests and responses are represented as
//! [`prost_reflect::DynamicMessage`] values and transcoded to/from JSON (or
//! protobuf text format) without any generated message types.

pub mod codec;
pub mod commands;
pub mod connection;
pub mod descriptor;
pub mod descriptor_text;
pub mod error;
pub mod format;
pub mod metadata;
pub mod reflection;
pub mod units;

pub use error::{GrpcurlError, Result};
