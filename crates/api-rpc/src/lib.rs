//! JSON-RPC API Layer
//!
//! Implements the JSON-RPC 2.0 server for Harvest Engine: starting
//! extractions, querying job snapshots and live progress subscriptions.

pub mod error;
pub mod handler;
pub mod server;
pub mod subscription;
pub mod types;

pub use server::{RpcServer, RpcServerConfig};
