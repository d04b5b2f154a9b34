//! Download latency and throughput benchmark for the Cloud Storage gRPC API.

pub mod client;
pub mod config;
pub mod error;
pub mod path;
pub mod proto;
pub mod report;
pub mod runner;
pub mod server;
pub mod stats;
