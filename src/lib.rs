// ABOUTME: Library root for clusteradm - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod checker;
pub mod command;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod errno;
pub mod error;
pub mod http_client;
pub mod output;
pub mod runner;
pub mod ssh;
pub mod step;
pub mod storage;
pub mod task;
pub mod topology;
pub mod transport;
pub mod types;
pub mod workflow;
