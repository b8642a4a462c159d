#![forbid(unsafe_code)]

// matrix-stress library - synthetic Matrix users for homeserver load testing

pub mod agent;
pub mod client;
pub mod error;
pub mod host;
pub mod metrics;
pub mod session;
pub mod text;

pub use agent::ParticipantAgent;
pub use client::MatrixClient;
pub use error::HarnessError;
pub use host::HostCoordinator;
pub use metrics::{AgentMetrics, MetricsCollector, TestSummary};
pub use session::{Credentials, Session};
