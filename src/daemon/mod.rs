//! Persistent connection daemon.
//!
//! A background process listening on a local Unix socket keeps a keyed
//! pool of live MCP sessions alive across independent CLI invocations,
//! so stateful workflows (browser sessions, DB transactions) survive
//! between calls.
//!
//! ```text
//! ┌──────────┐   Unix socket    ┌──────────────────┐
//! │ mcpx CLI │ ←──────────────→ │   mcpx daemon    │
//! └──────────┘  (HTTP framing)  └────────┬─────────┘
//!                                        │
//!               ┌────────────────────────┼────────────────────────┐
//!               ↓                        ↓                        ↓
//!       ┌──────────────┐        ┌──────────────┐        ┌──────────────┐
//!       │   browser    │        │   database   │        │  filesystem  │
//!       │ (persistent) │        │ (persistent) │        │ (persistent) │
//!       └──────────────┘        └──────────────┘        └──────────────┘
//! ```

pub mod client;
pub mod http;
pub mod lifecycle;
pub mod pool;
pub mod protocol;
pub mod service;

pub use client::DaemonClient;
pub use pool::{AcquireOutcome, ConnectionPool};
pub use protocol::{DaemonRequest, DaemonResponse, PooledServerInfo, RequestParams};
pub use service::DaemonService;
