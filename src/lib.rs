//! # ontap-mcp
//!
//! MCP server exposing NetApp ONTAP storage administration (volumes,
//! snapshots, QoS, CIFS shares, NFS exports) to AI agents.
//!
//! ## Architecture
//!
//! ```text
//! stdio.rs / http.rs   transports
//!        │
//!     mcp.rs           JSON-RPC dispatcher (rpc.rs envelopes)
//!        │
//!   tools/mod.rs       tool registry ──► tools/args.rs dual-mode client resolution
//!        │                                   │
//!  clusters.rs         cluster registry  ◄───┘   sessions.rs: one registry per HTTP session
//!        │
//!  client.rs / api.rs  ONTAP REST client
//! ```

pub mod api;
pub mod client;
pub mod clusters;
pub mod config;
pub mod http;
pub mod mcp;
pub mod rpc;
pub mod sessions;
pub mod stdio;
pub mod tools;

pub use client::{ClientError, ClusterClient};
pub use clusters::ClusterRegistry;
pub use config::{ClusterConfig, Config};
pub use mcp::McpServer;
pub use sessions::SessionStore;
pub use tools::{default_registry, CallToolResult, ToolRegistry};
