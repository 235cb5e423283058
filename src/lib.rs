//! # nairkv
//!
//! Async client engine for the Nair binary cache protocol:
//! - Fixed-layout little-endian frame codec
//! - Lossless stream reassembly across arbitrary TCP fragmentation
//! - Self-healing connections with exponential reconnect backoff
//! - Per-request timeouts and head-of-queue reply correlation
//! - Least-loaded connection pool
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        NairClient                           │
//! │              (get / set / incr / del / get_meta)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                          Pool                               │
//! │               (least-loaded connected member)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ Connection  │   ...    │ Connection  │
//!   │ (task+FIFO) │          │ (task+FIFO) │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │   Codec /   │
//!   │   Parser    │
//!   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod network;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{NairError, Result};
pub use config::Config;
pub use client::{Meta, NairClient};
pub use network::{ConnectionEvent, ConnectionState, Pool};
pub use protocol::{Command, Response, Value};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of nairkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
