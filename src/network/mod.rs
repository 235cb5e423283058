//! Network Module
//!
//! Connections to the cache servers and the pool that spreads load over
//! them.
//!
//! ## Architecture
//! - One task per connection, owning its socket, queue and parser
//! - Callers submit through cloneable handles and await a completion future
//! - The pool reads published status only; it never touches connection state

mod backoff;
mod connection;
mod endpoint;
mod events;
mod pending;
mod pool;

pub use backoff::Backoff;
pub use connection::{ConnectionHandle, ResponseFuture};
pub use endpoint::Endpoint;
pub use events::{ConnectionEvent, ConnectionState, ConnectionStatus};
pub use pending::{Completion, LoadGuard, PendingQueue, PendingRequest, ReplyOutcome};
pub use pool::{select_least_loaded, Pool};
