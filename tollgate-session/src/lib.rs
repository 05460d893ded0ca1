//! Tollgate Session - signed bearer tokens backed by a live session registry
//!
//! - [`TokenCodec`] builds and checks the `header.payload.signature` wire format
//! - [`SessionStore`] is the lock-guarded in-memory index
//! - [`SessionProvider`] is the durable storage contract
//! - [`SessionManager`] ties them together with sliding expiration

pub mod clock;
pub mod codec;
pub mod events;
pub mod manager;
pub mod provider;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{DecodedToken, TokenCodec};
pub use events::{SessionEvent, SessionEvents};
pub use manager::SessionManager;
pub use provider::{InMemoryProvider, SessionProvider};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSessionProvider;
pub use store::{SessionStore, SessionStoreGuard};
pub use types::*;
