//! Tollgate Core - shared error, configuration and logging infrastructure
//!
//! Every other tollgate crate builds on the types defined here.

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
pub use logging::*;

// Re-export commonly used external types
pub use tracing;
