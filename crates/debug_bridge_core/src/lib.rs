//! Debug Bridge Core
//!
//! A reusable async library that exposes a live debug session through a small set of
//! high-level operations (breakpoints, stepping, evaluation, session lifecycle, status).
//! The host debugger is reached through the [`DebugAdapter`] capability trait; this crate
//! layers path normalization and adapter-gap reconciliation on top of it.

pub mod adapter;
pub mod bridge;
pub mod config;
pub mod error;
pub mod ops;
pub mod paths;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use adapter::DebugAdapter;
pub use bridge::DebugBridge;
pub use config::BridgeConfig;
pub use error::DebugError;
pub use paths::WorkspacePaths;

/// Result type alias using DebugError
pub type Result<T> = std::result::Result<T, DebugError>;
