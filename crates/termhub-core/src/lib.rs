//! # termhub-core
//!
//! Core types for termhub.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other termhub crates. It provides:
//!
//! - Error types
//! - Configuration (pool, flow control, terminal settings)
//! - Session types (SessionId, ActivityTier, QueueState)
//! - Platform detection and shell resolution
//! - Capability traits at the component seams (sink, notifier, process control)
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other termhub crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export all modules
pub mod config;
pub mod error;
pub mod io;
pub mod platform;
pub mod session;

// Re-export commonly used types
pub use config::{AppConfig, FlowSettings, PoolSettings, TerminalSettings};
pub use error::{Error, Result};
pub use io::{Notifier, OutputSink, ProcessControl};
pub use platform::{resolve_shell, sanitized_env, Platform};
pub use session::{ActivityTier, QueueState, SessionId};
