//! # termhub-pool
//!
//! Warm shell process pool for termhub.
//!
//! This crate provides:
//! - A pool of pre-spawned, idle shell processes so that acquiring a
//!   terminal session avoids OS process-spawn latency
//! - Idle output draining (pooled shells produce nothing useful)
//! - Automatic refill on acquire and on pooled-process exit
//! - Disposal that wins races against in-flight spawns
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on termhub-core and
//! termhub-pty. The pool is an explicitly constructed, dependency-injected
//! instance owned by the session manager; it is never module-level state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod pool;

// Re-export commonly used types
pub use pool::ProcessPool;
