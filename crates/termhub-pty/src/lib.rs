//! # termhub-pty
//!
//! PTY process lifecycle for termhub.
//!
//! This crate provides:
//! - Shell spawning with resolved shell, login args, and a sanitized
//!   environment
//! - Non-blocking output reads from the PTY master
//! - Input writing and terminal resizing
//! - Best-effort pause/resume of the child (SIGSTOP/SIGCONT on unix)
//! - Liveness checks and termination
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on termhub-core and
//! provides the byte-producing process that the flow controller governs.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod pty;

// Re-export commonly used types
pub use pty::{PtyProcess, SpawnOptions};
