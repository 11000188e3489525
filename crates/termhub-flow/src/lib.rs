//! # termhub-flow
//!
//! Output flow control for termhub.
//!
//! This crate provides the per-session flow controller that sits between a
//! PTY process and the sink forwarding its bytes to the UI:
//!
//! - Bounded buffering with watermark-based backpressure and hysteresis
//! - Batch flush scheduling keyed to the session's activity tier
//! - Flood protection that pauses the producing process instead of blocking
//! - Lifecycle-safe disposal with deterministic timer cancellation
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on termhub-core only and
//! is wired against the capability traits at the seams (sink, notifier,
//! process control), so it is unit-testable without a real PTY or IPC bus.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod controller;
pub mod queue;

// Re-export commonly used types
pub use controller::{
    FloodCheck, FlowController, FlowStats, TOPIC_OUTPUT_FLOOD, TOPIC_OUTPUT_FLOOD_RESUMED,
    TOPIC_OUTPUT_OVERFLOW,
};
pub use queue::ChunkQueue;
