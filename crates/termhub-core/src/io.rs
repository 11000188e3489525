//! Capability traits at the component seams.
//!
//! The flow controller is wired against these traits instead of concrete
//! collaborators so it stays unit-testable without a real IPC channel, event
//! bus, or OS process behind it.

use crate::Result;

/// Destination for finished output chunks and batches.
///
/// Implementations forward bytes toward the renderer (IPC channel, stdout,
/// a test buffer). Delivery semantics are the sink's responsibility; callers
/// only guarantee call order. An implementation must not call back into the
/// component that invoked it.
pub trait OutputSink: Send + Sync {
    /// Forward one finished chunk or batch.
    fn emit(&self, bytes: Vec<u8>);
}

/// Notification bus used to surface flood/overflow warnings to the user and
/// to other in-process listeners.
pub trait Notifier: Send + Sync {
    /// Publish a payload under a topic. Best-effort; never fails.
    fn publish(&self, topic: &str, payload: serde_json::Value);
}

/// Control surface of a byte-producing OS process.
///
/// All operations are best-effort: the process may already have exited, in
/// which case callers log and move on rather than treating the error as a
/// failure.
pub trait ProcessControl: Send + Sync {
    /// Suspend the process so it stops producing output.
    fn pause(&self) -> Result<()>;

    /// Resume a previously paused process.
    fn resume(&self) -> Result<()>;

    /// Terminate the process.
    fn kill(&self) -> Result<()>;

    /// OS process identifier, if the process is still addressable.
    fn process_id(&self) -> Option<u32>;
}
