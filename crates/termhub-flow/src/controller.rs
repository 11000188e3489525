//! Per-session output flow controller.
//!
//! One controller governs the rate and grouping at which a single terminal
//! session's raw output bytes reach the UI sink. It protects the application
//! from unbounded memory growth, the UI from being overwhelmed, and the
//! spawned process from producing faster than anything can drain.
//!
//! `write()` is synchronous and never blocks the producer: under overload the
//! controller drops data (oldest first) or pauses the producing OS process.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use termhub_core::{
    ActivityTier, FlowSettings, Notifier, OutputSink, ProcessControl, QueueState, SessionId,
};

use crate::queue::ChunkQueue;

/// Notification topic published when the batch queue crosses the hard
/// watermark and old output starts being dropped.
pub const TOPIC_OUTPUT_OVERFLOW: &str = "output-overflow";
/// Notification topic published when a session's process is paused for
/// flooding.
pub const TOPIC_OUTPUT_FLOOD: &str = "output-flood";
/// Notification topic published when a flooded session's process resumes.
pub const TOPIC_OUTPUT_FLOOD_RESUMED: &str = "output-flood-resumed";

/// Result of one flood-check pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FloodCheck {
    /// Whether the session is flooded after this check
    pub flooded: bool,
    /// Whether this check resumed a previously paused process
    pub resumed: bool,
}

/// Read-only diagnostics snapshot of a flow controller.
#[derive(Debug, Clone, Serialize)]
pub struct FlowStats {
    /// Current watermark state of the batch queue
    pub queue_state: QueueState,
    /// Current activity tier
    pub activity_tier: ActivityTier,
    /// Whether the session is in buffering (hidden-terminal) mode
    pub buffering: bool,
    /// Whether the producing process is paused for flooding
    pub flooded: bool,
    /// Chunks in the buffering-mode queue
    pub pending_chunks: usize,
    /// Bytes in the buffering-mode queue
    pub pending_bytes: usize,
    /// Chunks in the batch queue
    pub batch_chunks: usize,
    /// Bytes in the batch queue
    pub batch_bytes: usize,
}

/// A scheduled batch flush, cancellable by aborting its task.
struct FlushTimer {
    handle: JoinHandle<()>,
    deadline: Instant,
}

/// Mutable per-session output state. All fields are guarded by one mutex;
/// no method holds the lock across an await point.
struct FlowState {
    buffering: bool,
    pending: ChunkQueue,
    batch: ChunkQueue,
    queue_state: QueueState,
    last_state_change: Instant,
    hard_warned: bool,
    tier: ActivityTier,
    last_tier_change: Option<Instant>,
    bytes_this_interval: usize,
    flooded: bool,
    last_resume_at: Option<Instant>,
    flush_timer: Option<FlushTimer>,
    disposed: bool,
}

struct Inner {
    session_id: SessionId,
    settings: FlowSettings,
    process: Arc<dyn ProcessControl>,
    sink: Arc<dyn OutputSink>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<FlowState>,
}

/// Flow controller for a single terminal session.
///
/// Must be used from within a tokio runtime: flush timers are spawned tasks.
/// Never shared across sessions; dispose it when the session is torn down.
pub struct FlowController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for FlowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowController")
            .field("session_id", &self.inner.session_id)
            .finish_non_exhaustive()
    }
}

impl FlowController {
    /// Create a controller for one session.
    ///
    /// `process` is the pause/resume target for flood protection; `sink`
    /// receives finished batches; `notifier` surfaces overflow and flood
    /// warnings to the user.
    pub fn new(
        session_id: SessionId,
        settings: FlowSettings,
        process: Arc<dyn ProcessControl>,
        sink: Arc<dyn OutputSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let now = Instant::now();
        Self {
            inner: Arc::new(Inner {
                session_id,
                settings,
                process,
                sink,
                notifier,
                state: Mutex::new(FlowState {
                    buffering: false,
                    pending: ChunkQueue::new(),
                    batch: ChunkQueue::new(),
                    queue_state: QueueState::Normal,
                    last_state_change: now,
                    hard_warned: false,
                    tier: ActivityTier::Visible,
                    last_tier_change: None,
                    bytes_this_interval: 0,
                    flooded: false,
                    last_resume_at: None,
                    flush_timer: None,
                    disposed: false,
                }),
            }),
        }
    }

    /// Accept one chunk of raw output from the PTY.
    ///
    /// Returns whether the chunk was processed. A `false` return means the
    /// chunk was dropped: the session is flooded, disposed, or the chunk
    /// alone exceeds the hard queue limit.
    pub fn write(&self, data: &[u8]) -> bool {
        let inner = &self.inner;
        let mut state = inner.state.lock().unwrap();

        if state.disposed {
            return false;
        }

        state.bytes_this_interval = state.bytes_this_interval.saturating_add(data.len());

        if state.flooded {
            trace!(
                "Dropping {} bytes while flooded: id={}",
                data.len(),
                inner.session_id
            );
            return false;
        }

        if data.is_empty() {
            return true;
        }

        if state.buffering {
            state.pending.push(data.to_vec());
            if state.pending.len() >= inner.settings.max_pending_chunks
                || state.pending.bytes() >= inner.settings.max_pending_bytes
            {
                debug!(
                    "Buffered queue full ({} chunks, {} bytes); flushing: id={}",
                    state.pending.len(),
                    state.pending.bytes(),
                    inner.session_id
                );
                Inner::flush_pending(inner, &mut state);
            }
            true
        } else {
            if !Inner::enforce_queue_limits(inner, &mut state, data.len()) {
                return false;
            }
            state.batch.push(data.to_vec());
            Inner::schedule_batch_flush(inner, &mut state);
            true
        }
    }

    /// Switch between the hidden-terminal buffering path and the visible
    /// batch path.
    ///
    /// Whatever the path being left still holds is flushed first, so no
    /// deferred output is stranded across a visibility flip.
    pub fn set_buffering(&self, buffering: bool) {
        let mut state = self.inner.state.lock().unwrap();
        if state.disposed || state.buffering == buffering {
            return;
        }

        debug!(
            "Buffering mode {} → {}: id={}",
            state.buffering, buffering, self.inner.session_id
        );
        if buffering {
            Inner::flush_batch(&self.inner, &mut state);
            state.buffering = true;
        } else {
            state.buffering = false;
            Inner::flush_pending(&self.inner, &mut state);
        }
    }

    /// Update the session's activity tier.
    ///
    /// Debounced: changes within the configured window of the previous change
    /// are ignored, since the UI's focus tracking is itself noisy. An accepted
    /// change with a pending batch reschedules the flush if the new tier's
    /// delay lands sooner.
    pub fn set_activity_tier(&self, tier: ActivityTier) {
        let inner = &self.inner;
        let mut state = inner.state.lock().unwrap();
        if state.disposed {
            return;
        }

        let now = Instant::now();
        if let Some(last) = state.last_tier_change {
            if now.duration_since(last) < inner.settings.tier_debounce() {
                trace!(
                    "Ignoring tier change to {:?} inside debounce window: id={}",
                    tier,
                    inner.session_id
                );
                return;
            }
        }
        if state.tier == tier {
            return;
        }

        debug!(
            "Activity tier {:?} → {:?}: id={}",
            state.tier, tier, inner.session_id
        );
        state.tier = tier;
        state.last_tier_change = Some(now);

        if !state.batch.is_empty() {
            Inner::schedule_batch_flush(inner, &mut state);
        }
    }

    /// Flush everything currently queued, one emission per non-empty queue.
    pub fn flush(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.disposed {
            return;
        }
        Inner::flush_pending(&self.inner, &mut state);
        Inner::flush_batch(&self.inner, &mut state);
    }

    /// Run one flood-check pass. Called on a fixed cadence by the session
    /// manager's scheduler, never from `write()`.
    ///
    /// Reads and resets the interval byte counter. Crossing the flood
    /// threshold pauses the producing process (best-effort) and synthesizes a
    /// warning into the stream; dropping below the resume threshold clears the
    /// flood only once the cooldown since the last pause/resume has elapsed.
    pub fn check_flooding(&self) -> FloodCheck {
        let inner = &self.inner;
        let mut state = inner.state.lock().unwrap();
        if state.disposed {
            return FloodCheck::default();
        }

        let settings = &inner.settings;
        let interval_bytes = state.bytes_this_interval;
        state.bytes_this_interval = 0;
        let now = Instant::now();

        if !state.flooded && interval_bytes > settings.flood_threshold_bytes {
            state.flooded = true;
            state.last_resume_at = Some(now);
            warn!(
                "Output flood ({} bytes in one interval); pausing process: id={}",
                interval_bytes, inner.session_id
            );
            if let Err(e) = inner.process.pause() {
                debug!("Pause failed (process may have exited): {e}");
            }
            inner.sink.emit(
                format!(
                    "\r\n\x1b[33m[output paused: process produced {interval_bytes} bytes in the last interval]\x1b[0m\r\n"
                )
                .into_bytes(),
            );
            inner.notifier.publish(
                TOPIC_OUTPUT_FLOOD,
                serde_json::json!({
                    "session_id": inner.session_id,
                    "interval_bytes": interval_bytes,
                    "flood_threshold_bytes": settings.flood_threshold_bytes,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                }),
            );
            return FloodCheck {
                flooded: true,
                resumed: false,
            };
        }

        if state.flooded && interval_bytes < settings.resume_threshold_bytes {
            let cooled = state
                .last_resume_at
                .map_or(true, |at| now.duration_since(at) >= settings.flood_cooldown());
            if cooled {
                state.flooded = false;
                state.last_resume_at = Some(now);
                info!(
                    "Output rate normalized; resuming process: id={}",
                    inner.session_id
                );
                if let Err(e) = inner.process.resume() {
                    debug!("Resume failed (process may have exited): {e}");
                }
                inner
                    .sink
                    .emit(b"\r\n\x1b[32m[output resumed]\x1b[0m\r\n".to_vec());
                inner.notifier.publish(
                    TOPIC_OUTPUT_FLOOD_RESUMED,
                    serde_json::json!({
                        "session_id": inner.session_id,
                        "interval_bytes": interval_bytes,
                        "timestamp": chrono::Utc::now().to_rfc3339(),
                    }),
                );
                return FloodCheck {
                    flooded: false,
                    resumed: true,
                };
            }
        }

        FloodCheck {
            flooded: state.flooded,
            resumed: false,
        }
    }

    /// Dispose the controller. Idempotent.
    ///
    /// Cancels any pending flush timer and discards both queues without
    /// emitting them; nothing queued before disposal is delivered after it.
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.disposed {
            return;
        }
        state.disposed = true;

        if let Some(timer) = state.flush_timer.take() {
            timer.handle.abort();
        }
        let dropped = state.pending.bytes() + state.batch.bytes();
        state.pending.clear();
        state.batch.clear();
        debug!(
            "Flow controller disposed, {} undelivered bytes discarded: id={}",
            dropped, self.inner.session_id
        );
    }

    /// The session this controller belongs to.
    pub fn session_id(&self) -> SessionId {
        self.inner.session_id
    }

    /// Current watermark state of the batch queue.
    pub fn queue_state(&self) -> QueueState {
        self.inner.state.lock().unwrap().queue_state
    }

    /// Whether the producing process is currently paused for flooding.
    pub fn is_flooded(&self) -> bool {
        self.inner.state.lock().unwrap().flooded
    }

    /// Whether the session is in buffering (hidden-terminal) mode.
    pub fn is_buffering(&self) -> bool {
        self.inner.state.lock().unwrap().buffering
    }

    /// Diagnostics snapshot for telemetry.
    pub fn stats(&self) -> FlowStats {
        let state = self.inner.state.lock().unwrap();
        FlowStats {
            queue_state: state.queue_state,
            activity_tier: state.tier,
            buffering: state.buffering,
            flooded: state.flooded,
            pending_chunks: state.pending.len(),
            pending_bytes: state.pending.bytes(),
            batch_chunks: state.batch.len(),
            batch_bytes: state.batch.bytes(),
        }
    }
}

impl Inner {
    /// Enforce the soft/hard watermarks before appending `incoming` bytes to
    /// the batch queue. Returns whether the incoming chunk may be appended.
    ///
    /// Bounded memory wins over completeness: under sustained overload the
    /// oldest buffered output is dropped rather than letting the queue grow
    /// or blocking the producer.
    fn enforce_queue_limits(inner: &Arc<Inner>, state: &mut FlowState, incoming: usize) -> bool {
        let settings = &inner.settings;
        let total = state.batch.bytes() + incoming;
        let now = Instant::now();

        if total > settings.hard_limit_bytes {
            if state.queue_state != QueueState::Hard {
                debug!(
                    "Queue state {:?} → hard ({} bytes): id={}",
                    state.queue_state, total, inner.session_id
                );
                state.queue_state = QueueState::Hard;
                state.last_state_change = now;
            }
            if !state.hard_warned {
                state.hard_warned = true;
                warn!(
                    "Output queue over hard limit; dropping oldest output: id={}",
                    inner.session_id
                );
                inner.notifier.publish(
                    TOPIC_OUTPUT_OVERFLOW,
                    serde_json::json!({
                        "session_id": inner.session_id,
                        "queued_bytes": state.batch.bytes(),
                        "incoming_bytes": incoming,
                        "hard_limit_bytes": settings.hard_limit_bytes,
                        "timestamp": chrono::Utc::now().to_rfc3339(),
                    }),
                );
            }

            if incoming > settings.hard_limit_bytes {
                // A single chunk larger than the whole hard limit is never
                // buffered; the queued backlog goes with it
                let dropped = state.batch.bytes();
                state.batch.clear();
                warn!(
                    "Discarded {} queued bytes and a {} byte oversized chunk: id={}",
                    dropped, incoming, inner.session_id
                );
                return false;
            }

            let mut evicted = 0usize;
            while state.batch.bytes() + incoming > settings.hard_limit_bytes {
                match state.batch.pop_oldest() {
                    Some(chunk) => evicted += chunk.len(),
                    None => break,
                }
            }
            if evicted > 0 {
                warn!(
                    "Evicted {} bytes of oldest output: id={}",
                    evicted, inner.session_id
                );
            }
            true
        } else if total > settings.soft_limit_bytes {
            if state.queue_state == QueueState::Normal {
                debug!(
                    "Queue state normal → soft ({} bytes): id={}",
                    total, inner.session_id
                );
                state.queue_state = QueueState::Soft;
                state.last_state_change = now;
            }
            true
        } else {
            if state.queue_state != QueueState::Normal
                && now.duration_since(state.last_state_change) >= settings.queue_state_dwell()
            {
                debug!(
                    "Queue state {:?} → normal: id={}",
                    state.queue_state, inner.session_id
                );
                state.queue_state = QueueState::Normal;
                state.last_state_change = now;
                state.hard_warned = false;
            }
            true
        }
    }

    /// Delay before the accumulated batch should be emitted.
    fn flush_delay(&self, state: &FlowState) -> Duration {
        let settings = &self.settings;
        let mut delay = match state.queue_state {
            QueueState::Hard => Duration::ZERO,
            QueueState::Soft => settings.soft_state_flush(),
            QueueState::Normal => match state.tier {
                ActivityTier::Focused => settings.focused_flush(),
                ActivityTier::Visible => settings.visible_flush(),
                ActivityTier::Background => settings.background_flush(),
            },
        };

        // A large paste or tool dump should land as one atomic update
        // instead of tearing across several IPC messages
        if state.queue_state != QueueState::Hard
            && state.batch.bytes() >= settings.bulk_threshold_bytes
        {
            delay = delay.max(settings.bulk_flush());
        }

        delay
    }

    /// Schedule (or tighten) the batch flush timer. A zero delay flushes
    /// synchronously and cancels any pending timer.
    fn schedule_batch_flush(inner: &Arc<Inner>, state: &mut FlowState) {
        let delay = inner.flush_delay(state);

        if delay.is_zero() {
            Self::flush_batch(inner, state);
            return;
        }

        let deadline = Instant::now() + delay;
        if let Some(timer) = &state.flush_timer {
            if timer.deadline <= deadline {
                // The scheduled flush already fires at least as soon
                return;
            }
            timer.handle.abort();
            trace!(
                "Rescheduling batch flush sooner ({}ms): id={}",
                delay.as_millis(),
                inner.session_id
            );
        }

        let handle = tokio::spawn({
            let inner = Arc::clone(inner);
            async move {
                tokio::time::sleep_until(deadline).await;
                let mut state = inner.state.lock().unwrap();
                if state.disposed {
                    return;
                }
                state.flush_timer = None;
                Inner::flush_batch(&inner, &mut state);
            }
        });
        state.flush_timer = Some(FlushTimer { handle, deadline });
    }

    /// Concatenate and emit the batch queue as one unit; cancels any pending
    /// timer. No-op when empty.
    fn flush_batch(inner: &Arc<Inner>, state: &mut FlowState) {
        if let Some(timer) = state.flush_timer.take() {
            timer.handle.abort();
        }
        if state.batch.is_empty() {
            return;
        }
        let buffer = state.batch.concat();
        trace!(
            "Flushing batch of {} bytes: id={}",
            buffer.len(),
            inner.session_id
        );
        inner.sink.emit(buffer);
    }

    /// Concatenate and emit the buffering-mode queue as one unit. No-op when
    /// empty.
    fn flush_pending(inner: &Arc<Inner>, state: &mut FlowState) {
        if state.pending.is_empty() {
            return;
        }
        let buffer = state.pending.concat();
        trace!(
            "Flushing {} buffered bytes: id={}",
            buffer.len(),
            inner.session_id
        );
        inner.sink.emit(buffer);
    }
}
