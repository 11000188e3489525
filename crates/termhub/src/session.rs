//! A live terminal session: a PTY process wired through a flow controller.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use termhub_core::{ActivityTier, ProcessControl, Result, SessionId};
use termhub_flow::{FloodCheck, FlowController, FlowStats};
use termhub_pty::PtyProcess;

/// How often the output pump polls an idle PTY.
const PUMP_IDLE_INTERVAL: Duration = Duration::from_millis(10);

/// One terminal session for its whole lifetime: the process, the flow
/// controller governing its output, and the pump task between them.
pub struct TerminalSession {
    id: SessionId,
    cwd: PathBuf,
    process: Arc<PtyProcess>,
    controller: FlowController,
    pump: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl std::fmt::Debug for TerminalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalSession")
            .field("id", &self.id)
            .field("cwd", &self.cwd)
            .finish_non_exhaustive()
    }
}

impl TerminalSession {
    /// Wire a process through its flow controller and start pumping output.
    pub(crate) fn start(
        id: SessionId,
        cwd: PathBuf,
        process: Arc<PtyProcess>,
        controller: FlowController,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            id,
            cwd,
            process,
            controller,
            pump: Mutex::new(None),
            disposed: AtomicBool::new(false),
        });

        let pump = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.pump_output().await }
        });
        *session.pump.lock().unwrap() = Some(pump);

        session
    }

    /// Poll the PTY and feed every chunk through the flow controller until
    /// the process exits or the session is disposed.
    async fn pump_output(&self) {
        loop {
            if self.disposed.load(Ordering::SeqCst) {
                return;
            }
            match self.process.read() {
                Ok(bytes) if !bytes.is_empty() => {
                    self.controller.write(&bytes);
                    tokio::task::yield_now().await;
                }
                Ok(_) => {
                    if !self.process.is_alive() {
                        break;
                    }
                    tokio::time::sleep(PUMP_IDLE_INTERVAL).await;
                }
                Err(_) => break,
            }
        }

        debug!("Session process exited: id={}", self.id);
        // Deliver whatever is still queued before the session goes quiet
        self.controller.flush();
    }

    /// The session's identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The working directory this session was created for.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Whether the underlying process is still running.
    pub fn is_alive(&self) -> bool {
        self.process.is_alive()
    }

    /// Send input bytes to the shell.
    pub fn write_input(&self, data: &[u8]) -> Result<usize> {
        self.process.write(data)
    }

    /// Resize the session's terminal.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        self.process.resize(rows, cols)
    }

    /// Update the session's activity tier (focused/visible/background).
    pub fn set_activity_tier(&self, tier: ActivityTier) {
        self.controller.set_activity_tier(tier);
    }

    /// Switch the session between hidden-terminal buffering and the visible
    /// batch path.
    pub fn set_buffering(&self, buffering: bool) {
        self.controller.set_buffering(buffering);
    }

    /// Flush all queued output now.
    pub fn flush(&self) {
        self.controller.flush();
    }

    /// Run one flood-check pass for this session.
    pub fn check_flooding(&self) -> FloodCheck {
        self.controller.check_flooding()
    }

    /// Diagnostics snapshot of the session's flow controller.
    pub fn stats(&self) -> FlowStats {
        self.controller.stats()
    }

    /// Dispose the session: stop the pump, discard queued output, and kill
    /// the process. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(pump) = self.pump.lock().unwrap().take() {
            pump.abort();
        }
        self.controller.dispose();
        if let Err(e) = self.process.kill() {
            debug!("Kill failed (process already dead?): {e}");
        }
        info!("Session disposed: id={}", self.id);
    }
}
