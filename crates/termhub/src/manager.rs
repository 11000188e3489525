//! Session manager coordinating the pool, live sessions, and the flood
//! scheduler.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use termhub_core::{
    AppConfig, Error, Notifier, OutputSink, ProcessControl, Result, SessionId,
};
use termhub_flow::FlowController;
use termhub_pool::ProcessPool;
use termhub_pty::{PtyProcess, SpawnOptions};

use crate::session::TerminalSession;

/// Session manager owning the process pool and the registry of live
/// sessions.
///
/// The pool and notifier are dependency-injected so the manager composes the
/// same way in the binary and in tests. A single interval task drives every
/// session's flood check at the configured cadence.
pub struct SessionManager {
    config: AppConfig,
    pool: Arc<ProcessPool>,
    notifier: Arc<dyn Notifier>,
    sessions: Arc<RwLock<HashMap<SessionId, Arc<TerminalSession>>>>,
    flood_monitor: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl SessionManager {
    /// Create a manager and start its flood-check scheduler.
    pub fn new(config: AppConfig, pool: Arc<ProcessPool>, notifier: Arc<dyn Notifier>) -> Self {
        let sessions: Arc<RwLock<HashMap<SessionId, Arc<TerminalSession>>>> =
            Arc::new(RwLock::new(HashMap::new()));
        let flood_monitor =
            Self::spawn_flood_monitor(Arc::clone(&sessions), config.flow.flood_check_interval());

        Self {
            config,
            pool,
            notifier,
            sessions,
            flood_monitor: Mutex::new(Some(flood_monitor)),
            disposed: AtomicBool::new(false),
        }
    }

    /// Drive every session's flood check on a fixed cadence.
    fn spawn_flood_monitor(
        sessions: Arc<RwLock<HashMap<SessionId, Arc<TerminalSession>>>>,
        interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let snapshot: Vec<_> = sessions.read().unwrap().values().cloned().collect();
                for session in snapshot {
                    session.check_flooding();
                }
            }
        })
    }

    /// Create a terminal session, preferring a warm pooled shell over a
    /// fresh spawn.
    ///
    /// `sink` receives the session's flow-controlled output batches.
    pub async fn create_session(
        &self,
        cwd: Option<PathBuf>,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Arc<TerminalSession>> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(Error::Disposed("session manager"));
        }

        let id = SessionId::new();
        let process = match self.pool.acquire() {
            Some(process) => {
                info!("Creating session from warm pool: id={}", id);
                if let Some(dir) = &cwd {
                    if process.cwd() != dir.as_path() {
                        // The pooled shell was warmed elsewhere; move it
                        let quoted = dir.display().to_string().replace('\'', r"'\''");
                        process.write(format!("cd '{quoted}'\r").as_bytes())?;
                    }
                }
                process
            }
            None => {
                debug!("Pool empty; spawning fresh shell: id={}", id);
                let options = SpawnOptions {
                    shell: self.config.pool.shell.clone(),
                    cwd: cwd.clone(),
                    rows: self.config.terminal.default_rows,
                    cols: self.config.terminal.default_cols,
                    term: self.config.terminal.term.clone(),
                };
                let process = tokio::task::spawn_blocking(move || PtyProcess::spawn(&options))
                    .await
                    .map_err(|e| Error::PtyError(format!("spawn task failed: {e}")))??;
                Arc::new(process)
            }
        };

        let cwd = cwd.unwrap_or_else(|| process.cwd().to_path_buf());
        let controller = FlowController::new(
            id,
            self.config.flow.clone(),
            Arc::clone(&process) as Arc<dyn ProcessControl>,
            sink,
            Arc::clone(&self.notifier),
        );
        let session = TerminalSession::start(id, cwd, process, controller);

        self.sessions
            .write()
            .unwrap()
            .insert(id, Arc::clone(&session));
        info!("Session created: id={}", id);
        Ok(session)
    }

    /// Get a session by ID.
    pub fn get_session(&self, id: &SessionId) -> Result<Arc<TerminalSession>> {
        self.sessions
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or(Error::SessionNotFound(*id))
    }

    /// IDs of all live sessions.
    pub fn list_sessions(&self) -> Vec<SessionId> {
        self.sessions.read().unwrap().keys().copied().collect()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Dispose one session and remove it from the registry.
    pub fn close_session(&self, id: &SessionId) -> Result<()> {
        let session = self
            .sessions
            .write()
            .unwrap()
            .remove(id)
            .ok_or(Error::SessionNotFound(*id))?;
        session.dispose();
        Ok(())
    }

    /// Dispose every session, stop the flood scheduler, and dispose the
    /// pool. Idempotent.
    pub fn shutdown(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Session manager shutting down");

        if let Some(monitor) = self.flood_monitor.lock().unwrap().take() {
            monitor.abort();
        }
        let sessions: Vec<_> = self
            .sessions
            .write()
            .unwrap()
            .drain()
            .map(|(_, session)| session)
            .collect();
        for session in sessions {
            session.dispose();
        }
        self.pool.dispose();
    }

    /// The process pool this manager owns.
    pub fn pool(&self) -> &Arc<ProcessPool> {
        &self.pool
    }
}
