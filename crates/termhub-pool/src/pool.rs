//! Warm pool of pre-spawned idle shell processes.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use termhub_core::{Error, PoolSettings, ProcessControl, Result, TerminalSettings};
use termhub_pty::{PtyProcess, SpawnOptions};

/// How often an idle drain task polls its pooled process.
const IDLE_DRAIN_INTERVAL: Duration = Duration::from_millis(50);

/// One pre-spawned shell held by the pool.
struct PoolEntry {
    process: Arc<PtyProcess>,
    cwd: PathBuf,
    created_at: SystemTime,
    /// Discards idle output and watches for process exit
    idle_drain: JoinHandle<()>,
}

struct PoolState {
    entries: HashMap<u64, PoolEntry>,
    /// Acquisition order (oldest pooled process first)
    order: VecDeque<u64>,
    next_entry_id: u64,
    default_cwd: PathBuf,
    disposed: bool,
    refill_in_flight: bool,
}

struct PoolShared {
    settings: PoolSettings,
    terminal: TerminalSettings,
    state: Mutex<PoolState>,
}

/// Pool of warm, idle shell processes.
///
/// Keeps up to the configured number of shells pre-spawned so `acquire()`
/// can return a live process without paying spawn latency on the caller's
/// critical path. Explicitly constructed and dependency-injected; owned by
/// the session manager, never module-level state.
pub struct ProcessPool {
    shared: Arc<PoolShared>,
}

impl std::fmt::Debug for ProcessPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessPool")
            .field("target_size", &self.shared.settings.size)
            .finish_non_exhaustive()
    }
}

impl ProcessPool {
    /// Create an empty pool. Call [`warm_pool`](Self::warm_pool) to populate.
    pub fn new(settings: PoolSettings, terminal: TerminalSettings) -> Self {
        let default_cwd = settings
            .default_cwd
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            shared: Arc::new(PoolShared {
                settings,
                terminal,
                state: Mutex::new(PoolState {
                    entries: HashMap::new(),
                    order: VecDeque::new(),
                    next_entry_id: 0,
                    default_cwd,
                    disposed: false,
                    refill_in_flight: false,
                }),
            }),
        }
    }

    fn spawn_options(shared: &PoolShared, cwd: &Path) -> SpawnOptions {
        SpawnOptions {
            shell: shared.settings.shell.clone(),
            cwd: Some(cwd.to_path_buf()),
            rows: shared.terminal.default_rows,
            cols: shared.terminal.default_cols,
            term: shared.terminal.term.clone(),
        }
    }

    /// Top the pool up to its target size, spawning the deficit in parallel.
    ///
    /// Idempotent. A `Some` cwd also becomes the pool's default working
    /// directory for later refills. Warned no-op after disposal.
    pub async fn warm_pool(&self, cwd: Option<&Path>) {
        let (deficit, cwd) = {
            let mut state = self.shared.state.lock().unwrap();
            if state.disposed {
                warn!("warm_pool called on a disposed pool");
                return;
            }
            if let Some(dir) = cwd {
                state.default_cwd = dir.to_path_buf();
            }
            let deficit = self.shared.settings.size.saturating_sub(state.entries.len());
            (deficit, state.default_cwd.clone())
        };
        if deficit == 0 {
            return;
        }

        debug!(
            "Warming process pool: spawning {} shells in {}",
            deficit,
            cwd.display()
        );
        let tasks: Vec<_> = (0..deficit)
            .map(|_| tokio::spawn(Self::create_pool_entry(Arc::clone(&self.shared), cwd.clone())))
            .collect();
        for task in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Pool warm-up spawn failed: {e}"),
                Err(e) => error!("Pool warm-up task panicked: {e}"),
            }
        }
    }

    /// Spawn one shell and insert it into the pool.
    ///
    /// Disposal wins races against in-flight spawns: a spawn that completes
    /// after `dispose()` kills the fresh process instead of inserting it.
    async fn create_pool_entry(shared: Arc<PoolShared>, cwd: PathBuf) -> Result<()> {
        let options = Self::spawn_options(&shared, &cwd);
        let process = tokio::task::spawn_blocking(move || PtyProcess::spawn(&options))
            .await
            .map_err(|e| Error::PtyError(format!("spawn task failed: {e}")))??;
        let process = Arc::new(process);

        let mut state = shared.state.lock().unwrap();
        if state.disposed {
            drop(state);
            debug!("Pool disposed during spawn; killing fresh shell");
            if let Err(e) = process.kill() {
                debug!("Kill of fresh shell failed: {e}");
            }
            return Ok(());
        }

        let id = state.next_entry_id;
        state.next_entry_id += 1;
        let idle_drain = Self::spawn_idle_drain(Arc::clone(&shared), id, Arc::clone(&process));
        debug!(
            "Pooled shell ready: id={}, pid={:?}, cwd={}",
            id,
            process.process_id(),
            cwd.display()
        );
        state.entries.insert(
            id,
            PoolEntry {
                process,
                cwd,
                created_at: SystemTime::now(),
                idle_drain,
            },
        );
        state.order.push_back(id);
        Ok(())
    }

    /// Drain and discard a pooled shell's output; on process exit remove the
    /// entry and trigger a refill.
    fn spawn_idle_drain(
        shared: Arc<PoolShared>,
        id: u64,
        process: Arc<PtyProcess>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match process.read() {
                    Ok(bytes) if !bytes.is_empty() => {
                        // Idle shells produce nothing useful while pooled
                    }
                    Ok(_) => {
                        if !process.is_alive() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
                tokio::time::sleep(IDLE_DRAIN_INTERVAL).await;
            }

            let removed = {
                let mut state = shared.state.lock().unwrap();
                if state.disposed {
                    return;
                }
                match state.entries.remove(&id) {
                    Some(entry) => {
                        state.order.retain(|&e| e != id);
                        warn!(
                            "Pooled shell exited: id={}, cwd={}",
                            id,
                            entry.cwd.display()
                        );
                        true
                    }
                    None => false,
                }
            };
            if removed {
                Self::refill(shared).await;
            }
        })
    }

    /// Take a warm shell from the pool.
    ///
    /// Returns `None` if the pool is empty or disposed. The candidate is
    /// liveness-checked first; a dead entry is discarded with a refill
    /// trigger rather than handed to the caller. On success the idle drain is
    /// detached (the caller attaches its own output handling) and an
    /// asynchronous refill is triggered; refill never blocks this call.
    pub fn acquire(&self) -> Option<Arc<PtyProcess>> {
        let mut state = self.shared.state.lock().unwrap();
        if state.disposed {
            warn!("acquire called on a disposed pool");
            return None;
        }

        let id = match state.order.pop_front() {
            Some(id) => id,
            None => {
                debug!("Process pool empty");
                return None;
            }
        };
        let entry = state.entries.remove(&id)?;
        drop(state);

        entry.idle_drain.abort();

        if entry.process.is_alive() && entry.process.process_id().is_some() {
            let age = entry.created_at.elapsed().unwrap_or_default();
            debug!(
                "Acquired pooled shell: id={}, pid={:?}, warm for {:?}",
                id,
                entry.process.process_id(),
                age
            );
            Self::trigger_refill(&self.shared);
            Some(entry.process)
        } else {
            warn!("Pooled shell dead at acquire; discarding: id={}", id);
            if let Err(e) = entry.process.kill() {
                debug!("Kill of dead pooled shell failed: {e}");
            }
            Self::trigger_refill(&self.shared);
            None
        }
    }

    /// Refill the pool toward its target size.
    ///
    /// Safe to call concurrently: a single in-flight guard collapses
    /// simultaneous triggers (from `acquire` and from exit watches) into one
    /// batch of spawns.
    pub async fn refill_pool(&self) {
        Self::refill(Arc::clone(&self.shared)).await;
    }

    async fn refill(shared: Arc<PoolShared>) {
        let (deficit, cwd) = {
            let mut state = shared.state.lock().unwrap();
            if state.disposed || state.refill_in_flight {
                return;
            }
            let deficit = shared.settings.size.saturating_sub(state.entries.len());
            if deficit == 0 {
                return;
            }
            state.refill_in_flight = true;
            (deficit, state.default_cwd.clone())
        };

        debug!("Refilling process pool: spawning {} shells", deficit);
        let tasks: Vec<_> = (0..deficit)
            .map(|_| tokio::spawn(Self::create_pool_entry(Arc::clone(&shared), cwd.clone())))
            .collect();

        let mut spawned = 0usize;
        let mut failed = 0usize;
        for task in tasks {
            match task.await {
                Ok(Ok(())) => spawned += 1,
                Ok(Err(e)) => {
                    failed += 1;
                    error!("Pool refill spawn failed: {e}");
                }
                Err(e) => {
                    failed += 1;
                    error!("Pool refill task panicked: {e}");
                }
            }
        }
        if failed > 0 {
            warn!("Pool refill finished: {} spawned, {} failed", spawned, failed);
        } else {
            debug!("Pool refill complete: {} spawned", spawned);
        }

        // Guard released regardless of outcome
        shared.state.lock().unwrap().refill_in_flight = false;
    }

    fn trigger_refill(shared: &Arc<PoolShared>) {
        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            Self::refill(shared).await;
        });
    }

    /// Dispose the pool. Idempotent.
    ///
    /// Future acquires, warm-ups, and in-flight spawns become no-ops; every
    /// pooled process is killed synchronously and the map cleared. Errors
    /// killing an already-dead process are logged, not propagated.
    pub fn dispose(&self) {
        let entries = {
            let mut state = self.shared.state.lock().unwrap();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.order.clear();
            std::mem::take(&mut state.entries)
        };

        info!(
            "Disposing process pool: killing {} pooled shells",
            entries.len()
        );
        for (id, entry) in entries {
            entry.idle_drain.abort();
            if let Err(e) = entry.process.kill() {
                debug!("Kill of pooled shell {} failed (already dead?): {e}", id);
            }
        }
    }

    /// Change the working directory used for future refills.
    pub fn set_default_cwd(&self, cwd: &Path) {
        let mut state = self.shared.state.lock().unwrap();
        state.default_cwd = cwd.to_path_buf();
    }

    /// Number of shells currently pooled.
    pub fn pool_size(&self) -> usize {
        self.shared.state.lock().unwrap().entries.len()
    }

    /// Whether the pool has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.shared.state.lock().unwrap().disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings(size: usize) -> PoolSettings {
        PoolSettings {
            size,
            default_cwd: None,
            shell: Some(if cfg!(windows) { "cmd.exe" } else { "/bin/sh" }.to_string()),
        }
    }

    fn pool(size: usize) -> ProcessPool {
        ProcessPool::new(test_settings(size), TerminalSettings::default())
    }

    async fn wait_for_size(pool: &ProcessPool, size: usize) {
        for _ in 0..100 {
            if pool.pool_size() >= size {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("pool did not reach size {size}");
    }

    #[tokio::test]
    async fn test_warm_and_acquire() {
        let pool = pool(2);
        pool.warm_pool(None).await;
        assert_eq!(pool.pool_size(), 2);

        let first = pool.acquire().expect("first acquire");
        let second = pool.acquire().expect("second acquire");
        assert!(first.is_alive());
        assert!(second.is_alive());

        // Pool drained before any async refill has had a chance to land
        assert!(pool.acquire().is_none());

        // An awaited refill restores the pool
        pool.refill_pool().await;
        wait_for_size(&pool, 1).await;
        let third = pool.acquire().expect("acquire after refill");
        assert!(third.is_alive());

        first.kill().unwrap();
        second.kill().unwrap();
        third.kill().unwrap();
        pool.dispose();
    }

    #[tokio::test]
    async fn test_acquire_on_empty_pool() {
        let pool = pool(2);
        assert!(pool.acquire().is_none());
        pool.dispose();
    }

    #[tokio::test]
    async fn test_warm_is_idempotent() {
        let pool = pool(2);
        pool.warm_pool(None).await;
        pool.warm_pool(None).await;
        assert_eq!(pool.pool_size(), 2);
        pool.dispose();
    }

    #[tokio::test]
    async fn test_warm_pool_uses_requested_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(1);
        pool.warm_pool(Some(dir.path())).await;

        let process = pool.acquire().expect("acquire");
        assert_eq!(process.cwd(), dir.path());

        process.kill().unwrap();
        pool.dispose();
    }

    #[tokio::test]
    async fn test_dispose_kills_pooled_processes() {
        let pool = pool(1);
        pool.warm_pool(None).await;

        let process = {
            let state = pool.shared.state.lock().unwrap();
            let entry = state.entries.values().next().unwrap();
            Arc::clone(&entry.process)
        };
        assert!(process.is_alive());

        pool.dispose();

        for _ in 0..20 {
            if !process.is_alive() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!process.is_alive());
        assert_eq!(pool.pool_size(), 0);
        assert!(pool.acquire().is_none());
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent_and_final() {
        let pool = pool(1);
        pool.warm_pool(None).await;

        pool.dispose();
        pool.dispose();
        assert!(pool.acquire().is_none());
        assert!(pool.is_disposed());

        // Warm-up after disposal is a warned no-op
        pool.warm_pool(None).await;
        assert_eq!(pool.pool_size(), 0);
    }

    #[tokio::test]
    async fn test_dead_candidate_is_discarded() {
        let pool = pool(1);
        pool.warm_pool(None).await;

        let process = {
            let state = pool.shared.state.lock().unwrap();
            let entry = state.entries.values().next().unwrap();
            // Stop the exit watch so the dead entry stays in the map
            entry.idle_drain.abort();
            Arc::clone(&entry.process)
        };
        process.kill().unwrap();
        for _ in 0..20 {
            if !process.is_alive() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        // The dead candidate is discarded instead of handed out
        assert!(pool.acquire().is_none());
        pool.dispose();
    }

    #[tokio::test]
    async fn test_pooled_exit_triggers_refill() {
        let pool = pool(1);
        pool.warm_pool(None).await;

        let process = {
            let state = pool.shared.state.lock().unwrap();
            let entry = state.entries.values().next().unwrap();
            Arc::clone(&entry.process)
        };
        process.kill().unwrap();

        // The idle drain notices the exit, removes the entry, and respawns
        let mut replaced = false;
        for _ in 0..100 {
            {
                let state = pool.shared.state.lock().unwrap();
                if let Some(entry) = state.entries.values().next() {
                    if !Arc::ptr_eq(&entry.process, &process) {
                        replaced = true;
                    }
                }
            }
            if replaced {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(replaced, "pool never replaced the exited shell");
        pool.dispose();
    }

    #[tokio::test]
    async fn test_concurrent_refills_collapse() {
        let pool = pool(2);

        // The in-flight guard turns the second call into a no-op
        tokio::join!(pool.refill_pool(), pool.refill_pool());

        wait_for_size(&pool, 2).await;
        assert_eq!(pool.pool_size(), 2);
        pool.dispose();
    }
}
