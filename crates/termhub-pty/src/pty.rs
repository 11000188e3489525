//! PTY (Pseudo-Terminal) handling with portable-pty.

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, error, info};

use termhub_core::{resolve_shell, sanitized_env, Error, ProcessControl, Result};

/// Options for spawning a shell in a new PTY.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    /// Shell override; the platform default is resolved when unset
    pub shell: Option<String>,
    /// Working directory; the current directory is inherited when unset
    pub cwd: Option<PathBuf>,
    /// Terminal rows
    pub rows: u16,
    /// Terminal columns
    pub cols: u16,
    /// TERM environment variable value
    pub term: String,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            shell: None,
            cwd: None,
            rows: 24,
            cols: 80,
            term: "xterm-256color".to_string(),
        }
    }
}

/// Handle to a spawned PTY process.
pub struct PtyProcess {
    /// The master PTY end
    master: Mutex<Box<dyn MasterPty + Send>>,
    /// The child process
    child: Mutex<Box<dyn Child + Send + Sync>>,
    /// PTY writer
    writer: Mutex<Box<dyn Write + Send>>,
    /// PTY reader - kept as field to maintain the non-blocking FD
    reader: Mutex<Box<dyn Read + Send>>,
    /// OS pid captured at spawn
    pid: Option<u32>,
    /// Shell command that was spawned
    shell: String,
    /// Working directory the shell was spawned in
    cwd: PathBuf,
}

impl std::fmt::Debug for PtyProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyProcess")
            .field("pid", &self.pid)
            .field("shell", &self.shell)
            .field("cwd", &self.cwd)
            .finish_non_exhaustive()
    }
}

impl PtyProcess {
    /// Spawn a shell in a new PTY.
    ///
    /// The shell is resolved from the options (override, `$SHELL`, platform
    /// fallbacks), started with login args on unix, and handed a sanitized
    /// environment: only variables with valid UTF-8 names and values are
    /// forwarded, plus `TERM`/`COLORTERM`.
    pub fn spawn(options: &SpawnOptions) -> Result<Self> {
        if options.rows == 0 || options.cols == 0 {
            return Err(Error::InvalidDimensions {
                rows: options.rows,
                cols: options.cols,
            });
        }

        let (shell, args) = resolve_shell(options.shell.as_deref());
        info!(
            "Spawning PTY shell: shell='{}' args={:?}, dimensions={}x{}, cwd={:?}",
            shell, args, options.rows, options.cols, options.cwd
        );

        let pty_system = native_pty_system();

        let pty_size = PtySize {
            rows: options.rows,
            cols: options.cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = pty_system.openpty(pty_size).map_err(|e| {
            error!("Failed to open PTY: {}", e);
            Error::PtyError(format!("Failed to open PTY: {e}"))
        })?;

        let mut cmd = CommandBuilder::new(&shell);
        for arg in &args {
            cmd.arg(arg);
        }

        // Forward only well-formed variables, never the raw inherited block
        cmd.env_clear();
        for (key, value) in sanitized_env() {
            cmd.env(key, value);
        }
        cmd.env("TERM", &options.term);
        cmd.env("COLORTERM", "truecolor");

        if let Some(dir) = &options.cwd {
            debug!("Setting working directory to: {}", dir.display());
            cmd.cwd(dir);
        }

        debug!("Spawning child process: {}", shell);
        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            error!("Failed to spawn shell '{}': {}", shell, e);
            Error::PtyError(format!("Failed to spawn shell: {e}"))
        })?;

        let pid = child.process_id();

        // Take the writer once and store it
        let writer = pair.master.take_writer().map_err(|e| {
            error!("Failed to take PTY writer: {}", e);
            Error::PtyError(format!("Failed to take writer: {e}"))
        })?;

        // Take the reader once and store it
        let reader = pair.master.try_clone_reader().map_err(|e| {
            error!("Failed to clone PTY reader: {}", e);
            Error::PtyError(format!("Failed to clone reader: {e}"))
        })?;

        // Set reader to non-blocking mode so read() never stalls the caller
        #[cfg(unix)]
        {
            if let Some(master_fd) = pair.master.as_raw_fd() {
                unsafe {
                    let flags = libc::fcntl(master_fd, libc::F_GETFL, 0);
                    if flags != -1 {
                        let result =
                            libc::fcntl(master_fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                        if result == -1 {
                            error!("Failed to set master PTY to non-blocking mode");
                        } else {
                            debug!("Set master PTY FD {} to non-blocking mode", master_fd);
                        }
                    }
                }
            }
        }

        let cwd = options
            .cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        info!("PTY shell spawned: shell='{}', pid={:?}", shell, pid);

        Ok(Self {
            master: Mutex::new(pair.master),
            child: Mutex::new(child),
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            pid,
            shell,
            cwd,
        })
    }

    /// Read available output from the PTY (non-blocking).
    ///
    /// Returns bytes read from the PTY. May return an empty vec if no data
    /// is available.
    pub fn read(&self) -> Result<Vec<u8>> {
        let mut reader = self
            .reader
            .lock()
            .map_err(|e| Error::PtyError(format!("Reader lock error: {e}")))?;

        let mut buffer = vec![0u8; 4096];

        match reader.read(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                Ok(buffer)
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // No data available - expected in non-blocking mode
                Ok(Vec::new())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Write data to the PTY.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        debug!("Writing {} bytes to PTY", data.len());

        let mut writer = self
            .writer
            .lock()
            .map_err(|e| Error::PtyError(format!("Lock error: {e}")))?;

        writer.write_all(data).map_err(Error::Io)?;
        writer.flush().map_err(Error::Io)?;

        Ok(data.len())
    }

    /// Resize the PTY to new dimensions.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidDimensions { rows, cols });
        }
        info!("Resizing PTY to {}x{}", rows, cols);

        let master = self
            .master
            .lock()
            .map_err(|e| Error::PtyError(format!("Lock error: {e}")))?;

        let new_size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        master
            .resize(new_size)
            .map_err(|e| Error::PtyError(format!("Resize failed: {e}")))
    }

    /// Check if the child process is still running.
    pub fn is_alive(&self) -> bool {
        let mut child = match self.child.lock() {
            Ok(c) => c,
            Err(_) => return false,
        };

        child.try_wait().ok().flatten().is_none()
    }

    /// Get the shell command this process was spawned with.
    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Get the working directory this process was spawned in.
    pub fn cwd(&self) -> &std::path::Path {
        &self.cwd
    }

    #[cfg(unix)]
    fn signal(&self, sig: libc::c_int) -> Result<()> {
        let pid = self
            .pid
            .ok_or_else(|| Error::PtyError("process has no pid".to_string()))?;

        if !self.is_alive() {
            // Already gone; nothing to signal
            return Ok(());
        }

        let rc = unsafe { libc::kill(pid as libc::pid_t, sig) };
        if rc == -1 {
            return Err(Error::PtyError(format!(
                "signal {sig} to pid {pid} failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }
}

impl ProcessControl for PtyProcess {
    /// Suspend the child with SIGSTOP so it stops producing output.
    ///
    /// No-op on non-unix platforms.
    fn pause(&self) -> Result<()> {
        #[cfg(unix)]
        {
            debug!("Pausing PTY process pid={:?}", self.pid);
            self.signal(libc::SIGSTOP)
        }

        #[cfg(not(unix))]
        {
            debug!("pause() is a no-op on this platform");
            Ok(())
        }
    }

    /// Resume a SIGSTOP-ed child with SIGCONT.
    ///
    /// No-op on non-unix platforms.
    fn resume(&self) -> Result<()> {
        #[cfg(unix)]
        {
            debug!("Resuming PTY process pid={:?}", self.pid);
            self.signal(libc::SIGCONT)
        }

        #[cfg(not(unix))]
        {
            debug!("resume() is a no-op on this platform");
            Ok(())
        }
    }

    /// Kill the child process.
    fn kill(&self) -> Result<()> {
        info!("Killing PTY process pid={:?}", self.pid);

        let mut child = self
            .child
            .lock()
            .map_err(|e| Error::PtyError(format!("Lock error: {e}")))?;

        child
            .kill()
            .map_err(|e| Error::PtyError(format!("Kill failed: {e}")))?;

        // Reap promptly if it already died
        let _ = child.try_wait();
        Ok(())
    }

    /// The OS pid while the process is alive; `None` once it has exited.
    fn process_id(&self) -> Option<u32> {
        if self.is_alive() {
            self.pid
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_options() -> SpawnOptions {
        SpawnOptions {
            shell: Some(if cfg!(windows) { "cmd.exe" } else { "/bin/sh" }.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_pty_spawn() {
        let pty = PtyProcess::spawn(&test_options());
        assert!(pty.is_ok());

        let pty = pty.unwrap();
        assert!(pty.is_alive());
        assert!(pty.process_id().is_some());

        pty.kill().unwrap();
    }

    #[test]
    fn test_pty_spawn_invalid_dimensions() {
        let options = SpawnOptions {
            rows: 0,
            ..test_options()
        };
        let result = PtyProcess::spawn(&options);
        assert!(matches!(result, Err(Error::InvalidDimensions { .. })));
    }

    #[test]
    fn test_pty_write_and_read() {
        let pty = PtyProcess::spawn(&test_options()).unwrap();

        let command: &[u8] = if cfg!(windows) {
            b"echo hello\r\n"
        } else {
            b"echo hello\n"
        };

        pty.write(command).unwrap();

        // Give the shell time to process
        std::thread::sleep(Duration::from_millis(300));

        let mut output = Vec::new();
        for _ in 0..10 {
            output.extend(pty.read().unwrap());
            if !output.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        assert!(!output.is_empty());

        pty.kill().unwrap();
    }

    #[test]
    fn test_pty_read_idle_is_empty() {
        let pty = PtyProcess::spawn(&test_options()).unwrap();

        // Let the prompt drain, then an idle PTY reads as empty
        std::thread::sleep(Duration::from_millis(300));
        for _ in 0..20 {
            if pty.read().unwrap().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(pty.read().unwrap().is_empty());

        pty.kill().unwrap();
    }

    #[test]
    fn test_pty_resize() {
        let pty = PtyProcess::spawn(&test_options()).unwrap();

        assert!(pty.resize(40, 120).is_ok());
        assert!(matches!(
            pty.resize(0, 120),
            Err(Error::InvalidDimensions { .. })
        ));

        pty.kill().unwrap();
    }

    #[test]
    fn test_pty_kill() {
        let pty = PtyProcess::spawn(&test_options()).unwrap();
        assert!(pty.is_alive());

        pty.kill().unwrap();

        // Give it time to die
        std::thread::sleep(Duration::from_millis(200));

        assert!(!pty.is_alive());
        assert_eq!(pty.process_id(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_pty_pause_resume() {
        let pty = PtyProcess::spawn(&test_options()).unwrap();

        assert!(pty.pause().is_ok());
        // A stopped process is still alive from try_wait's point of view
        assert!(pty.is_alive());
        assert!(pty.resume().is_ok());

        pty.kill().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_pty_pause_after_exit_is_ok() {
        let pty = PtyProcess::spawn(&test_options()).unwrap();
        pty.kill().unwrap();
        std::thread::sleep(Duration::from_millis(200));

        // Signalling a dead process is swallowed, not surfaced
        assert!(pty.pause().is_ok());
        assert!(pty.resume().is_ok());
    }

    #[test]
    fn test_pty_spawn_with_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let options = SpawnOptions {
            cwd: Some(dir.path().to_path_buf()),
            ..test_options()
        };

        let pty = PtyProcess::spawn(&options).unwrap();
        assert_eq!(pty.cwd(), dir.path());

        pty.kill().unwrap();
    }
}
