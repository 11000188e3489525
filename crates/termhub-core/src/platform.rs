//! Platform detection, default shell resolution, and environment sanitizing.

use serde::{Deserialize, Serialize};

/// Supported platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Native Linux (not WSL)
    Linux,
    /// macOS
    MacOS,
    /// Native Windows
    Windows,
    /// Windows Subsystem for Linux
    WSL,
}

impl Platform {
    /// Detect the current platform at runtime.
    ///
    /// # Platform Detection Logic
    ///
    /// - **WSL**: Checks `/proc/version` for "microsoft" or "Microsoft" string
    /// - **Linux**: target_os = "linux" and not WSL
    /// - **macOS**: target_os = "macos"
    /// - **Windows**: target_os = "windows"
    pub fn detect() -> Self {
        #[cfg(target_os = "linux")]
        {
            // Check if running under WSL
            if Self::is_wsl() {
                return Platform::WSL;
            }
            Platform::Linux
        }

        #[cfg(target_os = "macos")]
        {
            Platform::MacOS
        }

        #[cfg(target_os = "windows")]
        {
            Platform::Windows
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            compile_error!("Unsupported platform - only Linux, macOS, and Windows are supported")
        }
    }

    /// Check if running under Windows Subsystem for Linux (WSL).
    #[cfg(target_os = "linux")]
    fn is_wsl() -> bool {
        if let Ok(version) = std::fs::read_to_string("/proc/version") {
            if version.to_lowercase().contains("microsoft") {
                return true;
            }
        }

        if std::path::Path::new("/proc/sys/fs/binfmt_misc/WSLInterop").exists() {
            return true;
        }

        false
    }

    /// Get the platform name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Linux => "Linux",
            Platform::MacOS => "macOS",
            Platform::Windows => "Windows",
            Platform::WSL => "WSL",
        }
    }

    /// Check if this is a Unix-like platform.
    pub fn is_unix(&self) -> bool {
        matches!(self, Platform::Linux | Platform::MacOS | Platform::WSL)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Shells tried in order when `$SHELL` is not set on unix.
#[cfg(not(windows))]
const SHELL_FALLBACKS: &[&str] = &["/bin/zsh", "/bin/bash", "/bin/sh"];

/// Resolve the shell command and arguments for a new terminal session.
///
/// Resolution order: explicit override, then `$SHELL` (`%COMSPEC%` on
/// Windows), then a platform fallback list. Unix shells are started as login
/// shells so the user's profile is loaded.
pub fn resolve_shell(shell_override: Option<&str>) -> (String, Vec<String>) {
    if let Some(shell) = shell_override {
        return (shell.to_string(), login_args());
    }

    #[cfg(windows)]
    {
        let shell = std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string());
        (shell, Vec::new())
    }

    #[cfg(not(windows))]
    {
        if let Ok(shell) = std::env::var("SHELL") {
            if !shell.is_empty() {
                return (shell, login_args());
            }
        }

        let shell = SHELL_FALLBACKS
            .iter()
            .find(|candidate| std::path::Path::new(candidate).exists())
            .unwrap_or(&"/bin/sh");
        (shell.to_string(), login_args())
    }
}

fn login_args() -> Vec<String> {
    if cfg!(windows) {
        Vec::new()
    } else {
        vec!["-l".to_string()]
    }
}

/// Collect the environment to forward into a spawned shell.
///
/// Only variables whose name and value are valid UTF-8 are forwarded;
/// anything else is silently dropped rather than passed through mangled.
pub fn sanitized_env() -> Vec<(String, String)> {
    std::env::vars_os()
        .filter_map(|(key, value)| {
            let key = key.into_string().ok()?;
            let value = value.into_string().ok()?;
            Some((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_detect() {
        let platform = Platform::detect();

        assert!(matches!(
            platform,
            Platform::Linux | Platform::MacOS | Platform::Windows | Platform::WSL
        ));
    }

    #[test]
    fn test_platform_name() {
        assert_eq!(Platform::Linux.name(), "Linux");
        assert_eq!(Platform::MacOS.name(), "macOS");
        assert_eq!(Platform::Windows.name(), "Windows");
        assert_eq!(Platform::WSL.name(), "WSL");
    }

    #[test]
    fn test_is_unix() {
        assert!(Platform::Linux.is_unix());
        assert!(Platform::MacOS.is_unix());
        assert!(Platform::WSL.is_unix());
        assert!(!Platform::Windows.is_unix());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Platform::Linux), "Linux");
        assert_eq!(format!("{}", Platform::MacOS), "macOS");
    }

    #[test]
    fn test_resolve_shell_override() {
        let (shell, args) = resolve_shell(Some("/bin/dash"));
        assert_eq!(shell, "/bin/dash");
        if cfg!(windows) {
            assert!(args.is_empty());
        } else {
            assert_eq!(args, vec!["-l".to_string()]);
        }
    }

    #[test]
    fn test_resolve_shell_default_is_nonempty() {
        let (shell, _args) = resolve_shell(None);
        assert!(!shell.is_empty());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_resolve_shell_fallback_exists() {
        // Whatever is resolved without an override must point at something
        // present on disk (or be the $SHELL value verbatim).
        let (shell, _args) = resolve_shell(None);
        if std::env::var("SHELL").map(|s| s.is_empty()).unwrap_or(true) {
            assert!(std::path::Path::new(&shell).exists());
        }
    }

    #[test]
    fn test_sanitized_env_round_trips_utf8() {
        std::env::set_var("TERMHUB_TEST_VAR", "value");
        let env = sanitized_env();
        assert!(env
            .iter()
            .any(|(k, v)| k == "TERMHUB_TEST_VAR" && v == "value"));
        std::env::remove_var("TERMHUB_TEST_VAR");
    }
}
