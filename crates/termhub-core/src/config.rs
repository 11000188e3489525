//! Configuration types for termhub.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application configuration loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Process pool settings
    pub pool: PoolSettings,
    /// Output flow control settings
    pub flow: FlowSettings,
    /// Terminal settings
    pub terminal: TerminalSettings,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let config: AppConfig = serde_yaml::from_str(yaml)
            .map_err(|e| crate::Error::Config(format!("invalid YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> crate::Result<()> {
        self.flow.validate()?;

        if self.terminal.default_rows == 0 || self.terminal.default_cols == 0 {
            return Err(crate::Error::Config(
                "terminal dimensions must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Process pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Target number of warm, idle shell processes (0 disables pooling)
    pub size: usize,
    /// Working directory for pooled shells (defaults to the process cwd)
    pub default_cwd: Option<String>,
    /// Shell override; when unset the platform default is resolved
    pub shell: Option<String>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            size: 3,
            default_cwd: None,
            shell: None,
        }
    }
}

/// Output flow control settings.
///
/// All values are externally supplied tunables. The defaults follow the
/// shipped configuration; none of them is a contract of the flow controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSettings {
    /// Soft watermark for the batch queue, in bytes
    pub soft_limit_bytes: usize,
    /// Hard watermark for the batch queue, in bytes; oldest chunks are
    /// evicted once the queue would exceed this
    pub hard_limit_bytes: usize,
    /// Buffering-mode queue flushes once it holds this many chunks
    pub max_pending_chunks: usize,
    /// Buffering-mode queue flushes once it holds this many bytes
    pub max_pending_bytes: usize,
    /// Byte rate per flood-check interval above which the producer is paused
    pub flood_threshold_bytes: usize,
    /// Byte rate per flood-check interval below which a paused producer may
    /// be resumed (must be lower than the flood threshold)
    pub resume_threshold_bytes: usize,
    /// Minimum time between a pause/resume attempt and the next resume, in ms
    pub flood_cooldown_ms: u64,
    /// Cadence of the externally driven flood check, in ms
    pub flood_check_interval_ms: u64,
    /// Minimum dwell before the queue state reverts to normal, in ms
    pub queue_state_dwell_ms: u64,
    /// Activity tier changes within this window of the previous one are
    /// ignored, in ms
    pub tier_debounce_ms: u64,
    /// Batch flush delay while focused, in ms
    pub focused_flush_ms: u64,
    /// Batch flush delay while visible, in ms
    pub visible_flush_ms: u64,
    /// Batch flush delay while in the background, in ms
    pub background_flush_ms: u64,
    /// Batch flush delay while the queue is in the soft state, in ms
    pub soft_state_flush_ms: u64,
    /// Batch size above which the flush is held for one UI frame so the
    /// burst coalesces into a single emission
    pub bulk_threshold_bytes: usize,
    /// The "one UI frame" delay applied to bulk batches, in ms
    pub bulk_flush_ms: u64,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            soft_limit_bytes: 512 * 1024,
            hard_limit_bytes: 4 * 1024 * 1024,
            max_pending_chunks: 1000,
            max_pending_bytes: 1024 * 1024,
            flood_threshold_bytes: 5_000_000,
            resume_threshold_bytes: 1_000_000,
            flood_cooldown_ms: 2000,
            flood_check_interval_ms: 1000,
            queue_state_dwell_ms: 1000,
            tier_debounce_ms: 100,
            focused_flush_ms: 5,
            visible_flush_ms: 100,
            background_flush_ms: 1000,
            soft_state_flush_ms: 16,
            bulk_threshold_bytes: 128 * 1024,
            bulk_flush_ms: 16,
        }
    }
}

impl FlowSettings {
    /// Validate flow control values.
    pub fn validate(&self) -> crate::Result<()> {
        if self.soft_limit_bytes == 0 {
            return Err(crate::Error::Config(
                "flow.soft_limit_bytes must be > 0".to_string(),
            ));
        }
        if self.hard_limit_bytes <= self.soft_limit_bytes {
            return Err(crate::Error::Config(
                "flow.hard_limit_bytes must exceed soft_limit_bytes".to_string(),
            ));
        }
        if self.max_pending_chunks == 0 || self.max_pending_bytes == 0 {
            return Err(crate::Error::Config(
                "flow.max_pending_chunks and max_pending_bytes must be > 0".to_string(),
            ));
        }
        if self.resume_threshold_bytes == 0 {
            return Err(crate::Error::Config(
                "flow.resume_threshold_bytes must be > 0".to_string(),
            ));
        }
        if self.flood_threshold_bytes <= self.resume_threshold_bytes {
            return Err(crate::Error::Config(
                "flow.flood_threshold_bytes must exceed resume_threshold_bytes".to_string(),
            ));
        }
        if self.flood_check_interval_ms == 0 {
            return Err(crate::Error::Config(
                "flow.flood_check_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Flood resume cooldown as a [`Duration`].
    pub fn flood_cooldown(&self) -> Duration {
        Duration::from_millis(self.flood_cooldown_ms)
    }

    /// Flood check cadence as a [`Duration`].
    pub fn flood_check_interval(&self) -> Duration {
        Duration::from_millis(self.flood_check_interval_ms)
    }

    /// Queue state dwell as a [`Duration`].
    pub fn queue_state_dwell(&self) -> Duration {
        Duration::from_millis(self.queue_state_dwell_ms)
    }

    /// Tier debounce window as a [`Duration`].
    pub fn tier_debounce(&self) -> Duration {
        Duration::from_millis(self.tier_debounce_ms)
    }

    /// Flush delay while focused.
    pub fn focused_flush(&self) -> Duration {
        Duration::from_millis(self.focused_flush_ms)
    }

    /// Flush delay while visible.
    pub fn visible_flush(&self) -> Duration {
        Duration::from_millis(self.visible_flush_ms)
    }

    /// Flush delay while in the background.
    pub fn background_flush(&self) -> Duration {
        Duration::from_millis(self.background_flush_ms)
    }

    /// Flush delay while the queue is in the soft state.
    pub fn soft_state_flush(&self) -> Duration {
        Duration::from_millis(self.soft_state_flush_ms)
    }

    /// The one-frame delay applied to bulk batches.
    pub fn bulk_flush(&self) -> Duration {
        Duration::from_millis(self.bulk_flush_ms)
    }
}

/// Terminal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    /// Default terminal rows
    pub default_rows: u16,
    /// Default terminal columns
    pub default_cols: u16,
    /// TERM environment variable value
    pub term: String,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            default_rows: 24,
            default_cols: 80,
            term: "xterm-256color".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.pool.size, 3);
        assert_eq!(config.terminal.default_rows, 24);
        assert_eq!(config.terminal.default_cols, 80);
        assert!(config.flow.hard_limit_bytes > config.flow.soft_limit_bytes);
        assert!(config.flow.flood_threshold_bytes > config.flow.resume_threshold_bytes);
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_watermarks() {
        let mut config = AppConfig::default();
        config.flow.hard_limit_bytes = config.flow.soft_limit_bytes;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_flood_thresholds() {
        let mut config = AppConfig::default();
        config.flow.resume_threshold_bytes = config.flow.flood_threshold_bytes;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_dimensions() {
        let mut config = AppConfig::default();
        config.terminal.default_rows = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_pending_maxima() {
        let mut config = AppConfig::default();
        config.flow.max_pending_chunks = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
pool:
  size: 5
  shell: /bin/zsh

flow:
  soft_limit_bytes: 262144
  hard_limit_bytes: 2097152
  flood_threshold_bytes: 4000000
  resume_threshold_bytes: 800000
  flood_cooldown_ms: 1500

terminal:
  default_rows: 30
  default_cols: 120
  term: "xterm-256color"
"#;

        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.pool.size, 5);
        assert_eq!(config.pool.shell.as_deref(), Some("/bin/zsh"));
        assert_eq!(config.flow.soft_limit_bytes, 262_144);
        assert_eq!(config.flow.hard_limit_bytes, 2_097_152);
        assert_eq!(config.flow.flood_cooldown_ms, 1500);
        assert_eq!(config.terminal.default_rows, 30);
        assert_eq!(config.terminal.default_cols, 120);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "pool:\n  size: 1\n";
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.pool.size, 1);
        assert_eq!(config.flow.soft_limit_bytes, 512 * 1024);
        assert_eq!(config.terminal.term, "xterm-256color");
    }

    #[test]
    fn test_invalid_yaml_rejected() {
        let yaml = "flow:\n  hard_limit_bytes: 1\n";
        assert!(AppConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pool:\n  size: 2").unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.pool.size, 2);
    }

    #[test]
    fn test_duration_accessors() {
        let flow = FlowSettings::default();
        assert_eq!(flow.flood_cooldown(), Duration::from_millis(2000));
        assert_eq!(flow.tier_debounce(), Duration::from_millis(100));
        assert_eq!(flow.background_flush(), Duration::from_secs(1));
    }
}
