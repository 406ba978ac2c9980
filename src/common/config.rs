//! Configuration file handling

use serde::Deserialize;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Location-search settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Execution-limit settings
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Session registry settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Timeout settings in seconds (milliseconds where noted)
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Timeout for a single protocol command round trip
    #[serde(default = "default_request")]
    pub request_secs: u64,

    /// Timeout for the connection handshake (enable domains, detect runtime kind)
    #[serde(default = "default_connect")]
    pub connect_secs: u64,

    /// Bounded wait for a code path to be hit during logpoint expression
    /// validation; expiry means "unknown", not failure
    #[serde(default = "default_validation_wait")]
    pub validation_wait_secs: u64,

    /// Per-candidate wait during a location search
    #[serde(default = "default_probe_wait")]
    pub probe_wait_millis: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request_secs: default_request(),
            connect_secs: default_connect(),
            validation_wait_secs: default_validation_wait(),
            probe_wait_millis: default_probe_wait(),
        }
    }
}

fn default_request() -> u64 {
    10
}
fn default_connect() -> u64 {
    10
}
fn default_validation_wait() -> u64 {
    3
}
fn default_probe_wait() -> u64 {
    1500
}

/// Location-search settings
#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// How many lines above and below the requested line to probe
    #[serde(default = "default_radius")]
    pub radius_lines: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            radius_lines: default_radius(),
        }
    }
}

fn default_radius() -> u32 {
    2
}

/// Execution-limit settings
#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Number of captured log lines retained per logpoint (oldest discarded first)
    #[serde(default = "default_ring_capacity")]
    pub log_ring_capacity: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            log_ring_capacity: default_ring_capacity(),
        }
    }
}

fn default_ring_capacity() -> usize {
    20
}

/// Session registry settings
#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    /// Sessions with no tool access for this long are closed by the reaper
    #[serde(default = "default_inactive_timeout")]
    pub inactive_timeout_minutes: u64,

    /// How often the reaper runs
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            inactive_timeout_minutes: default_inactive_timeout(),
            reap_interval_secs: default_reap_interval(),
        }
    }
}

fn default_inactive_timeout() -> u64 {
    30
}
fn default_reap_interval() -> u64 {
    120
}

/// Daemon configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DaemonConfig {
    /// Auto-exit after this many minutes with no open sessions
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_minutes: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: default_idle_timeout(),
        }
    }
}

fn default_idle_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| super::Error::Config(format!("{}: {}", path.display(), e)))?;
                return toml::from_str(&content)
                    .map_err(|e| super::Error::ConfigParse(e.to_string()));
            }
        }
        Ok(Self::default())
    }

    /// Protocol command round-trip timeout
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeouts.request_secs)
    }

    /// Bounded wait for expression validation
    pub fn validation_wait(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeouts.validation_wait_secs)
    }

    /// Per-candidate wait during location search
    pub fn probe_wait(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeouts.probe_wait_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_sections() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.timeouts.request_secs, 10);
        assert_eq!(config.search.radius_lines, 2);
        assert_eq!(config.limits.log_ring_capacity, 20);
        assert_eq!(config.registry.inactive_timeout_minutes, 30);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
[timeouts]
validation_wait_secs = 7

[search]
radius_lines = 4
"#,
        )
        .unwrap();
        assert_eq!(config.timeouts.validation_wait_secs, 7);
        assert_eq!(config.timeouts.request_secs, 10);
        assert_eq!(config.search.radius_lines, 4);
    }
}
