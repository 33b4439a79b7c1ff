//! Configuration loading and validation

use anyhow::{ensure, Context, Result};
use buildlight_core::{BuildBindings, DeviceBinding, ExhaustionPolicy, Palette};
use buildlight_sync::SyncSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main configuration structure
///
/// `devices` is a top-level array and has to come before the first
/// `[section]` header in the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Ordered `{ identity = build }` records; the first match wins
    #[serde(default)]
    pub devices: Vec<DeviceBinding>,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub palette: Palette,
    /// Status API; not served when absent
    #[serde(default)]
    pub web: Option<WebConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the build API (`{address}/builds/{id}`, `{address}/live/{id}`)
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Fail a live stream that stays silent this long (0 disables)
    #[serde(default)]
    pub stream_idle_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            request_timeout_secs: default_request_timeout(),
            stream_idle_timeout_secs: 0,
        }
    }
}

fn default_address() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Hardware change poll period in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// How long the updating color is held, in milliseconds
    #[serde(default = "default_dwell")]
    pub dwell_ms: u64,
    #[serde(default)]
    pub on_exhausted: ExhaustionPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            dwell_ms: default_dwell(),
            on_exhausted: ExhaustionPolicy::default(),
        }
    }
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_dwell() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    pub user: String,
    pub password: String,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Config {
    pub fn bindings(&self) -> BuildBindings {
        BuildBindings::new(self.devices.clone())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn to_settings(&self) -> SyncSettings {
        let idle = self.api.stream_idle_timeout_secs;
        SyncSettings {
            poll_interval: Duration::from_millis(self.sync.poll_interval_ms),
            dwell: Duration::from_millis(self.sync.dwell_ms),
            stream_idle_timeout: (idle > 0).then(|| Duration::from_secs(idle)),
            on_exhausted: self.sync.on_exhausted,
            palette: self.palette,
        }
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.api.address.is_empty(), "api.address must not be empty");
        ensure!(self.sync.poll_interval_ms > 0, "sync.poll_interval_ms must be greater than 0");
        ensure!(self.api.request_timeout_secs > 0, "api.request_timeout_secs must be greater than 0");
        Ok(())
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        info!(path = %path.display(), devices = config.devices.len(), "Loaded configuration");
        config
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Config::default()
    };

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildlight_core::{BuildId, HardwareIdentity, Rgb};
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_full_config() {
        let file = write_config(
            r##"
devices = [
  { "BS000123-3.0" = "frontend-main" },
  { "BS000456-3.0" = "backend-main" },
]

[api]
address = "http://ci.example.com/api"
stream_idle_timeout_secs = 120

[sync]
dwell_ms = 500
on_exhausted = "idle"

[palette]
passed = "#00aa00"

[web]
user = "builder"
password = "secret"
"##,
        );

        let config = load_config(file.path()).unwrap();
        let bindings = config.bindings();
        assert_eq!(
            bindings.resolve(&HardwareIdentity::new("BS000456-3.0")),
            Some(&BuildId::new("backend-main"))
        );
        assert_eq!(bindings.resolve(&HardwareIdentity::new("BS999")), None);

        let settings = config.to_settings();
        assert_eq!(settings.poll_interval, Duration::from_secs(1));
        assert_eq!(settings.dwell, Duration::from_millis(500));
        assert_eq!(settings.stream_idle_timeout, Some(Duration::from_secs(120)));
        assert_eq!(settings.on_exhausted, ExhaustionPolicy::Idle);
        assert_eq!(settings.palette.passed, Rgb::new(0x00, 0xaa, 0x00));
        assert_eq!(settings.palette.failed, Rgb::RED);

        assert_eq!(config.request_timeout(), Duration::from_secs(30));

        let web = config.web.as_ref().unwrap();
        assert_eq!(web.bind, "127.0.0.1:3000");
        assert_eq!(web.user, "builder");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();

        assert!(config.devices.is_empty());
        assert!(config.web.is_none());
        assert_eq!(config.api.address, "http://localhost:8080/api");
        let settings = config.to_settings();
        assert_eq!(settings.stream_idle_timeout, None);
        assert_eq!(settings.on_exhausted, ExhaustionPolicy::Terminate);
    }

    #[test]
    fn test_multi_entry_device_record_is_rejected() {
        let file = write_config(r#"devices = [ { "a" = "one", "b" = "two" } ]"#);
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_bad_color_is_rejected() {
        let file = write_config("[palette]\npassed = \"green\"\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let file = write_config("[sync]\npoll_interval_ms = 0\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));
    }
}
