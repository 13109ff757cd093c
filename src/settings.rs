//! Run settings
//!
//! Settings are read from `~/.config/kestrel/settings.toml`

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Settings for one run of the tick loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Number of ticks to run before exiting
    pub ticks: u64,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Log a world summary every N ticks (0 disables it)
    pub report_every: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            ticks: 3,
            log_level: "info".to_string(),
            report_every: 1,
        }
    }
}

impl RunSettings {
    /// Get the settings file path
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("kestrel").join("settings.toml"))
    }

    /// Load settings from the config directory, or return defaults if not found
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            warn!("Could not determine config directory");
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// Load settings from `path`, falling back to defaults on any problem
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!("No settings file found, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(settings) => {
                    info!("Loaded settings from {:?}", path);
                    settings
                }
                Err(e) => {
                    warn!("Failed to parse settings: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read settings file: {}, using defaults", e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let settings: RunSettings = toml::from_str("ticks = 10").unwrap();
        assert_eq!(settings.ticks, 10);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.report_every, 1);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("kestrel-no-such-settings.toml");
        assert_eq!(RunSettings::load_from(&path), RunSettings::default());
    }

    #[test]
    fn malformed_file_uses_defaults() {
        let path = std::env::temp_dir().join(format!("kestrel-bad-settings-{}.toml", std::process::id()));
        fs::write(&path, "ticks = \"many\"").unwrap();
        assert_eq!(RunSettings::load_from(&path), RunSettings::default());
        fs::remove_file(&path).unwrap();
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn fallback_is_logged_under_scoped_subscriber() {
        let path = std::env::temp_dir().join(format!("kestrel-logged-settings-{}.toml", std::process::id()));
        fs::write(&path, "report_every = -1").unwrap();

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let settings = tracing::subscriber::with_default(subscriber, || RunSettings::load_from(&path));
        fs::remove_file(&path).unwrap();

        assert_eq!(settings, RunSettings::default());
        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Failed to parse settings"), "got: {output}");
    }

    #[test]
    fn roundtrip_through_toml() {
        let settings = RunSettings {
            ticks: 7,
            log_level: "debug".into(),
            report_every: 0,
        };
        let text = toml::to_string_pretty(&settings).unwrap();
        assert_eq!(toml::from_str::<RunSettings>(&text).unwrap(), settings);
    }
}
