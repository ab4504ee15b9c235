use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use docqa_gateway::{DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT, GatewayConfig};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::chat::{ChatOptions, DEFAULT_THINKING_PERIOD, DEFAULT_TICK_PERIOD};

pub const SETTINGS_DIRECTORY_NAME: &str = "docqa";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const SETTINGS_ENV_PREFIX: &str = "DOCQA_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl GatewaySettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn normalized(mut self) -> Self {
        self.base_url = if self.base_url.trim().is_empty() {
            default_base_url()
        } else {
            self.base_url.trim().to_string()
        };
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingSettings {
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,
    #[serde(default = "default_thinking_period_ms")]
    pub thinking_period_ms: u64,
}

impl Default for TypingSettings {
    fn default() -> Self {
        Self {
            tick_period_ms: default_tick_period_ms(),
            thinking_period_ms: default_thinking_period_ms(),
        }
    }
}

impl TypingSettings {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn thinking_period(&self) -> Duration {
        Duration::from_millis(self.thinking_period_ms)
    }

    fn normalized(mut self) -> Self {
        // A zero period would make `tokio::time::interval` panic.
        if self.tick_period_ms == 0 {
            self.tick_period_ms = default_tick_period_ms();
        }
        if self.thinking_period_ms == 0 {
            self.thinking_period_ms = default_thinking_period_ms();
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub typing: TypingSettings,
}

impl ClientSettings {
    pub fn normalized(self) -> Self {
        Self {
            gateway: self.gateway.normalized(),
            typing: self.typing.normalized(),
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig::new(&self.gateway.base_url)
            .with_request_timeout(self.gateway.request_timeout())
    }

    pub fn chat_options(&self) -> ChatOptions {
        ChatOptions {
            tick_period: self.typing.tick_period(),
            thinking_period: self.typing.thinking_period(),
        }
    }
}

/// Process-wide settings, readable without locking while an update is persisted.
pub struct SettingsStore {
    settings: Arc<ArcSwap<ClientSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".docqa"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<ClientSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: ClientSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    /// Defaults, then the JSON file when present, then `DOCQA_*` variables.
    fn load_from_disk(path: &Path) -> ClientSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }

        let figment = Figment::from(Serialized::defaults(ClientSettings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(SETTINGS_ENV_PREFIX).split("__"));

        match figment.extract::<ClientSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                ClientSettings::default()
            }
        }
    }

    /// Writes `settings` next to the live file, then renames it over the live file.
    fn persist(&self, settings: &ClientSettings) -> Result<(), SettingsError> {
        let path = self.config_path.as_path();
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).context(ConfigDirSnafu {
                stage: "ensure-config-dir",
                dir: dir.to_path_buf(),
            })?;
        }

        let mut encoded = serde_json::to_vec_pretty(settings).context(EncodeSettingsSnafu {
            stage: "encode-client-settings",
        })?;
        encoded.push(b'\n');

        let staged = path.with_extension("json.tmp");
        std::fs::write(&staged, &encoded).context(StageWriteSnafu {
            stage: "write-staged-settings",
            staged: staged.clone(),
        })?;
        std::fs::rename(&staged, path).context(SwapInSnafu {
            stage: "swap-in-staged-settings",
            staged,
            live: path.to_path_buf(),
        })?;

        tracing::info!(path = ?path, bytes = encoded.len(), "client settings saved");
        Ok(())
    }
}

/// Failures while saving client settings; loading never fails and falls back to defaults.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("cannot create config directory {dir:?} on `{stage}`: {source}"))]
    ConfigDir {
        stage: &'static str,
        dir: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot encode client settings on `{stage}`: {source}"))]
    EncodeSettings {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("cannot write staged settings {staged:?} on `{stage}`: {source}"))]
    StageWrite {
        stage: &'static str,
        staged: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot move {staged:?} over {live:?} on `{stage}`: {source}"))]
    SwapIn {
        stage: &'static str,
        staged: PathBuf,
        live: PathBuf,
        source: std::io::Error,
    },
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_tick_period_ms() -> u64 {
    DEFAULT_TICK_PERIOD.as_millis() as u64
}

fn default_thinking_period_ms() -> u64 {
    DEFAULT_THINKING_PERIOD.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|jail| {
            let store = SettingsStore::new(jail.directory().join("absent.json"));
            let settings = store.settings();

            assert_eq!(*settings, ClientSettings::default());
            assert_eq!(settings.gateway.base_url, "http://127.0.0.1:8000");
            assert_eq!(settings.chat_options(), ChatOptions::default());
            Ok(())
        });
    }

    #[test]
    fn file_values_are_layered_under_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "settings.json",
                r#"{ "gateway": { "base_url": " http://docs.internal:9000/api " }, "typing": { "tick_period_ms": 40 } }"#,
            )?;
            jail.set_env("DOCQA_TYPING__THINKING_PERIOD_MS", "250");

            let store = SettingsStore::new(jail.directory().join("settings.json"));
            let settings = store.settings();

            assert_eq!(settings.gateway.base_url, "http://docs.internal:9000/api");
            assert_eq!(settings.gateway.request_timeout_secs, 60);
            assert_eq!(settings.typing.tick_period(), Duration::from_millis(40));
            assert_eq!(settings.typing.thinking_period(), Duration::from_millis(250));
            assert_eq!(
                settings.gateway_config().base_url,
                "http://docs.internal:9000/api"
            );
            Ok(())
        });
    }

    #[test]
    fn unparseable_file_falls_back_to_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("settings.json", r#"{ "typing": { "tick_period_ms": "fast" } }"#)?;

            let store = SettingsStore::new(jail.directory().join("settings.json"));

            assert_eq!(*store.settings(), ClientSettings::default());
            Ok(())
        });
    }

    #[test]
    fn update_reports_unwritable_config_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").expect("blocker");
        let store = SettingsStore::new(blocker.join(SETTINGS_FILE_NAME));
        let before = store.settings();
        let mut changed = (*before).clone();
        changed.typing.tick_period_ms += 10;

        let error = store.update(changed).expect_err("parent is a file");

        assert!(matches!(error, SettingsError::ConfigDir { .. }));
        assert_eq!(store.settings(), before);
    }

    #[test]
    fn update_normalizes_persists_and_swaps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);
        let store = SettingsStore::new(path.clone());

        store
            .update(ClientSettings {
                gateway: GatewaySettings {
                    base_url: "  ".to_string(),
                    request_timeout_secs: 5,
                },
                typing: TypingSettings {
                    tick_period_ms: 0,
                    thinking_period_ms: 800,
                },
            })
            .expect("persist");

        let current = store.settings();
        assert_eq!(current.gateway.base_url, DEFAULT_BASE_URL);
        assert_eq!(current.gateway.request_timeout_secs, 5);
        assert_eq!(current.typing.tick_period_ms, 15);
        assert!(!path.with_extension("json.tmp").exists());

        let reloaded: ClientSettings =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("written"))
                .expect("valid json");
        assert_eq!(reloaded, *current);
    }
}
