use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use caya_chat::Persona;
use caya_llm::{DEFAULT_CHAT_PATH, DEFAULT_MODEL, DEFAULT_WIDGET_PATH, ProviderConfig, ReplyMode};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

/// Where the dev server proxies `/api` to.
pub const DEFAULT_API_BASE: &str = "http://localhost:8787";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const SETTINGS_DIRECTORY_NAME: &str = "caya";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "CAYA_";

/// Which assistant copy the front end speaks with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonaKind {
    #[default]
    Panel,
    Widget,
}

impl PersonaKind {
    pub fn persona(self) -> Persona {
        match self {
            Self::Panel => Persona::panel(),
            Self::Widget => Persona::widget(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSettings {
    /// Blank means same origin, which for this front end is the local dev server.
    #[serde(default)]
    pub api_base: String,
    #[serde(default = "default_chat_path")]
    pub chat_path: String,
    #[serde(default = "default_widget_path")]
    pub widget_path: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub mode: ReplyMode,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub persona: PersonaKind,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            chat_path: default_chat_path(),
            widget_path: default_widget_path(),
            model: default_model(),
            mode: ReplyMode::default(),
            request_timeout_secs: default_request_timeout_secs(),
            persona: PersonaKind::default(),
        }
    }
}

impl ChatSettings {
    pub fn normalized(mut self) -> Self {
        self.api_base = self.api_base.trim().trim_end_matches('/').to_string();
        self.chat_path = non_blank_or(self.chat_path, DEFAULT_CHAT_PATH);
        self.widget_path = non_blank_or(self.widget_path, DEFAULT_WIDGET_PATH);
        self.model = non_blank_or(self.model, DEFAULT_MODEL);
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = DEFAULT_REQUEST_TIMEOUT_SECS;
        }
        self
    }

    pub fn effective_api_base(&self) -> &str {
        if self.api_base.trim().is_empty() {
            DEFAULT_API_BASE
        } else {
            self.api_base.trim()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig::new(self.effective_api_base(), &self.model, self.mode)
            .with_chat_path(&self.chat_path)
            .with_widget_path(&self.widget_path)
            .with_request_timeout(self.request_timeout())
    }

    pub fn persona(&self) -> Persona {
        self.persona.persona()
    }
}

/// Settings layering: defaults, then the JSON file, then `CAYA_*` variables.
pub fn settings_figment(path: &Path) -> Figment {
    Figment::from(Serialized::defaults(ChatSettings::default()))
        .merge(Json::file(path))
        .merge(Env::prefixed(ENV_PREFIX))
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<ChatSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".caya"))
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

    pub fn settings(&self) -> Arc<ChatSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: ChatSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    /// Switches the model and persists the change.
    pub fn update_model(&self, model: &str) -> Result<Arc<ChatSettings>, SettingsError> {
        let mut settings = ChatSettings::clone(&self.settings());
        settings.model = model.to_string();
        self.update(settings)?;
        Ok(self.settings())
    }

    fn load_from_disk(path: &Path) -> ChatSettings {
        if !path.exists() {
            tracing::info!(path = ?path, "settings file not found, using defaults");
        }

        match settings_figment(path).extract::<ChatSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(path = ?path, %error, "failed to parse settings, using defaults");
                ChatSettings::default()
            }
        }
    }

    fn persist(&self, settings: &ChatSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!(path = ?self.config_path, "saved settings");
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn non_blank_or(value: String, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

fn default_chat_path() -> String {
    DEFAULT_CHAT_PATH.to_string()
}

fn default_widget_path() -> String {
    DEFAULT_WIDGET_PATH.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}
