//! Reader preferences and their persistence.
//!
//! Three preferences survive across sessions when `remember` is on:
//! the fold default, the bilingual default, and the topic level. The
//! storage keys are fixed so existing stores keep working.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

/// Persisted preference keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    DefaultFold,
    DefaultShowCn,
    DefaultTopicLevel,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 3] = [
        ConfigKey::DefaultFold,
        ConfigKey::DefaultShowCn,
        ConfigKey::DefaultTopicLevel,
    ];

    /// Storage key. `DefaultTopicLevel` keeps its historical name.
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::DefaultFold => "defaultFold",
            ConfigKey::DefaultShowCn => "defaultShowCN",
            ConfigKey::DefaultTopicLevel => "defaultTopicClass",
        }
    }
}

/// Key-value persistence for reader preferences. Values are stored as
/// strings; callers encode booleans as `"true"`/`"false"` and the topic
/// level as its decimal form.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: ConfigKey) -> Option<String>;
    fn set(&self, key: ConfigKey, value: &str);
}

/// In-memory store, used for tests and for hosts without storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<&'static str, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: ConfigKey) -> Option<String> {
        self.values.lock().get(key.as_str()).cloned()
    }

    fn set(&self, key: ConfigKey, value: &str) {
        self.values.lock().insert(key.as_str(), value.to_string());
    }
}

/// JSON-file-backed store. Read and write failures are logged and treated
/// as an empty store so a corrupt file never breaks a lookup.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn read(&self) -> HashMap<String, String> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "failed to read config file");
                return HashMap::new();
            }
        };
        match serde_json::from_str::<Value>(&data) {
            Ok(Value::Object(map)) => map
                .into_iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
                .collect(),
            Ok(_) | Err(_) => {
                warn!(path = %self.path.display(), "config file is not a JSON object");
                HashMap::new()
            }
        }
    }

    fn write(&self, values: &HashMap<String, String>) {
        let json = serde_json::to_string_pretty(values).unwrap_or_default();
        if let Err(err) = std::fs::write(&self.path, json) {
            warn!(path = %self.path.display(), %err, "failed to write config file");
        }
    }
}

impl ConfigStore for FileStore {
    fn get(&self, key: ConfigKey) -> Option<String> {
        self.read().get(key.as_str()).cloned()
    }

    fn set(&self, key: ConfigKey, value: &str) {
        let mut values = self.read();
        values.insert(key.as_str().to_string(), value.to_string());
        self.write(&values);
    }
}

/// Behavior switches for the enrichment pass.
#[derive(Debug, Clone)]
pub struct Options {
    /// Collapse examples and sense bodies on render.
    pub default_fold: bool,
    /// Show the translated layer alongside the original.
    pub default_show_cn: bool,
    /// Topic vocabulary level shown by default, 0 through 3.
    pub default_topic_level: u8,
    /// Persist preference changes back to the store.
    pub remember: bool,
    /// Render the bilingual toggle button.
    pub show_cn_button: bool,
    /// Allow swapping original and translated layers in place.
    pub en_cn_switch: bool,
    /// Enable streaming machine translation for untranslated text.
    pub translation: bool,
    /// Reveal the original layer automatically when only the translation
    /// is shown.
    pub auto_show_origin: bool,
    /// Keep only the translated layer. Forces `default_show_cn`.
    pub only_cn: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            default_fold: false,
            default_show_cn: true,
            default_topic_level: 1,
            remember: true,
            show_cn_button: false,
            en_cn_switch: false,
            translation: true,
            auto_show_origin: false,
            only_cn: false,
        }
    }
}

impl Options {
    /// Applies persisted preferences over the defaults and enforces the
    /// `only_cn` constraint.
    pub fn load(mut self, store: &dyn ConfigStore) -> Self {
        if self.remember {
            if let Some(value) = store.get(ConfigKey::DefaultFold) {
                self.default_fold = value == "true";
            }
            if let Some(value) = store.get(ConfigKey::DefaultShowCn) {
                self.default_show_cn = value == "true";
            }
            if let Some(value) = store.get(ConfigKey::DefaultTopicLevel) {
                if let Ok(level) = value.parse::<u8>() {
                    self.default_topic_level = level.min(3);
                }
            }
        }
        if self.only_cn {
            self.default_show_cn = true;
        }
        self
    }

    /// Writes one preference back, respecting `remember`.
    pub fn persist(&self, store: &dyn ConfigStore, key: ConfigKey) {
        if !self.remember {
            return;
        }
        let value = match key {
            ConfigKey::DefaultFold => self.default_fold.to_string(),
            ConfigKey::DefaultShowCn => self.default_show_cn.to_string(),
            ConfigKey::DefaultTopicLevel => self.default_topic_level.to_string(),
        };
        store.set(key, &value);
    }
}
