//! Provider & Model Registry (C7): persisted configuration for every
//! provider the runtime knows about, plus API-format auto-detection from
//! a raw key.
//!
//! Two files live under `$HOME/.iabuilder/`: `config.json` (legacy,
//! single-provider settings) and `providers.json` (the multi-provider
//! registry). Both get `0700` directory / `0600` file permissions on
//! unix, mirroring the Python config manager this is built around.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_DIR_NAME: &str = ".iabuilder";
const LEGACY_CONFIG_FILE: &str = "config.json";
const PROVIDERS_FILE: &str = "providers.json";

fn config_dir() -> PathBuf {
    dirs_home().join(CONFIG_DIR_NAME)
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(unix)]
fn secure_dir_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = fs::metadata(path) {
        let mut perms = metadata.permissions();
        perms.set_mode(0o700);
        let _ = fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn secure_dir_permissions(_path: &Path) {}

#[cfg(unix)]
fn secure_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = fs::metadata(path) {
        let mut perms = metadata.permissions();
        perms.set_mode(0o600);
        let _ = fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn secure_file_permissions(_path: &Path) {}

fn ensure_config_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    secure_dir_permissions(dir);
    Ok(())
}

/// API format a key or base URL was detected as belonging to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiFormat {
    OpenAi,
    Anthropic,
    Google,
    Cohere,
    Groq,
    Azure,
    Unknown,
}

/// Detect a provider's API format from its key prefix or base URL,
/// matching the prefixes each vendor actually issues.
pub fn detect_api_format(api_key: Option<&str>, base_url: Option<&str>) -> ApiFormat {
    if let Some(url) = base_url {
        let lower = url.to_lowercase();
        if lower.contains("anthropic.com") {
            return ApiFormat::Anthropic;
        }
        if lower.contains("generativelanguage.googleapis.com") {
            return ApiFormat::Google;
        }
        if lower.contains("api.cohere") {
            return ApiFormat::Cohere;
        }
        if lower.contains("groq.com") {
            return ApiFormat::Groq;
        }
        if lower.contains("openai.azure.com") {
            return ApiFormat::Azure;
        }
        if lower.contains("api.openai.com") {
            return ApiFormat::OpenAi;
        }
    }

    if let Some(key) = api_key {
        let key = key.trim();
        if key.starts_with("sk-ant-") {
            return ApiFormat::Anthropic;
        }
        if key.starts_with("gsk_") {
            return ApiFormat::Groq;
        }
        if key.starts_with("AIza") {
            return ApiFormat::Google;
        }
        if key.starts_with("sk-") {
            return ApiFormat::OpenAi;
        }
        if key.starts_with("co-") {
            return ApiFormat::Cohere;
        }
    }

    ApiFormat::Unknown
}

/// Legacy single-provider configuration, persisted at `~/.iabuilder/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyConfig {
    pub api_key: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_true")]
    pub auto_save: bool,
    #[serde(default)]
    pub safe_mode: bool,
    #[serde(default = "default_true")]
    pub streaming: bool,
    #[serde(default = "default_true")]
    pub autorun: bool,
    #[serde(default = "default_true")]
    pub toolbox: bool,
}

fn default_model() -> String {
    "llama-3.1-8b-instant".to_string()
}
fn default_max_tokens() -> u32 {
    8000
}
fn default_temperature() -> f32 {
    0.5
}
fn default_true() -> bool {
    true
}

impl LegacyConfig {
    /// Load from `~/.iabuilder/config.json`, overriding `api_key` from the
    /// environment variable when set.
    pub fn load(env_var: &str) -> std::io::Result<Option<Self>> {
        let dir = config_dir();
        ensure_config_dir(&dir)?;
        let path = dir.join(LEGACY_CONFIG_FILE);

        let mut config: Option<LegacyConfig> = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw).ok()
        } else {
            None
        };

        if let Ok(env_key) = std::env::var(env_var) {
            if !env_key.is_empty() {
                match &mut config {
                    Some(cfg) => cfg.api_key = env_key,
                    None => {
                        config = Some(LegacyConfig {
                            api_key: env_key,
                            default_model: default_model(),
                            max_tokens: default_max_tokens(),
                            temperature: default_temperature(),
                            auto_save: true,
                            safe_mode: false,
                            streaming: true,
                            autorun: true,
                            toolbox: true,
                        });
                    }
                }
            }
        }

        Ok(config)
    }

    /// Persist to `~/.iabuilder/config.json`, replacing the real key with a
    /// placeholder when it was sourced from the environment (so it isn't
    /// written to disk twice).
    pub fn save(&self, env_var: &str) -> std::io::Result<()> {
        let dir = config_dir();
        ensure_config_dir(&dir)?;
        let path = dir.join(LEGACY_CONFIG_FILE);

        let mut to_save = self.clone();
        if std::env::var(env_var).map(|v| !v.is_empty()).unwrap_or(false) {
            to_save.api_key = "<from_environment>".to_string();
        }

        let json = serde_json::to_string_pretty(&to_save)?;
        fs::write(&path, json)?;
        secure_file_permissions(&path);
        Ok(())
    }
}

/// Per-provider entry in the registry: base URL, key env var name, and
/// the default model to fall back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub api_format: ApiFormat,
    #[serde(default)]
    pub base_url: Option<String>,
    pub api_key_env_var: String,
    /// Literal key persisted to disk, used only when `api_key_env_var`
    /// isn't set in the environment.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Provider-specific overrides that don't warrant a dedicated field.
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A model known to the registry, independent of which provider serves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    #[serde(default)]
    pub supports_tools: bool,
    #[serde(default)]
    pub context_window: Option<u32>,
}

/// Multi-provider registry persisted at `~/.iabuilder/providers.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderRegistry {
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub models: Vec<ModelInfo>,
    /// Name of the currently-selected provider. Invariant P1: if set, it
    /// names a key present in `providers`.
    #[serde(default)]
    pub active: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, config: ProviderConfig) -> Self {
        self.providers.insert(config.name.clone(), config);
        self
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    pub fn active_provider(&self) -> Option<&ProviderConfig> {
        self.active.as_deref().and_then(|name| self.providers.get(name))
    }

    /// Set the active provider, enforcing invariant P1. Returns `Err` with
    /// the requested name if it isn't registered, leaving `active` unchanged.
    pub fn set_active(&mut self, name: impl Into<String>) -> Result<(), String> {
        let name = name.into();
        if !self.providers.contains_key(&name) {
            return Err(name);
        }
        self.active = Some(name);
        Ok(())
    }

    /// Resolve a provider's API key: environment variable first (matching
    /// `original_source/iabuilder/config/api_detector.py`'s precedence),
    /// falling back to the persisted `api_key` field.
    pub fn resolve_api_key(&self, provider_name: &str) -> Option<String> {
        let provider = self.providers.get(provider_name)?;
        std::env::var(&provider.api_key_env_var)
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| provider.api_key.clone())
    }

    pub fn models_for_provider(&self, provider_name: &str) -> Vec<&ModelInfo> {
        self.models
            .iter()
            .filter(|m| m.provider == provider_name)
            .collect()
    }

    pub fn load() -> std::io::Result<Self> {
        Self::load_from(&config_dir())
    }

    fn load_from(dir: &Path) -> std::io::Result<Self> {
        ensure_config_dir(dir)?;
        let path = dir.join(PROVIDERS_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw).unwrap_or_default())
    }

    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(&config_dir())
    }

    fn save_to(&self, dir: &Path) -> std::io::Result<()> {
        ensure_config_dir(dir)?;
        let path = dir.join(PROVIDERS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        secure_file_permissions(&path);
        Ok(())
    }
}

/// Convenience alias matching the name used in the module-to-file map;
/// querying models is done through [`ProviderRegistry`] directly.
pub type ModelRegistry = ProviderRegistry;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_api_format_from_key_prefix() {
        assert_eq!(detect_api_format(Some("sk-ant-abc123"), None), ApiFormat::Anthropic);
        assert_eq!(detect_api_format(Some("gsk_abc123"), None), ApiFormat::Groq);
        assert_eq!(detect_api_format(Some("AIzaSyAbc"), None), ApiFormat::Google);
        assert_eq!(detect_api_format(Some("sk-abc123"), None), ApiFormat::OpenAi);
        assert_eq!(detect_api_format(None, None), ApiFormat::Unknown);
    }

    #[test]
    fn test_detect_api_format_prefers_base_url() {
        assert_eq!(
            detect_api_format(Some("sk-abc123"), Some("https://api.anthropic.com/v1")),
            ApiFormat::Anthropic
        );
    }

    #[test]
    fn test_registry_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProviderRegistry::new().with_provider(ProviderConfig {
            name: "openai".to_string(),
            api_format: ApiFormat::OpenAi,
            base_url: None,
            api_key_env_var: "OPENAI_API_KEY".to_string(),
            api_key: None,
            default_model: Some("gpt-4o".to_string()),
            enabled: true,
            extra: HashMap::new(),
        });
        registry.save_to(dir.path()).unwrap();

        let loaded = ProviderRegistry::load_from(dir.path()).unwrap();
        assert!(loaded.provider("openai").is_some());
        assert_eq!(
            loaded.provider("openai").unwrap().default_model.as_deref(),
            Some("gpt-4o")
        );
    }

    #[test]
    fn test_set_active_requires_registered_provider() {
        let mut registry = ProviderRegistry::new().with_provider(ProviderConfig {
            name: "openai".to_string(),
            api_format: ApiFormat::OpenAi,
            base_url: None,
            api_key_env_var: "OPENAI_API_KEY".to_string(),
            api_key: None,
            default_model: None,
            enabled: true,
            extra: HashMap::new(),
        });

        assert_eq!(registry.set_active("anthropic"), Err("anthropic".to_string()));
        assert!(registry.active.is_none());

        assert!(registry.set_active("openai").is_ok());
        assert_eq!(registry.active.as_deref(), Some("openai"));
        assert!(registry.active_provider().is_some());
    }

    #[test]
    fn test_resolve_api_key_falls_back_to_persisted_key() {
        let registry = ProviderRegistry::new().with_provider(ProviderConfig {
            name: "cohere".to_string(),
            api_format: ApiFormat::Cohere,
            base_url: None,
            api_key_env_var: "COHERE_API_KEY_NOT_SET_IN_TEST_ENV".to_string(),
            api_key: Some("persisted-key".to_string()),
            default_model: None,
            enabled: true,
            extra: HashMap::new(),
        });

        assert_eq!(
            registry.resolve_api_key("cohere").as_deref(),
            Some("persisted-key")
        );
    }

    #[test]
    fn test_registry_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = ProviderRegistry::load_from(dir.path()).unwrap();
        assert!(loaded.providers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_save_sets_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let registry = ProviderRegistry::new();
        registry.save_to(dir.path()).unwrap();

        let dir_mode = fs::metadata(dir.path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);

        let file_mode = fs::metadata(dir.path().join(PROVIDERS_FILE))
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(file_mode, 0o600);
    }
}
