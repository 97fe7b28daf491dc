//! Application configuration for Harvest.
//!
//! User config lives at `~/.harvest/harvest.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};
use crate::value::DEFAULT_CHARSET;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "harvest.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".harvest";

/// Scripting language used when neither the script nor the document names one.
pub const DEFAULT_SCRIPT_LANGUAGE: &str = "rhai";

// ---------------------------------------------------------------------------
// Config structs (matching harvest.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// HTTP client settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Plugins registered at startup.
    #[serde(default)]
    pub plugins: PluginsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Charset used to encode/decode text when an operation names none.
    #[serde(default = "default_charset")]
    pub charset: String,

    /// Scripting language used for `${…}` expressions and untagged scripts.
    #[serde(default = "default_script_language")]
    pub script_language: String,

    /// Directory relative file paths are resolved against.
    #[serde(default = "default_workdir")]
    pub workdir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            charset: default_charset(),
            script_language: default_script_language(),
            workdir: default_workdir(),
        }
    }
}

fn default_charset() -> String {
    DEFAULT_CHARSET.into()
}
fn default_script_language() -> String {
    DEFAULT_SCRIPT_LANGUAGE.into()
}
fn default_workdir() -> String {
    ".".into()
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Proxy host, if requests go through a proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_host: Option<String>,

    /// Proxy port (defaults to 80 when a host is set).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_port: Option<u16>,

    /// Proxy username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_user: Option<String>,

    /// Name of the env var holding the proxy password (never store the password itself).
    #[serde(default = "default_proxy_password_env")]
    pub proxy_password_env: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            proxy_host: None,
            proxy_port: None,
            proxy_user: None,
            proxy_password_env: default_proxy_password_env(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    concat!("Harvest/", env!("CARGO_PKG_VERSION")).into()
}
fn default_proxy_password_env() -> String {
    "HARVEST_PROXY_PASSWORD".into()
}

impl HttpConfig {
    /// Proxy URL (`http://host:port`) if a proxy host is configured.
    pub fn proxy_url(&self) -> Option<String> {
        self.proxy_host
            .as_deref()
            .filter(|h| !h.is_empty())
            .map(|host| format!("http://{host}:{}", self.proxy_port.unwrap_or(80)))
    }

    /// Proxy password read from the configured env var, if set and non-empty.
    pub fn proxy_password(&self) -> Option<String> {
        std::env::var(&self.proxy_password_env)
            .ok()
            .filter(|p| !p.is_empty())
    }

    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[plugins]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Plugin references as `type-id[:namespace-uri]`.
    #[serde(default)]
    pub register: Vec<String>,
}

// ---------------------------------------------------------------------------
// Scraper configuration (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Settings shared read-only by every operation of one run.
#[derive(Debug, Clone)]
pub struct ScraperConfiguration {
    /// Default charset.
    pub charset: String,
    /// Default scripting language tag (lower case).
    pub script_language: String,
    /// Working directory for relative paths.
    pub workdir: PathBuf,
    /// HTTP client settings.
    pub http: HttpConfig,
}

impl ScraperConfiguration {
    /// Override the default charset.
    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    /// Override the default scripting language.
    pub fn with_script_language(mut self, language: impl AsRef<str>) -> Self {
        self.script_language = language.as_ref().trim().to_ascii_lowercase();
        self
    }

    /// Override the working directory.
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// Resolve `path` against the working directory unless it is absolute.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.workdir.join(p)
        }
    }
}

impl From<&AppConfig> for ScraperConfiguration {
    fn from(config: &AppConfig) -> Self {
        Self {
            charset: config.defaults.charset.clone(),
            script_language: config.defaults.script_language.trim().to_ascii_lowercase(),
            workdir: PathBuf::from(&config.defaults.workdir),
            http: config.http.clone(),
        }
    }
}

impl Default for ScraperConfiguration {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.harvest/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| HarvestError::configuration("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.harvest/harvest.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| HarvestError::io(path.display().to_string(), e))?;

    toml::from_str(&content).map_err(|e| {
        HarvestError::configuration(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HarvestError::io(dir.display().to_string(), e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| HarvestError::configuration(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HarvestError::io(path.display().to_string(), e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("script_language"));
        assert!(toml_str.contains("HARVEST_PROXY_PASSWORD"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.charset, "UTF-8");
        assert_eq!(parsed.http.timeout_secs, 30);
    }

    #[test]
    fn config_with_proxy_and_plugins() {
        let toml_str = r#"
[defaults]
script_language = "Rhai"

[http]
proxy_host = "proxy.local"
proxy_port = 3128

[plugins]
register = ["harvest.plugins.ZipPlugin:urn:archive"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.plugins.register.len(), 1);
        assert_eq!(
            config.http.proxy_url().as_deref(),
            Some("http://proxy.local:3128")
        );

        let scraper = ScraperConfiguration::from(&config);
        assert_eq!(scraper.script_language, "rhai");
    }

    #[test]
    fn relative_paths_resolve_against_workdir() {
        let config = ScraperConfiguration::default().with_workdir("/tmp/harvest");
        assert_eq!(
            config.resolve_path("out/a.zip"),
            PathBuf::from("/tmp/harvest/out/a.zip")
        );
        assert_eq!(config.resolve_path("/abs.txt"), PathBuf::from("/abs.txt"));
    }

    #[test]
    fn proxy_password_missing_env() {
        let mut config = HttpConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.proxy_password_env = "HARVEST_TEST_NONEXISTENT_PASSWORD_12345".into();
        assert!(config.proxy_password().is_none());
        assert!(config.proxy_url().is_none());
    }
}
