//! Application configuration for Darwin.
//!
//! User config lives at `~/.darwin/darwin.toml`.
//! CLI flags override config file values, which override defaults.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DarwinError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "darwin.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".darwin";

// ---------------------------------------------------------------------------
// Config structs (matching darwin.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Template and output locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Output artifact naming.
    #[serde(default)]
    pub naming: NamingConfig,

    /// Format converter selection and policy.
    #[serde(default)]
    pub converter: ConverterConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// The dossier template asset.
    #[serde(default = "default_template_path")]
    pub template_path: PathBuf,

    /// Directory receiving every produced artifact.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            template_path: default_template_path(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_template_path() -> PathBuf {
    PathBuf::from("templates").join("dat_template.docx")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("generated_docs")
}

/// `[naming]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Fixed prefix of every artifact name.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Substituted when the title has no usable character.
    #[serde(default = "default_fallback_title")]
    pub fallback_title: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            fallback_title: default_fallback_title(),
        }
    }
}

fn default_prefix() -> String {
    "DAT".into()
}
fn default_fallback_title() -> String {
    "document".into()
}

/// Which converter implementation backs derivative formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConverterKind {
    /// A locally installed office suite invoked as a child process.
    #[default]
    Local,
    /// An HTTP conversion service.
    Remote,
    /// No converter; derivative formats fail as unavailable.
    Disabled,
}

/// `[converter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    #[serde(default)]
    pub kind: ConverterKind,

    /// Executable name or path, resolved through `PATH`.
    #[serde(default = "default_program")]
    pub program: String,

    /// Hard limit for one conversion.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Give every local conversion its own throwaway user profile.
    #[serde(default = "default_true")]
    pub isolate_profile: bool,

    /// Endpoint of the remote conversion service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            kind: ConverterKind::default(),
            program: default_program(),
            timeout_secs: default_timeout_secs(),
            isolate_profile: true,
            endpoint: None,
        }
    }
}

fn default_program() -> String {
    "soffice".into()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Reject values that would only fail later, deep inside the pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.naming.prefix.is_empty() {
            return Err(DarwinError::config("naming.prefix must not be empty"));
        }
        if self.naming.fallback_title.is_empty() {
            return Err(DarwinError::config("naming.fallback_title must not be empty"));
        }
        if self.converter.timeout_secs == 0 {
            return Err(DarwinError::config("converter.timeout_secs must be positive"));
        }
        if self.converter.kind == ConverterKind::Remote && self.converter.endpoint.is_none() {
            return Err(DarwinError::config(
                "converter.kind = \"remote\" requires converter.endpoint",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.darwin/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| DarwinError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.darwin/darwin.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| DarwinError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| DarwinError::config(format!("failed to parse {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file at `path`. An existing file is left untouched
/// and reported as a validation error.
pub fn init_config_at(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| DarwinError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DarwinError::config(e.to_string()))?;

    let mut file = std::fs::File::create_new(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::AlreadyExists => DarwinError::validation(format!(
            "{} already exists; remove it first to start from defaults",
            path.display()
        )),
        _ => DarwinError::io(path, e),
    })?;
    file.write_all(content.as_bytes())
        .map_err(|e| DarwinError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(())
}
