//! Configuration for the connector.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (GITHUB_CONNECTOR_HOME, GITHUB_CONNECTOR_OUTPUT)
//! 2. Config file (.github-connector/config.yaml)
//! 3. Defaults (~/.github-connector for the journal, current directory for artifacts)
//!
//! Config file discovery:
//! - Searches current directory and parents for .github-connector/config.yaml
//! - `home` is relative to the .github-connector/ directory, `output.dir` to
//!   the project root
//!
//! Credentials are not part of the configuration; see [`credentials`].

pub mod credentials;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::ClientConfig;
use crate::core::WorkflowPolicy;

/// Journal root override
pub const HOME_ENV: &str = "GITHUB_CONNECTOR_HOME";

/// Artifact directory override
pub const OUTPUT_ENV: &str = "GITHUB_CONNECTOR_OUTPUT";

const CONFIG_DIR: &str = ".github-connector";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    /// Journal directory (relative to .github-connector/)
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub api: ClientConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub workflow: WorkflowPolicy,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// Artifact directory (relative to the project root)
    pub dir: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// Journal root; runs live under `{home}/runs`
    pub home: PathBuf,
    /// Directory the step artifacts are written to
    pub output_dir: PathBuf,
    /// GitHub API settings
    pub client: ClientConfig,
    /// Retry and timeout policy for the workflow's steps
    pub policy: WorkflowPolicy,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Default API and workflow settings with explicit directories
    pub fn with_dirs(home: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            output_dir: output_dir.into(),
            client: ClientConfig::default(),
            policy: WorkflowPolicy::default(),
            config_file: None,
        }
    }

    /// Get the runs directory ($GITHUB_CONNECTOR_HOME/runs)
    pub fn runs_dir(&self) -> PathBuf {
        self.home.join("runs")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    resolve_config(find_config_file())
}

fn resolve_config(config_file: Option<PathBuf>) -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;

    let parsed = match config_file {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    // .github-connector/ and the project root above it
    let config_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or(Path::new("."));
    let project_root = config_dir.parent().unwrap_or(Path::new("."));

    let home = env_path(HOME_ENV)
        .or_else(|| parsed.home.as_deref().map(|h| resolve_path(config_dir, h)))
        .unwrap_or(default_home);

    let output_dir = env_path(OUTPUT_ENV)
        .or_else(|| {
            parsed
                .output
                .dir
                .as_deref()
                .map(|d| resolve_path(project_root, d))
        })
        .unwrap_or(cwd);

    Ok(ResolvedConfig {
        home,
        output_dir,
        client: parsed.api,
        policy: parsed.workflow,
        config_file,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
