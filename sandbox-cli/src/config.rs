use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::Args;
use e2b_sandbox::E2bConfig;
use sandbox::{DEFAULT_TEMPLATE, SandboxConfig};
use serde::Deserialize;

use crate::error::{CliError, CliResult};

/// Connection flags shared by every subcommand.
#[derive(Debug, Default, Args)]
pub struct GlobalArgs {
    /// API key for the sandbox service
    #[arg(long, env = "E2B_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,
    /// Control plane base URL
    #[arg(long, env = "E2B_API_URL", global = true)]
    pub api_url: Option<String>,
    /// Domain the sandbox hosts live under
    #[arg(long, env = "E2B_DOMAIN", global = true)]
    pub domain: Option<String>,
    /// Sandbox template [default: base]
    #[arg(long, global = true)]
    pub template: Option<String>,
    /// Path to a YAML config file
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,
}

/// Optional YAML config file. Every key may be omitted.
#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub domain: Option<String>,
    pub template: Option<String>,
    pub metadata: HashMap<String, String>,
    pub cwd: Option<String>,
    pub env_vars: HashMap<String, String>,
}

/// Everything needed to create a sandbox.
#[derive(Debug)]
pub struct Settings {
    pub e2b: E2bConfig,
    pub sandbox: SandboxConfig,
}

/// Load a config file from YAML.
pub async fn load(path: &Path) -> CliResult<FileConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CliError::Config(format!("read {}: {e}", path.display())))?;
    serde_yaml_ng::from_str(&content)
        .map_err(|e| CliError::Config(format!("parse {}: {e}", path.display())))
}

/// Merge flags over the config file over defaults.
pub fn merge(args: &GlobalArgs, file: FileConfig) -> CliResult<Settings> {
    let api_key = args
        .api_key
        .clone()
        .or(file.api_key)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            CliError::Config(
                "missing API key: pass --api-key, set E2B_API_KEY or add api_key to the config file"
                    .into(),
            )
        })?;

    let mut e2b = E2bConfig::new(api_key);
    if let Some(url) = args.api_url.clone().or(file.api_url) {
        e2b.api_url = url;
    }
    if let Some(domain) = args.domain.clone().or(file.domain) {
        e2b.domain = domain;
    }

    let template = args
        .template
        .clone()
        .or(file.template)
        .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());
    let sandbox = SandboxConfig {
        template,
        metadata: file.metadata,
        cwd: file.cwd,
        env_vars: file.env_vars,
    };
    Ok(Settings { e2b, sandbox })
}

/// Resolve settings from the flags and the optional config file.
pub async fn resolve(args: &GlobalArgs) -> CliResult<Settings> {
    let file = match &args.config {
        Some(path) => load(path).await?,
        None => FileConfig::default(),
    };
    merge(args, file)
}
