/// `load_config` module: Loads a static YAML config, including environment
/// secret injection, into the strongly-typed CLI configuration.
///
/// This module is the only place where untrusted YAML is parsed and mapped
/// to rich internal structs.
///
/// # Responsibilities
/// - Parse user-supplied YAML configuration files into type-safe Rust structs
/// - Validate required sections and surface clear diagnostics on failure
/// - Secrets never live in the YAML: the mail and drive sections only name
///   the environment variables the tokens come from
///
/// # Errors
/// All errors in this module use `anyhow::Error` for context-rich
/// diagnostics, and are surfaced at the CLI boundary.
///
/// For the accepted YAML schema, see the README.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    /// Root of the courier's data directory (the JSON file store).
    pub data_dir: PathBuf,
    pub kiosk: KioskSection,
    pub mail: MailSection,
    pub drive: DriveSection,
}

#[derive(Debug, Deserialize)]
pub struct KioskSection {
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct MailSection {
    pub endpoint: String,
    pub sender: String,
    /// Name of the environment variable holding the relay token.
    #[serde(default = "default_mail_token_env")]
    pub token_env: String,
}

#[derive(Debug, Deserialize)]
pub struct DriveSection {
    pub base_url: String,
    /// Remote folder every archive path is rooted under.
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default = "default_drive_token_env")]
    pub token_env: String,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_mail_token_env() -> String {
    "COURIER_MAIL_TOKEN".to_string()
}

fn default_drive_token_env() -> String {
    "COURIER_DRIVE_TOKEN".to_string()
}

/// Loads a static YAML config file (no secrets) for use by the CLI.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(config) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            config
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if config.kiosk.base_url.is_empty() {
        return Err(anyhow::anyhow!("kiosk.base_url must not be empty"));
    }

    Ok(config)
}
