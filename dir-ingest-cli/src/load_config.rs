/// `load_config` module: reads the static YAML run file and injects login secrets from the environment.
///
/// This is the only place where user-supplied YAML is parsed. Secrets never live in the file:
/// `R2R_LOGIN_EMAIL` and `R2R_LOGIN_PASSWORD` are read from the process environment (or `.env`,
/// loaded by the binary) and attached to the ingest section.
///
/// # Accepted schema
/// ```yaml
/// store:            # optional, see dir_ingest::StoreConfig
///   base_url: http://localhost:7272
///   timeout_secs: 60
/// scan:
///   root: ./docs
///   ignored_dir_names: [cache]        # any FilterOverrides field
/// ingest:           # optional, see dir_ingest::IngestConfig
///   collection_ids: []
///   ingestion_mode: hi-res
///   extract: true
/// ```
///
/// # Errors
/// All failures are `anyhow::Error`s with the config path in the message, surfaced at the CLI boundary.
use anyhow::Result;
use dir_ingest::config::{Credentials, IngestConfig, StoreConfig};
use dir_ingest::scan::FilterOverrides;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const LOGIN_EMAIL_ENV: &str = "R2R_LOGIN_EMAIL";
pub const LOGIN_PASSWORD_ENV: &str = "R2R_LOGIN_PASSWORD";

#[derive(Debug)]
pub struct CliConfig {
    pub store: StoreConfig,
    pub scan: ScanSection,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanSection {
    pub root: PathBuf,
    #[serde(flatten)]
    pub filters: FilterOverrides,
}

/// Loads a static YAML config file (no secrets) and injects login credentials from the environment.
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

    #[derive(Debug, Deserialize)]
    struct RawConfig {
        #[serde(default)]
        store: StoreConfig,
        scan: ScanSection,
        #[serde(default)]
        ingest: IngestConfig,
    }

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let mut ingest = raw.ingest;
    ingest.credentials = credentials_from_env();

    Ok(CliConfig {
        store: raw.store,
        scan: raw.scan,
        ingest,
    })
}

/// Both variables must be set and non-empty; a lone email or password is ignored with a warning.
pub fn credentials_from_env() -> Option<Credentials> {
    let email = std::env::var(LOGIN_EMAIL_ENV).unwrap_or_default();
    let password = std::env::var(LOGIN_PASSWORD_ENV).unwrap_or_default();
    match (email.is_empty(), password.is_empty()) {
        (false, false) => Some(Credentials { email, password }),
        (true, true) => None,
        _ => {
            warn!(
                "Only one of {LOGIN_EMAIL_ENV} and {LOGIN_PASSWORD_ENV} is set; continuing without login"
            );
            None
        }
    }
}
