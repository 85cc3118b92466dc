//! Run configuration loading for infragraph
//!
//! Finds a YAML `RunConfig`, applies environment overrides and validates
//! the result before a run starts.
//!
//! ```yaml
//! concurrency: 8
//! deadline_ms: 900000
//! phase: security
//! retry:
//!   max_attempts: 5
//! lifecycle_overrides:
//!   aws_vpc: MustExist
//! out_dir: out/terraform
//! ```

pub mod error;

pub use error::*;

use infragraph::{Lifecycle, RunConfig};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "INFRAGRAPH_CONFIG_PATH";
pub const CONCURRENCY_ENV: &str = "INFRAGRAPH_CONCURRENCY";
pub const DEADLINE_SECS_ENV: &str = "INFRAGRAPH_DEADLINE_SECS";

const CANDIDATES: [&str; 4] = [
    "infragraph.local.yaml",
    ".infragraph.local.yaml",
    "infragraph.yaml",
    ".infragraph.yaml",
];

/// Locate the configuration file
///
/// Search order:
/// 1. `INFRAGRAPH_CONFIG_PATH` (direct path)
/// 2. current directory: infragraph.local.yaml, .infragraph.local.yaml, infragraph.yaml, .infragraph.yaml
/// 3. `./.infragraph/`, same order
/// 4. `<config dir>/infragraph/config.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "{CONFIG_PATH_ENV} points to a missing file");
    }

    let current_dir = std::env::current_dir()?;
    for dir in [current_dir.clone(), current_dir.join(".infragraph")] {
        if !dir.is_dir() {
            continue;
        }
        for filename in &CANDIDATES {
            let path = dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("infragraph").join("config.yaml");
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Parse a configuration file; missing fields keep their defaults
pub fn load_config(path: &Path) -> Result<RunConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = serde_yaml::from_str::<Option<RunConfig>>(&content)
        .map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?
        .unwrap_or_default();
    tracing::debug!(path = %path.display(), "loaded run configuration");
    Ok(config)
}

/// Discover, load, override from the environment and validate
///
/// Without a configuration file the defaults are used.
pub fn load() -> Result<RunConfig> {
    let mut config = match find_config_file() {
        Ok(path) => load_config(&path)?,
        Err(ConfigError::ConfigFileNotFound) => {
            tracing::debug!("no configuration file, using defaults");
            RunConfig::default()
        }
        Err(e) => return Err(e),
    };
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                name: name.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Apply `INFRAGRAPH_CONCURRENCY` and `INFRAGRAPH_DEADLINE_SECS`
pub fn apply_env_overrides(config: &mut RunConfig) -> Result<()> {
    if let Some(concurrency) = env_number::<usize>(CONCURRENCY_ENV)? {
        config.concurrency = concurrency;
    }
    if let Some(secs) = env_number::<u64>(DEADLINE_SECS_ENV)? {
        config.deadline_ms = secs.saturating_mul(1000);
    }
    Ok(())
}

/// Parse `Kind=Lifecycle` pairs, e.g. `aws_iam_role=MustExistAndWarnOnDrift`
pub fn parse_lifecycle_overrides<I, S>(entries: I) -> Result<BTreeMap<String, Lifecycle>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut overrides = BTreeMap::new();
    for entry in entries {
        let entry = entry.as_ref();
        let (kind, lifecycle) = entry
            .split_once('=')
            .filter(|(kind, _)| !kind.trim().is_empty())
            .ok_or_else(|| ConfigError::InvalidOverride(entry.to_string()))?;
        overrides.insert(kind.trim().to_string(), lifecycle.parse()?);
    }
    Ok(overrides)
}
