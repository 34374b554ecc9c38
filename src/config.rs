//! Configuration loader and validator for the manifest steward.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub forge: Forge,
    pub watches: Vec<Watch>,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub watch_interval_secs: u64,
}

/// Hosting platform settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Forge {
    pub base_url: String,
    pub token: String,
}

/// One watched manifest file: owner/repo/path at a ref.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Watch {
    pub owner: String,
    pub repo: String,
    pub path: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.watch_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.watch_interval_secs must be > 0"));
    }

    if cfg.forge.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("forge.base_url must be non-empty"));
    }
    if cfg.forge.token.trim().is_empty() {
        return Err(ConfigError::Invalid("forge.token must be non-empty"));
    }

    if cfg.watches.is_empty() {
        return Err(ConfigError::Invalid(
            "watches must declare at least one manifest",
        ));
    }
    for w in &cfg.watches {
        if w.owner.trim().is_empty() {
            return Err(ConfigError::Invalid("watches[].owner must be non-empty"));
        }
        if w.repo.trim().is_empty() {
            return Err(ConfigError::Invalid("watches[].repo must be non-empty"));
        }
        if w.path.trim().is_empty() {
            return Err(ConfigError::Invalid("watches[].path must be non-empty"));
        }
        if w.git_ref.trim().is_empty() {
            return Err(ConfigError::Invalid("watches[].ref must be non-empty"));
        }
    }

    Ok(())
}

/// Example configuration document, kept in sync with the schema above.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  watch_interval_secs: 60

forge:
  base_url: "https://gitee.com/api/v5/"
  token: "YOUR_FORGE_TOKEN"

watches:
  - owner: "open-community"
    repo: "community"
    path: "repository/community.yaml"
    ref: "master"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.watches.len(), 1);
        assert_eq!(cfg.watches[0].git_ref, "master");
    }

    #[test]
    fn invalid_token() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.forge.token = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("forge.token")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_interval() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.watch_interval_secs = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_empty_watches() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.watches.clear();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("watches")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_watch_fields() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.watches[0].owner = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.watches[0].path = " ".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        let mut f = fs::File::create(&p).unwrap();
        f.write_all(example().as_bytes()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.watches[0].owner, "open-community");
    }
}
