use std::path::{Path, PathBuf};
use std::time::Duration;

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::types::ShellError;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "JOBSH_CONFIG";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Foreground run budget in milliseconds. Zero disables the timeout.
    pub timeout_ms: u64,
    pub max_line_len: usize,
    pub max_tokens: usize,
    pub prompt_suffix: String,
    pub history_file: Option<PathBuf>,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            timeout_ms: 10_000,
            max_line_len: 1024,
            max_tokens: 128,
            prompt_suffix: "> ".to_string(),
            history_file: None,
            log_level: "warn".to_string(),
            log_file: None,
        }
    }
}

/// Guards applied by the tokenizer before any work is done on a line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub max_line_len: usize,
    pub max_tokens: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Config::default().limits()
    }
}

impl Config {
    /// Resolution order:
    /// 1. `$JOBSH_CONFIG` if set (must exist)
    /// 2. `~/.config/jobsh/config.toml` if present
    /// 3. built-in defaults
    pub fn load() -> Result<Self, ShellError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }
        if let Some(home) = std::env::var_os("HOME") {
            let path = Path::new(&home).join(".config/jobsh/config.toml");
            if path.is_file() {
                return Self::from_file(&path);
            }
        }
        log::debug!("no config file found, using defaults");
        Ok(Config::default())
    }

    pub fn from_file(path: &Path) -> Result<Self, ShellError> {
        let src = std::fs::read_to_string(path)
            .map_err(|e| ShellError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&src)
            .map_err(|e| ShellError::Config(format!("{}: {}", path.display(), e)))?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(src: &str) -> Result<Self, ShellError> {
        let config: Config = toml::from_str(src).map_err(|e| ShellError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ShellError> {
        if self.max_tokens == 0 {
            return Err(ShellError::Config("max_tokens must be at least 1".into()));
        }
        if self.max_line_len == 0 {
            return Err(ShellError::Config("max_line_len must be at least 1".into()));
        }
        self.level_filter()?;
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_line_len: self.max_line_len,
            max_tokens: self.max_tokens,
        }
    }

    pub fn level_filter(&self) -> Result<LevelFilter, ShellError> {
        self.log_level
            .parse()
            .map_err(|_| ShellError::Config(format!("unknown log level: {}", self.log_level)))
    }
}
