//! Configuration file discovery and parsing.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use communique_store::Jid;
use serde::{Deserialize, Serialize};

/// Directory and file stem used for every on-disk location.
pub const APP_NAME: &str = "communique";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Config {
    /// The account address, eg. `me@example.com`.
    #[serde(default)]
    pub jid: String,

    /// Shell command whose first line of output is the password.
    #[serde(default)]
    pub password_eval: String,

    /// Inline password, used when `password_eval` is empty.
    #[serde(default)]
    pub password: Option<String>,

    /// Network timeout in seconds for dial, negotiation and sends.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Explicit database file instead of the platform data dir.
    #[serde(default)]
    pub db_path: Option<String>,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Shorthand for `level = "debug"`.
    #[serde(default)]
    pub verbose: bool,

    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jid: String::new(),
            password_eval: String::new(),
            password: None,
            timeout_secs: default_timeout_secs(),
            db_path: None,
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            level: default_log_level(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load the config from `explicit` if given, otherwise from the first
    /// readable file in [`search_paths`]. Returns the path that was used.
    pub fn load(explicit: Option<&str>) -> Result<(Self, PathBuf)> {
        if let Some(path) = explicit {
            let path = PathBuf::from(shellexpand::tilde(path).as_ref());
            return Ok((Self::load_from_file(&path)?, path));
        }

        let candidates = search_paths();
        for path in &candidates {
            if path.is_file() {
                return Ok((Self::load_from_file(path)?, path.clone()));
            }
            tracing::debug!("No config at {}", path.display());
        }
        match candidates.last() {
            Some(last) => bail!("No config file found (last tried {})", last.display()),
            None => bail!("No config file locations available"),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content).context("Failed to parse TOML config")?;
        config.expand_paths();
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jid.is_empty() {
            bail!("No account address configured, add: jid = \"me@example.com\"");
        }
        let jid = self.account()?;
        if jid.localpart().is_empty() {
            bail!("Account address {} has no local part", self.jid);
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// The parsed account address.
    pub fn account(&self) -> Result<Jid> {
        self.jid
            .parse()
            .with_context(|| format!("Invalid account address: {}", self.jid))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The effective log level, taking `verbose` into account.
    pub fn log_level(&self) -> &str {
        if self.log.verbose {
            "debug"
        } else {
            &self.log.level
        }
    }

    fn expand_paths(&mut self) {
        if let Some(db) = &self.db_path {
            self.db_path = Some(shellexpand::tilde(db).to_string());
        }
    }

    /// A commented config file with every option at its default.
    pub fn default_toml() -> String {
        format!(
            r#"# The account to sign in as.
jid = ""

# A command that prints the password on its first line of output, eg.
# password_eval = "pass show xmpp/me@example.com"
password_eval = ""

# Network timeout in seconds.
timeout_secs = {timeout}

# Database file; defaults to the platform data directory.
# db_path = "~/.local/share/{app}/me@example.com.db"

[log]
verbose = false
level = "{level}"
"#,
            timeout = default_timeout_secs(),
            app = APP_NAME,
            level = default_log_level(),
        )
    }
}

/// Config file locations, most preferred first.
pub fn search_paths() -> Vec<PathBuf> {
    let file_name = format!("{APP_NAME}.toml");
    let mut paths = vec![PathBuf::from(".").join(file_name)];

    if let Some(dirs) = directories::BaseDirs::new() {
        paths.push(dirs.config_dir().join(APP_NAME).join("config.toml"));
    }
    let home = PathBuf::from(shellexpand::tilde("~/.config").as_ref());
    let home = home.join(APP_NAME).join("config.toml");
    if !paths.contains(&home) {
        paths.push(home);
    }
    paths.push(PathBuf::from("/etc").join(APP_NAME).join("config.toml"));
    paths
}
