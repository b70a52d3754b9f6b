//! Application configuration.
//!
//! Settings are layered with figment, later layers winning:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. A TOML file: `--config FILE`, or `config.toml` in the platform config
//!    directory when it exists
//! 3. `DEDUPLICATE_*` environment variables (e.g. `DEDUPLICATE_CONCURRENCY=4`)
//! 4. Command-line flags ([`Config::apply_cli`])
//!
//! ```toml
//! concurrency = 4
//! types = ".jpg,.png"
//! format = "json"
//! algorithm = "sha256"
//! keep_going = true
//! state_dir = "/var/tmp/dedup"
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::duplicates::{HashFailurePolicy, DEFAULT_CONCURRENCY};
use crate::output::RecordFormat;
use crate::scanner::HashAlgorithm;
use crate::session::{ExtensionFilter, SessionPaths};

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "DEDUPLICATE_";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// A layer could not be parsed or has the wrong type.
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),

    /// The concurrency limit is zero.
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    /// The effective configuration could not be printed.
    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Effective settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum files hashed at once
    pub concurrency: usize,
    /// Comma-separated extension allow-list; empty allows everything
    pub types: String,
    /// Duplicate record format
    pub format: RecordFormat,
    /// Content hash algorithm
    pub algorithm: HashAlgorithm,
    /// Skip unhashable files instead of failing
    pub keep_going: bool,
    /// Follow symbolic links while listing
    pub follow_symlinks: bool,
    /// Directory holding the work list and checkpoint
    pub state_dir: PathBuf,
    /// Draw progress bars
    pub progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            types: String::new(),
            format: RecordFormat::default(),
            algorithm: HashAlgorithm::default(),
            keep_going: false,
            follow_symlinks: false,
            state_dir: PathBuf::from("."),
            progress: true,
        }
    }
}

impl Config {
    /// Load defaults, the config file and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if `explicit` names a missing file
    /// and [`ConfigError::Invalid`] if any layer is malformed.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match explicit {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path(),
        };
        if let Some(ref path) = file {
            log::debug!("Reading configuration from {}", path.display());
        }

        let config: Self = Self::figment(file.as_deref())
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults merged with the TOML file at `file`, if any. Missing files
    /// contribute nothing.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        match file {
            Some(path) => figment.merge(Toml::file(path)),
            None => figment,
        }
    }

    /// `config.toml` in the platform configuration directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "deduplicate").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Override settings with the flags given on the command line.
    #[must_use]
    pub fn apply_cli(mut self, cli: &Cli) -> Self {
        if let Some(concurrency) = cli.concurrency {
            self.concurrency = concurrency as usize;
        }
        if let Some(ref types) = cli.types {
            self.types.clone_from(types);
        }
        if let Some(format) = cli.format {
            self.format = format;
        }
        if let Some(algorithm) = cli.algorithm {
            self.algorithm = algorithm;
        }
        if let Some(ref dir) = cli.state_dir {
            self.state_dir.clone_from(dir);
        }
        self.keep_going |= cli.keep_going;
        self.follow_symlinks |= cli.follow_symlinks;
        if cli.no_progress || cli.quiet {
            self.progress = false;
        }
        self
    }

    /// Reject values no run can use.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroConcurrency`] for a zero limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }

    /// The extension allow-list.
    #[must_use]
    pub fn extension_filter(&self) -> ExtensionFilter {
        ExtensionFilter::parse(&self.types)
    }

    /// State file locations inside `state_dir`.
    #[must_use]
    pub fn session_paths(&self) -> SessionPaths {
        SessionPaths::in_dir(&self.state_dir)
    }

    /// Failure policy implied by `keep_going`.
    #[must_use]
    pub fn failure_policy(&self) -> HashFailurePolicy {
        if self.keep_going {
            HashFailurePolicy::Skip
        } else {
            HashFailurePolicy::FailFast
        }
    }

    /// The configuration as TOML, for `--print-config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Render`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
