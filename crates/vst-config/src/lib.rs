//! # vst-config
//!
//! Layered configuration loading for vstore using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`VSTORE_*` prefix, `__` as separator)
//! 2. Project-level `.vstore/config.toml`
//! 3. User-level `~/.config/vstore/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `VSTORE_PROJECT__ID` -> `project.id`,
//! `VSTORE_RETRY__STORE_WRITE_ATTEMPTS` -> `retry.store_write_attempts`, etc.
//!
//! # Usage
//!
//! ```no_run
//! use vst_config::VstConfig;
//!
//! let config = VstConfig::load_with_dotenv().expect("config");
//! if config.store.is_remote() {
//!     println!("remote store: {}", config.store.remote_url(&config.project.id));
//! }
//! ```

mod error;
mod project;
mod retry;
mod store;

pub use error::ConfigError;
pub use project::ProjectConfig;
pub use retry::RetryConfig;
pub use store::{PROJECT_PLACEHOLDER, StoreConfig};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VstConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl VstConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy` -- use [`Self::load_with_dotenv`] for `.env` loading.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Figment`] on malformed sources and
    /// [`ConfigError::InvalidValue`] when [`Self::validate`] rejects the result.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `.env` file support.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`].
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests can layer additional providers on top.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = PathBuf::from(".vstore/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed("VSTORE_").split("__"))
    }

    /// Reject values the rest of the system cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an empty project id or a zero
    /// attempt budget.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.id.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "project.id".into(),
                reason: "must not be empty".into(),
            });
        }
        for (field, value) in [
            ("project.id", self.project.id.as_str()),
            ("project.other_id", self.project.other_id.as_str()),
        ] {
            check_file_stem(field, value)?;
        }
        for (field, value) in [
            ("retry.store_write_attempts", self.retry.store_write_attempts),
            ("retry.crypto_attempts", self.retry.crypto_attempts),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    reason: "must be at least 1".into(),
                });
            }
        }
        Ok(())
    }

    /// The secondary project id, or [`ConfigError::NotConfigured`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotConfigured`] when `project.other_id` is empty.
    pub fn other_project(&self) -> Result<&str, ConfigError> {
        self.project.other().ok_or_else(|| ConfigError::NotConfigured {
            section: "project.other_id".into(),
        })
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("vstore").join("config.toml"))
    }
}

/// Project ids name database files under `store.local_dir`, so they must
/// stay a single path component.
fn check_file_stem(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.contains(['/', '\\']) || value == "." || value == ".." {
        return Err(ConfigError::InvalidValue {
            field: field.into(),
            reason: format!("'{value}' must not contain path separators or be '.' or '..'"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_and_local() {
        let config = VstConfig::default();
        config.validate().unwrap();
        assert!(!config.store.is_remote());
        assert_eq!(config.retry.store_write_attempts, 8);
        assert!(config.other_project().is_err());
    }

    #[test]
    fn zero_budget_is_rejected() {
        let mut config = VstConfig::default();
        config.retry.crypto_attempts = 0;
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "retry.crypto_attempts")
        );
    }

    #[test]
    fn empty_project_id_is_rejected() {
        let mut config = VstConfig::default();
        config.project.id.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn project_ids_that_escape_local_dir_are_rejected() {
        for bad in ["../x", "a/b", "a\\b", "..", "."] {
            let mut config = VstConfig::default();
            config.project.id = bad.into();
            let err = config.validate().unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "project.id"),
                "{bad}: {err}"
            );
        }

        let mut config = VstConfig::default();
        config.project.other_id = "../shadow".into();
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "project.other_id")
        );
    }

    #[test]
    fn dotted_project_ids_are_allowed() {
        let mut config = VstConfig::default();
        config.project.id = "team.alpha".into();
        config.project.other_id = "..beta".into();
        config.validate().unwrap();
    }
}
