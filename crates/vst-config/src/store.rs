//! Record store (libSQL) configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Placeholder substituted with the project id in [`StoreConfig::url`].
pub const PROJECT_PLACEHOLDER: &str = "{project}";

fn default_local_dir() -> String {
    ".vstore/data".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Remote database URL, e.g. `libsql://{project}-myorg.turso.io`.
    /// `{project}` is replaced by the target project id.
    #[serde(default)]
    pub url: String,

    /// Auth token for the remote database.
    #[serde(default)]
    pub auth_token: String,

    /// Directory for per-project local databases when no remote is configured.
    #[serde(default = "default_local_dir")]
    pub local_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            auth_token: String::new(),
            local_dir: default_local_dir(),
        }
    }
}

impl StoreConfig {
    /// Check if the remote store has the minimum required fields.
    pub fn is_remote(&self) -> bool {
        !self.url.is_empty() && !self.auth_token.is_empty()
    }

    /// Remote URL for `project`.
    pub fn remote_url(&self, project: &str) -> String {
        self.url.replace(PROJECT_PLACEHOLDER, project)
    }

    /// Local database file for `project`.
    pub fn local_path(&self, project: &str) -> PathBuf {
        PathBuf::from(&self.local_dir).join(format!("{project}.db"))
    }
}
