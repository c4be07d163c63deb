//! Target project identifiers.

use serde::{Deserialize, Serialize};

fn default_project_id() -> String {
    "vstore-local".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectConfig {
    /// Primary target ("this project").
    #[serde(default = "default_project_id")]
    pub id: String,

    /// Secondary target ("other project"). Empty when unused.
    #[serde(default)]
    pub other_id: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            id: default_project_id(),
            other_id: String::new(),
        }
    }
}

impl ProjectConfig {
    /// The secondary project, if one is configured.
    pub fn other(&self) -> Option<&str> {
        if self.other_id.is_empty() {
            None
        } else {
            Some(&self.other_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_other_project() {
        let config = ProjectConfig::default();
        assert_eq!(config.id, "vstore-local");
        assert_eq!(config.other(), None);
    }

    #[test]
    fn other_project_when_set() {
        let config = ProjectConfig {
            other_id: "vstore-other".into(),
            ..Default::default()
        };
        assert_eq!(config.other(), Some("vstore-other"));
    }
}
