use crate::{KanbanError, KanbanResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A project: the working directory the agent is launched in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Short stable identifier referenced by tickets.
    pub id: String,
    /// Display name; defaults to the id.
    pub name: String,
    /// Directory the agent runs in.
    pub path: PathBuf,
    /// Embedded in the start prompt.
    #[serde(default)]
    pub description: String,
}

impl Project {
    /// Fail with a config error unless `path` is an existing directory.
    pub fn ensure_workdir(&self) -> KanbanResult<&PathBuf> {
        if self.path.is_dir() {
            Ok(&self.path)
        } else {
            Err(KanbanError::Config(format!(
                "project '{}' path does not exist: {}",
                self.id,
                self.path.display()
            )))
        }
    }
}

/// Client input for registering a project.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    /// Required.
    pub id: String,
    /// Falls back to `id`.
    #[serde(default)]
    pub name: Option<String>,
    /// Required. Existence is only checked at launch time.
    pub path: PathBuf,
    /// Optional context for the agent.
    #[serde(default)]
    pub description: Option<String>,
}

impl NewProject {
    /// Validate and fill defaults.
    pub fn into_project(self) -> KanbanResult<Project> {
        if self.id.trim().is_empty() || self.path.as_os_str().is_empty() {
            return Err(KanbanError::Validation("id and path are required".into()));
        }
        Ok(Project {
            name: self.name.filter(|n| !n.is_empty()).unwrap_or_else(|| self.id.clone()),
            id: self.id,
            path: self.path,
            description: self.description.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_defaults_to_id() {
        let project = NewProject {
            id: "web".into(),
            name: None,
            path: PathBuf::from("/tmp"),
            description: None,
        }
        .into_project()
        .unwrap();
        assert_eq!(project.name, "web");
        assert_eq!(project.description, "");
    }

    #[test]
    fn test_missing_id_rejected() {
        let result = NewProject {
            id: "".into(),
            name: None,
            path: PathBuf::from("/tmp"),
            description: None,
        }
        .into_project();
        assert!(matches!(result, Err(KanbanError::Validation(_))));
    }

    #[test]
    fn test_ensure_workdir() {
        let dir = std::env::temp_dir();
        let ok = Project {
            id: "a".into(),
            name: "a".into(),
            path: dir,
            description: String::new(),
        };
        assert!(ok.ensure_workdir().is_ok());

        let missing = Project {
            path: PathBuf::from("/definitely/not/here/kanban"),
            ..ok
        };
        assert!(matches!(missing.ensure_workdir(), Err(KanbanError::Config(_))));
    }
}
