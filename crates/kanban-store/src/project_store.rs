use async_trait::async_trait;
use kanban_core::{KanbanError, KanbanResult, NewProject, Project};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProjectDocument {
    projects: Vec<Project>,
}

/// Registry of the directories agents may run in.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// All projects, in creation order.
    async fn list(&self) -> KanbanResult<Vec<Project>>;
    /// One project by id.
    async fn get(&self, id: &str) -> KanbanResult<Option<Project>>;
    /// Register a project. A duplicate id is a validation error.
    async fn create(&self, input: NewProject) -> KanbanResult<Project>;
    /// `false` when no project had that id.
    async fn delete(&self, id: &str) -> KanbanResult<bool>;
}

/// File-based project registry (`projects.json`).
pub struct FileProjectStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileProjectStore {
    /// Open `<dir>/projects.json`, creating the directory if needed.
    pub async fn new(dir: PathBuf) -> KanbanResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            path: dir.join("projects.json"),
            write_lock: Mutex::new(()),
        })
    }

    async fn load(&self) -> KanbanResult<ProjectDocument> {
        if !self.path.exists() {
            return Ok(ProjectDocument::default());
        }
        let data = tokio::fs::read_to_string(&self.path).await?;
        serde_json::from_str(&data)
            .map_err(|e| KanbanError::Store(format!("Failed to parse projects: {e}")))
    }

    async fn save(&self, doc: &ProjectDocument) -> KanbanResult<()> {
        let json = serde_json::to_string_pretty(doc)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for FileProjectStore {
    async fn list(&self) -> KanbanResult<Vec<Project>> {
        Ok(self.load().await?.projects)
    }

    async fn get(&self, id: &str) -> KanbanResult<Option<Project>> {
        Ok(self.load().await?.projects.into_iter().find(|p| p.id == id))
    }

    async fn create(&self, input: NewProject) -> KanbanResult<Project> {
        let project = input.into_project()?;
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await?;
        if doc.projects.iter().any(|p| p.id == project.id) {
            return Err(KanbanError::Validation(format!(
                "project id '{}' already exists",
                project.id
            )));
        }
        doc.projects.push(project.clone());
        self.save(&doc).await?;
        Ok(project)
    }

    async fn delete(&self, id: &str) -> KanbanResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await?;
        let before = doc.projects.len();
        doc.projects.retain(|p| p.id != id);
        if doc.projects.len() == before {
            return Ok(false);
        }
        self.save(&doc).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn input(id: &str) -> NewProject {
        NewProject {
            id: id.into(),
            name: None,
            path: std::env::temp_dir(),
            description: Some("demo".into()),
        }
    }

    #[tokio::test]
    async fn create_get_delete() {
        let tmp = TempDir::new().unwrap();
        let store = FileProjectStore::new(tmp.path().to_path_buf()).await.unwrap();

        store.create(input("web")).await.unwrap();
        let project = store.get("web").await.unwrap().unwrap();
        assert_eq!(project.name, "web");
        assert_eq!(project.description, "demo");

        assert!(store.delete("web").await.unwrap());
        assert!(store.get("web").await.unwrap().is_none());
        assert!(!store.delete("web").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_id_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = FileProjectStore::new(tmp.path().to_path_buf()).await.unwrap();
        store.create(input("api")).await.unwrap();
        let err = store.create(input("api")).await.unwrap_err();
        assert!(matches!(err, KanbanError::Validation(_)));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
