use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowResult {
    pub project_id: u64,
    pub analysis: String,
    pub status: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Where the result would be persisted, e.g. `results/project-7-20260101120000.json`.
    pub location: String,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    projects: Vec<Project>,
    results: Vec<WorkflowResult>,
}

/// In-memory projects and their analysis results.
#[derive(Default)]
pub struct ProjectStore {
    inner: RwLock<Inner>,
}

impl ProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, name: impl Into<String>, owner: impl Into<String>) -> Project {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let project = Project {
            id: inner.next_id,
            name: name.into(),
            owner: owner.into(),
            created_at: Utc::now(),
        };
        inner.projects.push(project.clone());
        project
    }

    pub async fn get(&self, id: u64) -> Option<Project> {
        let inner = self.inner.read().await;
        inner.projects.iter().find(|project| project.id == id).cloned()
    }

    /// Page through projects in creation order, optionally only those owned by `owner`.
    pub async fn list(&self, skip: usize, limit: usize, owner: Option<&str>) -> Vec<Project> {
        let inner = self.inner.read().await;
        inner
            .projects
            .iter()
            .filter(|project| owner.map_or(true, |owner| project.owner == owner))
            .skip(skip)
            .take(limit.min(MAX_PAGE_SIZE))
            .cloned()
            .collect()
    }

    pub async fn record_result(&self, result: WorkflowResult) {
        self.inner.write().await.results.push(result);
    }

    pub async fn results_for(&self, project_id: u64) -> Vec<WorkflowResult> {
        let inner = self.inner.read().await;
        inner
            .results
            .iter()
            .filter(|result| result.project_id == project_id)
            .cloned()
            .collect()
    }
}

/// Simulated analysis run for `project`.
pub fn analyze(project: &Project) -> WorkflowResult {
    let timestamp = Utc::now();
    WorkflowResult {
        project_id: project.id,
        analysis: format!("Project {} analyzed successfully!", project.name),
        status: Some("completed".to_string()),
        error: None,
        timestamp,
        location: format!(
            "results/project-{}-{}.json",
            project.id,
            timestamp.format("%Y%m%d%H%M%S")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> ProjectStore {
        let store = ProjectStore::new();
        store.create("POC API", "alice").await;
        store.create("Container API", "bob").await;
        store.create("Automation Workflow", "alice").await;
        store
    }

    #[tokio::test]
    async fn list_filters_by_owner_and_pages() {
        let store = seeded().await;
        let owned = store.list(0, 10, Some("alice")).await;
        assert_eq!(owned.len(), 2);
        assert!(owned.iter().all(|project| project.owner == "alice"));

        let page = store.list(1, 1, None).await;
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name, "Container API");

        assert!(store.list(0, 10, Some("carol")).await.is_empty());
    }

    #[tokio::test]
    async fn limit_is_capped() {
        let store = ProjectStore::new();
        for index in 0..(MAX_PAGE_SIZE + 5) {
            store.create(format!("p{index}"), "alice").await;
        }
        assert_eq!(store.list(0, usize::MAX, None).await.len(), MAX_PAGE_SIZE);
    }

    #[tokio::test]
    async fn results_are_scoped_to_project() {
        let store = seeded().await;
        let first = store.get(1).await.expect("project 1");
        let second = store.get(2).await.expect("project 2");
        store.record_result(analyze(&first)).await;
        store.record_result(analyze(&second)).await;
        store.record_result(analyze(&first)).await;

        let results = store.results_for(1).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|result| result.project_id == 1));
        assert!(results[0].location.starts_with("results/project-1-"));
        assert_eq!(results[0].analysis, "Project POC API analyzed successfully!");
    }
}
