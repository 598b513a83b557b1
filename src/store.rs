//! The storage collaborator: bulk "rows where column in set" primitives backing the loaders.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::error::StoreError;
use crate::model::{Category, Id, Project, ResumeContent, User};

/// Bulk lookups the relationship loaders are built on. Each method issues one query and returns
/// the matching rows in no particular order; keys without rows are simply absent.
///
/// Implementations are dropped mid-query when the owning request is cancelled, so they must not
/// rely on running to completion.
#[async_trait]
pub trait Store: Send + Sync {
    async fn users_by_ids(&self, ids: &[Id]) -> Result<Vec<User>, StoreError>;
    async fn projects_by_user_ids(&self, user_ids: &[Id]) -> Result<Vec<Project>, StoreError>;
    async fn categories_by_ids(&self, ids: &[Id]) -> Result<Vec<Category>, StoreError>;
    async fn resume_contents_by_category_ids(
        &self,
        category_ids: &[Id],
    ) -> Result<Vec<ResumeContent>, StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    projects: Vec<Project>,
    categories: Vec<Category>,
    resume_contents: Vec<ResumeContent>,
    outage: Option<String>,
}

/// An in-process `Store` holding its rows in memory. It counts the queries it serves and can be
/// switched into an outage where every query fails with [`StoreError::Unavailable`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    queries: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.tables.write().await.users.push(user);
    }

    pub async fn insert_project(&self, project: Project) {
        self.tables.write().await.projects.push(project);
    }

    pub async fn insert_category(&self, category: Category) {
        self.tables.write().await.categories.push(category);
    }

    pub async fn insert_resume_content(&self, content: ResumeContent) {
        self.tables.write().await.resume_contents.push(content);
    }

    /// `Some(reason)` makes every following query fail, `None` restores service.
    pub async fn set_outage(&self, reason: Option<String>) {
        self.tables.write().await.outage = reason;
    }

    /// Number of queries served (or failed) so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Opens a read for one query.
    async fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let tables = self.tables.read().await;
        if let Some(reason) = &tables.outage {
            return Err(StoreError::Unavailable(reason.clone()));
        }
        Ok(tables)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn users_by_ids(&self, ids: &[Id]) -> Result<Vec<User>, StoreError> {
        let tables = self.read().await?;
        Ok(tables.users.iter().filter(|u| ids.contains(&u.id)).cloned().collect())
    }

    async fn projects_by_user_ids(&self, user_ids: &[Id]) -> Result<Vec<Project>, StoreError> {
        let tables = self.read().await?;
        Ok(tables
            .projects
            .iter()
            .filter(|p| p.user_id.map_or(false, |id| user_ids.contains(&id)))
            .cloned()
            .collect())
    }

    async fn categories_by_ids(&self, ids: &[Id]) -> Result<Vec<Category>, StoreError> {
        let tables = self.read().await?;
        Ok(tables.categories.iter().filter(|c| ids.contains(&c.id)).cloned().collect())
    }

    async fn resume_contents_by_category_ids(
        &self,
        category_ids: &[Id],
    ) -> Result<Vec<ResumeContent>, StoreError> {
        let tables = self.read().await?;
        Ok(tables
            .resume_contents
            .iter()
            .filter(|c| category_ids.contains(&c.category_id))
            .cloned()
            .collect())
    }
}
