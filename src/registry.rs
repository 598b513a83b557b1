//! The per-request set of relationship loaders.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    config::LoaderConfig,
    error::StoreError,
    grouping::{Grouped, GroupedFetch, Indexed},
    loader::Loader,
    loader_op::LoadResult,
    model::{Category, Id, Project, ResumeContent, User},
    store::Store,
};

pub type SharedStore = Arc<dyn Store>;
pub type SharedStoreError = Arc<StoreError>;

/// Projects keyed by owning user id.
pub struct UserProjects;

/// Resume contents keyed by category id.
pub struct CategoryContents;

/// Categories keyed by id, for resolving a resume content's category.
pub struct ContentCategory;

/// Users keyed by id, for resolving a project's owner.
pub struct ProjectUser;

#[async_trait]
impl GroupedFetch<Id, Project> for UserProjects {
    type Context = SharedStore;
    type Error = StoreError;

    async fn fetch(keys: &[Id], store: &SharedStore) -> Result<Vec<Project>, StoreError> {
        store.projects_by_user_ids(keys).await
    }

    fn group_key(project: &Project) -> Option<Id> {
        project.user_id
    }
}

#[async_trait]
impl GroupedFetch<Id, ResumeContent> for CategoryContents {
    type Context = SharedStore;
    type Error = StoreError;

    async fn fetch(keys: &[Id], store: &SharedStore) -> Result<Vec<ResumeContent>, StoreError> {
        store.resume_contents_by_category_ids(keys).await
    }

    fn group_key(content: &ResumeContent) -> Option<Id> {
        Some(content.category_id)
    }
}

#[async_trait]
impl GroupedFetch<Id, Category> for ContentCategory {
    type Context = SharedStore;
    type Error = StoreError;

    async fn fetch(keys: &[Id], store: &SharedStore) -> Result<Vec<Category>, StoreError> {
        store.categories_by_ids(keys).await
    }

    fn group_key(category: &Category) -> Option<Id> {
        Some(category.id)
    }
}

#[async_trait]
impl GroupedFetch<Id, User> for ProjectUser {
    type Context = SharedStore;
    type Error = StoreError;

    async fn fetch(keys: &[Id], store: &SharedStore) -> Result<Vec<User>, StoreError> {
        store.users_by_ids(keys).await
    }

    fn group_key(user: &User) -> Option<Id> {
        Some(user.id)
    }
}

pub type UserProjectsLoader = Loader<Id, Vec<Arc<Project>>, SharedStoreError>;
pub type CategoryContentsLoader = Loader<Id, Vec<Arc<ResumeContent>>, SharedStoreError>;
pub type ContentCategoryLoader = Loader<Id, Option<Arc<Category>>, SharedStoreError>;
pub type ProjectUserLoader = Loader<Id, Option<Arc<User>>, SharedStoreError>;

/// The loaders for one incoming request. Build one when the request starts, hand `&Loaders` to the
/// resolvers, and drop it when the request completes; nothing cached here outlives it.
pub struct Loaders {
    pub user_projects: UserProjectsLoader,
    pub category_contents: CategoryContentsLoader,
    pub content_category: ContentCategoryLoader,
    pub project_user: ProjectUserLoader,
    cancel: CancellationToken,
}

impl Loaders {
    /// Must be called from within a tokio runtime. The loaders stop when `request_cancel` (or
    /// [`Loaders::cancel`]) fires.
    pub fn new(
        store: SharedStore,
        config: LoaderConfig,
        request_cancel: &CancellationToken,
    ) -> Self {
        let cancel = request_cancel.child_token();
        tracing::trace!(?config, "building request loaders");
        Self {
            user_projects: Loader::with_cancellation(
                Grouped::<UserProjects>::new(),
                store.clone(),
                config.clone(),
                cancel.clone(),
            ),
            category_contents: Loader::with_cancellation(
                Grouped::<CategoryContents>::new(),
                store.clone(),
                config.clone(),
                cancel.clone(),
            ),
            content_category: Loader::with_cancellation(
                Indexed::<ContentCategory>::new(),
                store.clone(),
                config.clone(),
                cancel.clone(),
            ),
            project_user: Loader::with_cancellation(
                Indexed::<ProjectUser>::new(),
                store,
                config,
                cancel.clone(),
            ),
            cancel,
        }
    }

    /// Cancels every loader of this request.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn projects_of(
        &self,
        user: &User,
    ) -> LoadResult<Vec<Arc<Project>>, SharedStoreError> {
        self.user_projects.load(user.id).await
    }

    pub async fn contents_of(
        &self,
        category: &Category,
    ) -> LoadResult<Vec<Arc<ResumeContent>>, SharedStoreError> {
        self.category_contents.load(category.id).await
    }

    pub async fn category_of(
        &self,
        content: &ResumeContent,
    ) -> LoadResult<Option<Arc<Category>>, SharedStoreError> {
        self.content_category.load(content.category_id).await
    }

    /// A project without an owner resolves to `None` without touching the loader.
    pub async fn owner_of(
        &self,
        project: &Project,
    ) -> LoadResult<Option<Arc<User>>, SharedStoreError> {
        match project.user_id {
            Some(user_id) => self.project_user.load(user_id).await,
            None => Ok(None),
        }
    }
}
