use std::sync::Arc;

use futures::future;
use portfolio_loader::model::{Category, Project, ResumeContent, User, UserRole};
use portfolio_loader::store::MemoryStore;
use portfolio_loader::{CancellationToken, LoaderConfig, Loaders};
use tracing_subscriber::EnvFilter;

// Resolves the owner of every project the way a GraphQL resolver would, one `owner_of` call per
// project, and shows that the store only sees a single query. Run with RUST_LOG=debug to watch
// the batch windows.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let store = Arc::new(MemoryStore::new());
    for (id, name) in [(1, "Ada"), (2, "Grace")] {
        store
            .insert_user(User {
                id,
                name: name.to_owned(),
                email: format!("{}@example.com", name.to_lowercase()),
                role: UserRole::Admin,
                is_active: true,
            })
            .await;
    }
    let projects = (1..=6)
        .map(|id| Project {
            id,
            title: format!("project {}", id),
            description: String::new(),
            user_id: Some(id % 2 + 1),
        })
        .collect::<Vec<_>>();
    let experience_category =
        Category { id: 1, name: "Experience".to_owned(), description: String::new() };
    store.insert_category(experience_category).await;
    store
        .insert_resume_content(ResumeContent {
            id: 1,
            title: "Backend engineer".to_owned(),
            description: String::new(),
            detail: String::new(),
            category_id: 1,
        })
        .await;

    // One registry per request.
    let request = CancellationToken::new();
    let loaders = Loaders::new(store.clone(), LoaderConfig::default(), &request);

    let owners = future::join_all(projects.iter().map(|p| loaders.owner_of(p))).await;
    for (project, owner) in projects.iter().zip(owners) {
        let owner = owner.ok().flatten().map(|u| u.name.clone());
        println!("{} -> {}", project.title, owner.as_deref().unwrap_or("<none>"));
    }

    let experience = loaders.category_contents.load(1).await.unwrap_or_default();
    println!("Experience has {} entries", experience.len());
    assert_eq!(loaders.category_contents.load(2).await.map(|c| c.len()), Ok(0));

    println!("store queries: {}", store.query_count());
}
