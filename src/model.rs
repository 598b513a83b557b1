//! Rows of the portfolio store that the relationship loaders hand out.

pub type Id = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserRole {
    Admin,
    Editor,
    Viewer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: Id,
    pub title: String,
    pub description: String,
    /// Projects may outlive their owner.
    pub user_id: Option<Id>,
}

/// A resume section, e.g. "Experience" or "Education".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: Id,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeContent {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub detail: String,
    pub category_id: Id,
}
