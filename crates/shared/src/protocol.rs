use serde::{Deserialize, Serialize};

use crate::domain::{ContentType, ProjectId};

pub const DEFAULT_PROJECT_CATEGORY: &str = "other";

/// Known project categories. The API accepts any string; these are the ones
/// the web client offered.
pub const PROJECT_CATEGORIES: &[&str] = &["comics", "animation", "novel", "script", "ai", "other"];

/// Body of a successful `POST /token`.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub category: String,
}

impl NewProject {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        category: Option<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            category: category
                .filter(|category| !category.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PROJECT_CATEGORY.to_string()),
        }
    }
}

/// JSON body of `POST /posts/` when no file is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub content_type: ContentType,
    pub project_id: ProjectId,
}
