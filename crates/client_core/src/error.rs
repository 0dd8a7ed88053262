use std::fmt;

use storage::StorageError;
use thiserror::Error;

use crate::{config::SettingsError, transport::TransportError};

/// Named API operation, used to pick fallback error messages and to label
/// failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Authenticate,
    Register,
    FetchIdentity,
    ListProjects,
    FetchProject,
    CreateProject,
    ListPosts,
    CreatePost,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Self::Authenticate => "authenticate",
            Self::Register => "register",
            Self::FetchIdentity => "fetch_identity",
            Self::ListProjects => "list_projects",
            Self::FetchProject => "fetch_project",
            Self::CreateProject => "create_project",
            Self::ListPosts => "list_posts",
            Self::CreatePost => "create_post",
        }
    }

    /// Message shown when the server gives no usable `detail`.
    pub fn default_message(self) -> &'static str {
        match self {
            Self::Authenticate => "Login failed",
            Self::Register => "Registration failed",
            Self::FetchIdentity => "Failed to fetch user data",
            Self::ListProjects => "Failed to fetch projects",
            Self::FetchProject => "Failed to fetch project",
            Self::CreateProject => "Failed to create project",
            Self::ListPosts => "Failed to fetch posts",
            Self::CreatePost => "Failed to create post",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("{operation} failed with status {status}: {message}")]
    RequestFailed {
        operation: Operation,
        status: u16,
        message: String,
    },
    #[error("a login is already in progress")]
    SessionBusy,
    #[error("not logged in")]
    NotAuthenticated,
    #[error("session was logged out before the attempt completed")]
    Superseded,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("token storage failed: {0}")]
    Storage(#[from] StorageError),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

impl From<TransportError> for ClientError {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::Network(message) => Self::Network(message),
            TransportError::InvalidRequest(message) | TransportError::Setup(message) => {
                Self::InvalidRequest(message)
            }
        }
    }
}
