//! Session and authenticated API gateway for the Patch-Project client.
//!
//! - [`transport`]: one HTTP attempt per call, status and raw body back.
//! - [`codec`]: form / JSON / multipart bodies, JSON decoding, `{detail}` errors.
//! - [`gateway`]: named API operations; tokens are passed in.
//! - [`session`]: login/logout/restore state machine over a persisted token.
//!
//! [`PatchClient`] wires them together for UI code.

use std::sync::Arc;

use shared::{
    domain::{Identity, Post, Project, ProjectId},
    protocol::NewProject,
};
use storage::KeyValueStore;
use tokio::sync::watch;

pub mod codec;
pub mod config;
pub mod error;
pub mod gateway;
pub mod session;
pub mod transport;
pub mod types;

pub use config::{load_settings, ClientSettings};
pub use error::{ClientError, Operation};
pub use gateway::ApiGateway;
pub use session::{Session, SessionController, SessionStatus};
pub use transport::{HttpTransport, Transport};
pub use types::{Attachment, LoginCredentials, PostDraft, Registration};

/// Gateway plus session controller, with resource calls that use the current
/// session's token.
pub struct PatchClient {
    gateway: Arc<ApiGateway>,
    session: SessionController,
}

impl PatchClient {
    pub fn new(
        settings: &ClientSettings,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, ClientError> {
        let base_url = settings.api_base_url()?;
        let transport = HttpTransport::new(&base_url, settings.request_timeout())?;
        Ok(Self::with_transport(
            Arc::new(transport),
            store,
            settings.token_key.clone(),
        ))
    }

    pub fn with_transport(
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
        token_key: impl Into<String>,
    ) -> Self {
        let gateway = Arc::new(ApiGateway::new(transport));
        let session = SessionController::new(Arc::clone(&gateway), store, token_key);
        Self { gateway, session }
    }

    pub fn gateway(&self) -> &ApiGateway {
        &self.gateway
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn snapshot(&self) -> Session {
        self.session.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    pub async fn initialize(&self) -> Result<Session, ClientError> {
        self.session.initialize().await
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> Result<Identity, ClientError> {
        self.session.login(credentials).await
    }

    pub async fn register(&self, registration: &Registration) -> Result<Identity, ClientError> {
        self.session.register(registration).await
    }

    pub fn logout(&self) {
        self.session.logout();
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, ClientError> {
        let token = self.require_token()?;
        self.gateway.list_projects(&token).await
    }

    pub async fn fetch_project(&self, project_id: ProjectId) -> Result<Project, ClientError> {
        let token = self.require_token()?;
        self.gateway.fetch_project(&token, project_id).await
    }

    pub async fn create_project(&self, project: &NewProject) -> Result<Project, ClientError> {
        let token = self.require_token()?;
        self.gateway.create_project(&token, project).await
    }

    pub async fn list_posts(&self, project_id: ProjectId) -> Result<Vec<Post>, ClientError> {
        let token = self.require_token()?;
        self.gateway.list_posts(&token, project_id).await
    }

    pub async fn create_post(&self, draft: PostDraft) -> Result<Post, ClientError> {
        let token = self.require_token()?;
        self.gateway.create_post(&token, draft).await
    }

    fn require_token(&self) -> Result<String, ClientError> {
        self.session.token().ok_or(ClientError::NotAuthenticated)
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
