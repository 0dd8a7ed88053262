use std::sync::Arc;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{Identity, Post, Project, ProjectId},
    protocol::{NewPost, NewProject, TokenResponse},
};
use tracing::{debug, warn};

use crate::{
    codec,
    error::{ClientError, Operation},
    transport::{FilePart, Transport, TransportRequest},
    types::{LoginCredentials, PostDraft, Registration},
};

const ATTACHMENT_FIELD: &str = "file";

#[derive(Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    username: &'a str,
    password: &'a str,
    full_name: &'a str,
}

/// Stateless mapping from named API operations to wire requests.
///
/// Tokens are passed in by the caller; the gateway never reads session state.
pub struct ApiGateway {
    transport: Arc<dyn Transport>,
}

impl ApiGateway {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Exchanges credentials for a bearer token.
    pub async fn authenticate(&self, credentials: &LoginCredentials) -> Result<String, ClientError> {
        let request = TransportRequest::post("/token").with_body(codec::encode_credentials(
            credentials.email(),
            credentials.password(),
        ));
        let response: TokenResponse = self.execute(Operation::Authenticate, request).await?;
        Ok(response.access_token)
    }

    pub async fn register(&self, registration: &Registration) -> Result<Identity, ClientError> {
        let body = codec::encode_json(&RegisterRequest {
            email: &registration.email,
            username: &registration.username,
            password: registration.password(),
            full_name: registration.full_name.as_deref().unwrap_or_default(),
        })
        .map_err(invalid_request)?;
        let request = TransportRequest::post("/users/").with_body(body);
        self.execute(Operation::Register, request).await
    }

    pub async fn fetch_identity(&self, token: &str) -> Result<Identity, ClientError> {
        let request = authorized(TransportRequest::get("/users/me"), token)?;
        self.execute(Operation::FetchIdentity, request).await
    }

    pub async fn list_projects(&self, token: &str) -> Result<Vec<Project>, ClientError> {
        let request = authorized(TransportRequest::get("/projects/"), token)?;
        self.execute(Operation::ListProjects, request).await
    }

    pub async fn fetch_project(
        &self,
        token: &str,
        project_id: ProjectId,
    ) -> Result<Project, ClientError> {
        let request = authorized(TransportRequest::get(format!("/projects/{project_id}")), token)?;
        self.execute(Operation::FetchProject, request).await
    }

    pub async fn create_project(
        &self,
        token: &str,
        project: &NewProject,
    ) -> Result<Project, ClientError> {
        let body = codec::encode_json(project).map_err(invalid_request)?;
        let request = authorized(TransportRequest::post("/projects/").with_body(body), token)?;
        self.execute(Operation::CreateProject, request).await
    }

    pub async fn list_posts(
        &self,
        token: &str,
        project_id: ProjectId,
    ) -> Result<Vec<Post>, ClientError> {
        let request = authorized(
            TransportRequest::get("/posts/").with_query("project_id", project_id.to_string()),
            token,
        )?;
        self.execute(Operation::ListPosts, request).await
    }

    /// Sends multipart when the draft carries an attachment, JSON otherwise.
    pub async fn create_post(&self, token: &str, draft: PostDraft) -> Result<Post, ClientError> {
        let PostDraft {
            title,
            content,
            content_type,
            project_id,
            attachment,
        } = draft;

        let body = match attachment {
            Some(attachment) => codec::encode_multipart(
                vec![
                    ("title".to_string(), title),
                    ("content".to_string(), content),
                    ("content_type".to_string(), content_type.to_string()),
                    ("project_id".to_string(), project_id.to_string()),
                ],
                Some(FilePart {
                    field_name: ATTACHMENT_FIELD.to_string(),
                    filename: attachment.filename,
                    mime_type: attachment.mime_type,
                    bytes: attachment.bytes,
                }),
            ),
            None => codec::encode_json(&NewPost {
                title,
                content,
                content_type,
                project_id,
            })
            .map_err(invalid_request)?,
        };
        let request = authorized(TransportRequest::post("/posts/").with_body(body), token)?;
        self.execute(Operation::CreatePost, request).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: Operation,
        request: TransportRequest,
    ) -> Result<T, ClientError> {
        let response = self.transport.send(request).await.map_err(|err| {
            warn!(%operation, error = %err, "gateway: transport failure");
            ClientError::from(err)
        })?;

        let status = response.status;
        if !status.is_success() {
            let message = codec::extract_error_message(operation, status, &response.body);
            warn!(%operation, status = status.as_u16(), %message, "gateway: request rejected");
            return Err(ClientError::RequestFailed {
                operation,
                status: status.as_u16(),
                message,
            });
        }

        debug!(%operation, status = status.as_u16(), "gateway: request succeeded");
        codec::decode(&response.body).map_err(|err| {
            warn!(%operation, error = %err, "gateway: undecodable success payload");
            ClientError::RequestFailed {
                operation,
                status: status.as_u16(),
                message: operation.default_message().to_string(),
            }
        })
    }
}

fn authorized(mut request: TransportRequest, token: &str) -> Result<TransportRequest, ClientError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| ClientError::InvalidRequest("bearer token is not a valid header value".into()))?;
    value.set_sensitive(true);
    request.headers.insert(AUTHORIZATION, value);
    Ok(request)
}

fn invalid_request(err: codec::CodecError) -> ClientError {
    ClientError::InvalidRequest(err.to_string())
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
