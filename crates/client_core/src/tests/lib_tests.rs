use super::*;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde_json::{json, Value};
use shared::domain::ContentType;
use storage::{FileStore, MemoryStore};
use tokio::net::TcpListener;

const EMAIL: &str = "a@x.com";
const PASSWORD: &str = "pw";
const TOKEN: &str = "T1";

#[derive(Clone, Default)]
struct MockApi {
    projects: Arc<Mutex<Vec<Value>>>,
    posts: Arc<Mutex<Vec<Value>>>,
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"detail": message}))).into_response()
}

fn authorized(headers: &HeaderMap) -> Result<(), Response> {
    let expected = format!("Bearer {TOKEN}");
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => Ok(()),
        _ => Err(detail(
            StatusCode::UNAUTHORIZED,
            "Could not validate credentials",
        )),
    }
}

fn me() -> Value {
    json!({"id": 1, "email": EMAIL, "username": "a", "full_name": "Ada", "is_active": true})
}

async fn token(Form(form): Form<HashMap<String, String>>) -> Response {
    let email = form.get("username").map(String::as_str);
    let password = form.get("password").map(String::as_str);
    if email == Some(EMAIL) && password == Some(PASSWORD) {
        Json(json!({"access_token": TOKEN, "token_type": "bearer"})).into_response()
    } else {
        detail(StatusCode::UNAUTHORIZED, "Incorrect email or password")
    }
}

async fn users_me(headers: HeaderMap) -> Response {
    match authorized(&headers) {
        Ok(()) => Json(me()).into_response(),
        Err(rejection) => rejection,
    }
}

async fn create_user(Json(body): Json<Value>) -> Response {
    if body["email"] == EMAIL {
        return detail(StatusCode::BAD_REQUEST, "Email already registered");
    }
    Json(json!({
        "id": 2,
        "email": body["email"],
        "username": body["username"],
        "full_name": body["full_name"],
        "is_active": true
    }))
    .into_response()
}

async fn list_projects(State(api): State<MockApi>, headers: HeaderMap) -> Response {
    if let Err(rejection) = authorized(&headers) {
        return rejection;
    }
    let projects = api.projects.lock().expect("projects lock").clone();
    Json(Value::Array(projects)).into_response()
}

async fn create_project(
    State(api): State<MockApi>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(rejection) = authorized(&headers) {
        return rejection;
    }
    let mut projects = api.projects.lock().expect("projects lock");
    let project = json!({
        "id": projects.len() + 1,
        "title": body["title"],
        "description": body["description"],
        "category": body["category"],
        "owner_id": 1,
        "created_at": "2024-05-01T12:00:00Z",
        "collaborators": []
    });
    projects.push(project.clone());
    Json(project).into_response()
}

async fn fetch_project(
    State(api): State<MockApi>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if let Err(rejection) = authorized(&headers) {
        return rejection;
    }
    let projects = api.projects.lock().expect("projects lock");
    match projects.iter().find(|project| project["id"] == id) {
        Some(project) => Json(project.clone()).into_response(),
        None => detail(StatusCode::NOT_FOUND, "Project not found"),
    }
}

async fn list_posts(
    State(api): State<MockApi>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, i64>>,
) -> Response {
    if let Err(rejection) = authorized(&headers) {
        return rejection;
    }
    let project_id = query.get("project_id").copied();
    let posts: Vec<Value> = api
        .posts
        .lock()
        .expect("posts lock")
        .iter()
        .filter(|post| project_id.is_some_and(|id| post["project_id"] == id))
        .cloned()
        .collect();
    Json(Value::Array(posts)).into_response()
}

async fn create_post(State(api): State<MockApi>, request: Request) -> Response {
    if let Err(rejection) = authorized(request.headers()) {
        return rejection;
    }
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    let mut fields: HashMap<String, String> = HashMap::new();
    let mut media_url = Value::Null;
    if is_multipart {
        let Ok(mut multipart) = Multipart::from_request(request, &()).await else {
            return detail(StatusCode::BAD_REQUEST, "bad multipart");
        };
        while let Ok(Some(field)) = multipart.next_field().await {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let filename = field.file_name().unwrap_or_default().to_string();
                media_url = json!(format!("/uploads/{filename}"));
                let _ = field.bytes().await;
            } else {
                fields.insert(name, field.text().await.unwrap_or_default());
            }
        }
    } else {
        let Ok(Json(body)) = Json::<Value>::from_request(request, &()).await else {
            return detail(StatusCode::BAD_REQUEST, "bad json");
        };
        for key in ["title", "content", "content_type"] {
            fields.insert(key.to_string(), body[key].as_str().unwrap_or_default().to_string());
        }
        fields.insert("project_id".into(), body["project_id"].to_string());
    }

    let mut posts = api.posts.lock().expect("posts lock");
    let project_id: i64 = fields
        .get("project_id")
        .and_then(|v| v.parse().ok())
        .unwrap_or_default();
    let post = json!({
        "id": posts.len() + 1,
        "title": fields.get("title"),
        "content": fields.get("content"),
        "content_type": fields.get("content_type"),
        "project_id": project_id,
        "author_id": 1,
        "media_url": media_url,
    });
    posts.push(post.clone());
    Json(post).into_response()
}

async fn spawn_api() -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new()
        .route("/token", post(token))
        .route("/users/", post(create_user))
        .route("/users/me", get(users_me))
        .route("/projects/", get(list_projects).post(create_project))
        .route("/projects/:id", get(fetch_project))
        .route("/posts/", get(list_posts).post(create_post))
        .with_state(MockApi::default());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn settings(api_url: &str, data_dir: &std::path::Path) -> ClientSettings {
    ClientSettings {
        api_url: api_url.to_string(),
        request_timeout_secs: 5,
        data_dir: data_dir.to_path_buf(),
        ..ClientSettings::default()
    }
}

fn client(api_url: &str, store: Arc<dyn KeyValueStore>) -> PatchClient {
    let dir = std::env::temp_dir();
    PatchClient::new(&settings(api_url, &dir), store).expect("client")
}

#[tokio::test]
async fn resource_calls_require_a_session() {
    let api_url = spawn_api().await;
    let client = client(&api_url, Arc::new(MemoryStore::new()));
    client.initialize().await.expect("initialize");

    let err = client.list_projects().await.expect_err("anonymous");
    assert!(matches!(err, ClientError::NotAuthenticated));
    let err = client
        .create_project(&NewProject::new("P", "d", None))
        .await
        .expect_err("anonymous");
    assert!(matches!(err, ClientError::NotAuthenticated));
}

#[tokio::test]
async fn invalid_api_url_is_a_settings_error() {
    let result = PatchClient::new(
        &settings("ftp://nowhere", &std::env::temp_dir()),
        Arc::new(MemoryStore::new()),
    );
    assert!(matches!(result, Err(ClientError::Settings(_))));
}

#[tokio::test]
async fn register_login_and_work_with_projects() {
    let api_url = spawn_api().await;
    let store = MemoryStore::new();
    let client = client(&api_url, Arc::new(store.clone()));

    assert_eq!(
        client.initialize().await.expect("initialize").status(),
        SessionStatus::Anonymous
    );

    let created = client
        .register(&Registration::new("bob", "bob@x.com", "secret"))
        .await
        .expect("register");
    assert_eq!(created.username, "bob");
    assert_eq!(created.full_name.as_deref(), Some(""));
    assert_eq!(client.snapshot().status(), SessionStatus::Anonymous);

    let taken = client
        .register(&Registration::new("a", EMAIL, "pw"))
        .await
        .expect_err("duplicate email");
    assert!(matches!(
        taken,
        ClientError::RequestFailed { operation: Operation::Register, status: 400, ref message }
            if message == "Email already registered"
    ));

    let rejected = client
        .login(&LoginCredentials::new(EMAIL, "wrong"))
        .await
        .expect_err("bad password");
    assert!(rejected.is_unauthorized());
    assert!(rejected.to_string().contains("Incorrect email or password"));

    let identity = client
        .login(&LoginCredentials::new(EMAIL, PASSWORD))
        .await
        .expect("login");
    assert_eq!(identity.full_name.as_deref(), Some("Ada"));
    assert_eq!(client.snapshot().token(), Some(TOKEN));
    assert_eq!(store.get("token").expect("get").as_deref(), Some(TOKEN));

    let project = client
        .create_project(&NewProject::new("Bridge", "steel", None))
        .await
        .expect("create project");
    assert_eq!(project.category(), Some("other"));
    assert!(project.fields.contains_key("collaborators"));

    let listed = client.list_projects().await.expect("list projects");
    assert_eq!(listed, vec![project.clone()]);
    assert_eq!(
        client.fetch_project(project.id).await.expect("fetch project"),
        project
    );

    let missing = client
        .fetch_project(ProjectId(99))
        .await
        .expect_err("missing project");
    assert_eq!(missing.status(), Some(404));

    let text = client
        .create_post(PostDraft::new(project.id, "Notes", "first", ContentType::Document))
        .await
        .expect("text post");
    assert_eq!(text.content_type(), Some("document"));
    assert_eq!(text.media_url(), None);

    let photo = client
        .create_post(
            PostDraft::new(project.id, "Photo", "", ContentType::Image).with_attachment(
                Attachment {
                    filename: "site.png".into(),
                    mime_type: Some("image/png".into()),
                    bytes: b"png".to_vec(),
                },
            ),
        )
        .await
        .expect("photo post");
    assert_eq!(photo.media_url(), Some("/uploads/site.png"));
    assert_eq!(photo.project_id(), Some(project.id));

    let posts = client.list_posts(project.id).await.expect("list posts");
    assert_eq!(posts, vec![text, photo]);
    assert!(client
        .list_posts(ProjectId(99))
        .await
        .expect("empty list")
        .is_empty());

    client.logout();
    assert!(!store.contains("token"));
    assert!(matches!(
        client.list_projects().await,
        Err(ClientError::NotAuthenticated)
    ));
}

#[tokio::test]
async fn session_survives_restart_with_file_store() {
    let api_url = spawn_api().await;
    let dir = tempfile::tempdir().expect("tempdir");

    let first = client(&api_url, Arc::new(FileStore::new(dir.path())));
    first.initialize().await.expect("initialize");
    let identity = first
        .login(&LoginCredentials::new(EMAIL, PASSWORD))
        .await
        .expect("login");
    drop(first);

    let second = client(&api_url, Arc::new(FileStore::new(dir.path())));
    let restored = second.initialize().await.expect("restore");

    assert_eq!(restored.status(), SessionStatus::Authenticated);
    assert_eq!(restored.identity(), Some(&identity));
    assert_eq!(second.list_projects().await.expect("list"), Vec::new());
}

#[tokio::test]
async fn revoked_token_is_dropped_on_restart() {
    let api_url = spawn_api().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStore::new(dir.path());
    store.set("token", "revoked").expect("seed token");

    let client = client(&api_url, Arc::new(FileStore::new(dir.path())));
    let err = client.initialize().await.expect_err("revoked");

    assert!(err.is_unauthorized());
    assert_eq!(client.snapshot().status(), SessionStatus::Anonymous);
    assert_eq!(store.get("token").expect("get"), None);
}
