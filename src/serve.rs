use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use base64::Engine;
use dashmap::DashMap;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc as StdArc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::auth::{Session, SessionStore};
use crate::backend::{Backend, Row};
use crate::config::AdminConfig;
use crate::credentials::Credentials;
use crate::editor::{RecordEditor, SubmitOutcome};
use crate::error::AdminError;
use crate::media::{delete_with_media, sweep_media};
use crate::relocate::LocalFile;
use crate::repository::{PageRequest, Repository};
use crate::resources::{Resource, ResourceSpec};

/// Shared state of the admin API
pub struct AppState {
    pub backend: Backend,
    pub sessions: SessionStore,
    /// Submissions in progress, keyed by session token and resource
    in_flight: DashMap<String, ()>,
    pub page_size: u32,
}

impl AppState {
    pub fn new(backend: Backend, page_size: u32) -> Self {
        Self {
            backend,
            sessions: SessionStore::new(),
            in_flight: DashMap::new(),
            page_size,
        }
    }

    /// Replace the session store with one whose tokens expire after `ttl`
    pub fn with_session_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.sessions = SessionStore::with_ttl(ttl);
        self
    }

    fn repository(&self, spec: &'static ResourceSpec) -> Repository {
        Repository::new(self.backend.tables.clone(), spec)
    }
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Map a failure to its status code; backend detail only goes to the log
fn error_response(err: &AdminError, operation: &str) -> Response {
    let status = match err {
        AdminError::Validation(_) => StatusCode::BAD_REQUEST,
        AdminError::Auth(_) => StatusCode::UNAUTHORIZED,
        AdminError::NotFound { .. } => StatusCode::NOT_FOUND,
        AdminError::Busy => StatusCode::CONFLICT,
        _ => StatusCode::BAD_GATEWAY,
    };
    if status == StatusCode::BAD_GATEWAY {
        error!("Failed to {}: {}", operation, err);
    } else {
        warn!("Failed to {}: {}", operation, err);
    }
    error_body(status, err.user_message(operation))
}

/// Signed-in admin resolved from `Authorization: Bearer <token>`
pub struct AdminSession {
    pub token: String,
    pub session: Session,
}

impl FromRequestParts<StdArc<AppState>> for AdminSession {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &StdArc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .ok_or_else(|| error_body(StatusCode::UNAUTHORIZED, "Not signed in"))?;

        let session = state
            .sessions
            .get(&token)
            .ok_or_else(|| error_body(StatusCode::UNAUTHORIZED, "Session expired, sign in again"))?;
        Ok(Self { token, session })
    }
}

/// Marks one submission in flight; released on drop
struct InFlight<'a> {
    map: &'a DashMap<String, ()>,
    key: String,
}

impl<'a> InFlight<'a> {
    fn acquire(map: &'a DashMap<String, ()>, token: &str, resource: &str) -> Option<Self> {
        let key = format!("{}:{}", token, resource);
        match map.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Some(Self { map, key })
            }
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: String,
    pub email: String,
}

async fn login_handler(
    State(state): State<StdArc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Response {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "Email and password are required");
    }
    match state.backend.sign_in(request.email.trim(), &request.password).await {
        Ok(session) => {
            info!("Admin {} signed in", session.email);
            let response = LoginResponse {
                user_id: session.user_id.clone(),
                email: session.email.clone(),
                token: state.sessions.open(session),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => error_response(&e, "sign in"),
    }
}

async fn logout_handler(State(state): State<StdArc<AppState>>, admin: AdminSession) -> Response {
    state.sessions.close(&admin.token);
    info!("Admin {} signed out", admin.session.email);
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Deserialize, Default)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// Value for the screen's filter column
    pub filter: Option<String>,
    /// Alias of `filter` on the learning screen
    pub category: Option<String>,
    pub sort: Option<String>,
    pub ascending: Option<bool>,
}

impl ListQuery {
    fn to_request(&self, spec: &ResourceSpec, default_page_size: u32) -> PageRequest {
        let mut request = PageRequest::new(
            self.page.unwrap_or(1),
            self.page_size.unwrap_or(default_page_size),
        );
        let value = self
            .filter
            .as_deref()
            .or(self.category.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let (Some(value), Some((column, mode))) = (value, spec.filter) {
            request = request.with_filter(column, value, mode);
        }
        if let Some(sort) = &self.sort {
            request = request.with_sort(sort, self.ascending.unwrap_or(true));
        }
        request
    }
}

async fn list_handler(
    State(state): State<StdArc<AppState>>,
    _admin: AdminSession,
    Path(resource): Path<Resource>,
    Query(query): Query<ListQuery>,
) -> Response {
    let spec = resource.spec();
    let request = query.to_request(spec, state.page_size);
    match state.repository(spec).list(&request).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => error_response(&e, &format!("fetch {}", spec.name)),
    }
}

/// File field payload of a create or update request
#[derive(Deserialize)]
struct FilePayload {
    file_name: String,
    #[serde(default)]
    content_type: Option<String>,
    data_base64: String,
}

/// Apply a JSON body to an open editor
fn apply_payload(editor: &mut RecordEditor, body: &Row) -> Result<(), AdminError> {
    let spec = editor.spec();
    for (name, value) in body {
        let field = spec.field(name).ok_or_else(|| {
            AdminError::Validation(format!("{} has no field '{}'", spec.name, name))
        })?;
        if !field.is_file() {
            editor.set_json(name, value)?;
            continue;
        }
        match value {
            Value::Null => editor.clear_field(name)?,
            Value::Object(_) => {
                let payload: FilePayload = serde_json::from_value(value.clone()).map_err(|e| {
                    AdminError::Validation(format!("{}: invalid file payload: {}", field.label, e))
                })?;
                let data = base64::engine::general_purpose::STANDARD
                    .decode(payload.data_base64.as_bytes())
                    .map_err(|e| {
                        AdminError::Validation(format!("{}: invalid base64 data: {}", field.label, e))
                    })?;
                let content_type = payload
                    .content_type
                    .unwrap_or_else(|| crate::relocate::guess_content_type(&payload.file_name).to_string());
                editor.set_file(name, LocalFile::new(payload.file_name, content_type, data))?;
            }
            _ => {
                return Err(AdminError::Validation(format!(
                    "{} expects a file object",
                    field.label
                )))
            }
        }
    }
    Ok(())
}

async fn submit(
    state: &AppState,
    admin: &AdminSession,
    spec: &'static ResourceSpec,
    id: Option<i64>,
    body: &Row,
) -> Result<SubmitOutcome, AdminError> {
    let _guard = InFlight::acquire(&state.in_flight, &admin.token, spec.name)
        .ok_or(AdminError::Busy)?;

    let repo = state.repository(spec);
    let mut editor = RecordEditor::new(spec);
    match id {
        Some(id) => {
            let row = repo.get(id).await?;
            editor.open_existing(&row)?;
        }
        None => editor.open_new()?,
    }
    apply_payload(&mut editor, body)?;
    editor
        .submit(&repo, state.backend.objects.as_ref(), &state.backend.buckets)
        .await
}

async fn create_handler(
    State(state): State<StdArc<AppState>>,
    admin: AdminSession,
    Path(resource): Path<Resource>,
    Json(body): Json<Row>,
) -> Response {
    let spec = resource.spec();
    match submit(&state, &admin, spec, None, &body).await {
        Ok(SubmitOutcome::Created(row)) => {
            info!("[{}] {} added a {}", spec.name, admin.session.email, spec.noun);
            (StatusCode::CREATED, Json(row)).into_response()
        }
        Ok(SubmitOutcome::Updated(id)) => (StatusCode::OK, Json(json!({ "id": id }))).into_response(),
        Err(e) => error_response(&e, &format!("add {}", spec.noun)),
    }
}

async fn update_handler(
    State(state): State<StdArc<AppState>>,
    admin: AdminSession,
    Path((resource, id)): Path<(Resource, i64)>,
    Json(body): Json<Row>,
) -> Response {
    let spec = resource.spec();
    match submit(&state, &admin, spec, Some(id), &body).await {
        Ok(_) => {
            info!("[{}] {} updated id {}", spec.name, admin.session.email, id);
            (StatusCode::OK, Json(json!({ "id": id }))).into_response()
        }
        Err(e) => error_response(&e, &format!("update {}", spec.noun)),
    }
}

async fn delete_handler(
    State(state): State<StdArc<AppState>>,
    admin: AdminSession,
    Path((resource, id)): Path<(Resource, i64)>,
) -> Response {
    let spec = resource.spec();
    let repo = state.repository(spec);
    let result = if spec.delete_media {
        delete_with_media(&repo, state.backend.objects.as_ref(), &state.backend.buckets, id)
            .await
            .map(|_| ())
    } else {
        repo.delete(id).await
    };
    match result {
        Ok(()) => {
            info!("[{}] {} deleted id {}", spec.name, admin.session.email, id);
            (StatusCode::OK, Json(json!({ "deleted": id }))).into_response()
        }
        Err(e) => error_response(&e, &format!("delete {}", spec.noun)),
    }
}

#[derive(Deserialize)]
struct SweepQuery {
    #[serde(default)]
    dry_run: bool,
}

async fn sweep_handler(
    State(state): State<StdArc<AppState>>,
    admin: AdminSession,
    Query(query): Query<SweepQuery>,
) -> Response {
    info!("{} started a media sweep (dry_run={})", admin.session.email, query.dry_run);
    match sweep_media(&state.backend, query.dry_run).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => error_response(&e, "sweep media"),
    }
}

/// Build the admin router; local backends also serve their buckets under /media
pub fn router(state: StdArc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/login", post(login_handler))
        .route("/api/logout", post(logout_handler))
        .route("/api/media/sweep", post(sweep_handler))
        .route("/api/{resource}", get(list_handler).post(create_handler))
        .route("/api/{resource}/{id}", put(update_handler).delete(delete_handler));

    if let Some(dir) = &state.backend.media_dir {
        app = app.nest_service("/media", ServeDir::new(dir));
    }

    app.layer(cors).with_state(state)
}

/// Run the admin API until the process is stopped
pub async fn serve(
    config: AdminConfig,
    credentials: Option<Credentials>,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = Backend::connect(&config, &credentials)
        .await
        .map_err(|e| format!("Failed to connect backend: {}", e))?;
    let local = backend.media_dir.is_some();
    let state = StdArc::new(
        AppState::new(backend, config.page_size)
            .with_session_ttl(std::time::Duration::from_secs(config.session_ttl_minutes * 60)),
    );
    let app = router(state);

    let port = config.port;
    println!("Listening on: http://[::]:{} (IPv4 + IPv6)", port);
    println!("Sessions expire after {} minute(s)", config.session_ttl_minutes);
    println!("Endpoints:");
    println!("  GET    /health");
    println!("  POST   /api/login  - {{email, password}} -> bearer token");
    println!("  POST   /api/logout");
    println!("  GET    /api/{{users|learning|practice}}?page=&page_size=&filter=&sort=&ascending=");
    println!("  POST   /api/{{learning|practice}}");
    println!("  PUT    /api/{{learning|practice}}/:id");
    println!("  DELETE /api/{{learning|practice}}/:id");
    println!("  POST   /api/media/sweep?dry_run=true");
    if local {
        println!("  GET    /media/:bucket/public/:name  - stored media");
    }

    let listener = tokio::net::TcpListener::bind(format!("[::]:{}", port))
        .await
        .map_err(|e| format!("Failed to bind to port {}: {}", port, e))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("Server error: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::FilterMode;
    use crate::resources::{LEARNING, USERS};

    #[test]
    fn test_list_query_category_alias() {
        let query = ListQuery {
            category: Some("animals".to_string()),
            sort: Some("label".to_string()),
            ascending: Some(false),
            ..ListQuery::default()
        };
        let request = query.to_request(&LEARNING, 5);
        let filter = request.filter.unwrap();
        assert_eq!(filter.column, "category");
        assert_eq!(filter.mode, FilterMode::Equals);
        assert_eq!(request.sort.unwrap().ascending, false);
        assert_eq!((request.page, request.page_size), (1, 5));
    }

    #[test]
    fn test_blank_filter_is_ignored() {
        let query = ListQuery {
            filter: Some("  ".to_string()),
            ..ListQuery::default()
        };
        assert!(query.to_request(&USERS, 5).filter.is_none());
    }

    #[test]
    fn test_in_flight_guard_releases_on_drop() {
        let map = DashMap::new();
        let first = InFlight::acquire(&map, "tok", "practice");
        assert!(first.is_some());
        assert!(InFlight::acquire(&map, "tok", "practice").is_none());
        assert!(InFlight::acquire(&map, "tok", "learning").is_some());
        drop(first);
        assert!(InFlight::acquire(&map, "tok", "practice").is_some());
    }
}
