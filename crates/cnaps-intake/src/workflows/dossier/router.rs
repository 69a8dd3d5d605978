use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use super::domain::{DocumentCategory, DossierId, DossierStatus, DossierSubmission, Upload};
use super::notify::Notifier;
use super::repository::DossierRepository;
use super::service::{DossierService, DossierServiceError, ValidationError};

/// Shared state for the dossier routes: the lifecycle service plus the
/// reviewer shared secret. An empty secret leaves the admin routes open,
/// which is the development default.
pub struct DossierRouterState<R, N> {
    service: Arc<DossierService<R, N>>,
    admin_token: String,
}

impl<R, N> Clone for DossierRouterState<R, N> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            admin_token: self.admin_token.clone(),
        }
    }
}

/// Router builder exposing the submission form backend and the reviewer
/// operations.
pub fn dossier_router<R, N>(
    service: Arc<DossierService<R, N>>,
    admin_token: String,
) -> Router
where
    R: DossierRepository + 'static,
    N: Notifier + 'static,
{
    let state = DossierRouterState {
        service,
        admin_token,
    };
    Router::new()
        .route("/submit", post(submit_handler::<R, N>))
        .route("/admin", get(admin_list_handler::<R, N>))
        .route("/set_status", post(set_status_handler::<R, N>))
        .route("/save_comment", post(save_comment_handler::<R, N>))
        .route("/delete", post(delete_handler::<R, N>))
        .route("/download", post(download_handler::<R, N>))
        .route("/check_status", post(check_status_handler::<R, N>))
        .route("/reset", post(reset_handler::<R, N>))
        .route("/uploads/:name", get(upload_handler::<R, N>))
        // scanned identity documents are routinely above axum's 2 MiB default
        .layer(DefaultBodyLimit::max(25 * 1024 * 1024))
        .with_state(state)
}

fn authorized<R, N>(state: &DossierRouterState<R, N>, headers: &HeaderMap) -> bool {
    if state.admin_token.is_empty() {
        return true;
    }
    headers
        .get("x-admin-token")
        .and_then(|value| value.to_str().ok())
        == Some(state.admin_token.as_str())
}

fn unauthorized() -> Response {
    let payload = json!({ "error": "missing or invalid admin token" });
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}

fn error_response(error: DossierServiceError) -> Response {
    let status = match &error {
        DossierServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DossierServiceError::NotFound => StatusCode::NOT_FOUND,
        DossierServiceError::Repository(_) | DossierServiceError::Documents(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = json!({ "error": error.to_string() });
    (status, Json(payload)).into_response()
}

pub(crate) async fn submit_handler<R, N>(
    State(state): State<DossierRouterState<R, N>>,
    mut multipart: Multipart,
) -> Response
where
    R: DossierRepository + 'static,
    N: Notifier + 'static,
{
    let mut submission = DossierSubmission {
        last_name: String::new(),
        first_name: String::new(),
        email: String::new(),
        formation: None,
        session: None,
        cnaps_link: None,
        uploads: Vec::new(),
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                let payload = json!({ "error": format!("malformed form data: {err}") });
                return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
            }
        };
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "nom" => submission.last_name = field.text().await.unwrap_or_default(),
            "prenom" => submission.first_name = field.text().await.unwrap_or_default(),
            "email" => submission.email = field.text().await.unwrap_or_default(),
            "formation" => submission.formation = Some(field.text().await.unwrap_or_default()),
            "session" => submission.session = Some(field.text().await.unwrap_or_default()),
            "lien" => submission.cnaps_link = Some(field.text().await.unwrap_or_default()),
            other => {
                let Some(category) = DocumentCategory::from_label(other) else {
                    continue;
                };
                let original_filename = field
                    .file_name()
                    .unwrap_or("document")
                    .to_string();
                let bytes = match field.bytes().await {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        let payload =
                            json!({ "error": format!("upload could not be read: {err}") });
                        return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
                    }
                };
                // browsers send an empty part for file inputs left blank
                if bytes.is_empty() {
                    continue;
                }
                submission.uploads.push(Upload {
                    category,
                    original_filename,
                    bytes: bytes.to_vec(),
                });
            }
        }
    }

    match state.service.submit(submission).await {
        Ok(dossier) => (StatusCode::CREATED, Json(dossier.view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn admin_list_handler<R, N>(
    State(state): State<DossierRouterState<R, N>>,
    headers: HeaderMap,
) -> Response
where
    R: DossierRepository + 'static,
    N: Notifier + 'static,
{
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    match state.service.list_for_admin() {
        Ok(dossiers) => {
            let views: Vec<_> = dossiers.iter().map(|d| d.view()).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusRequest {
    pub(crate) id: u64,
    pub(crate) status: String,
    #[serde(default)]
    pub(crate) comment: Option<String>,
}

pub(crate) async fn set_status_handler<R, N>(
    State(state): State<DossierRouterState<R, N>>,
    headers: HeaderMap,
    Json(request): Json<StatusRequest>,
) -> Response
where
    R: DossierRepository + 'static,
    N: Notifier + 'static,
{
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    let Some(status) = DossierStatus::from_label(&request.status) else {
        return error_response(ValidationError::UnknownStatus(request.status).into());
    };
    match state
        .service
        .set_status(DossierId(request.id), status, request.comment)
        .await
    {
        Ok(dossier) => (StatusCode::OK, Json(dossier.view())).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentRequest {
    pub(crate) id: u64,
    pub(crate) comment: String,
}

pub(crate) async fn save_comment_handler<R, N>(
    State(state): State<DossierRouterState<R, N>>,
    headers: HeaderMap,
    Json(request): Json<CommentRequest>,
) -> Response
where
    R: DossierRepository + 'static,
    N: Notifier + 'static,
{
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    match state
        .service
        .set_comment(DossierId(request.id), request.comment)
    {
        Ok(dossier) => (StatusCode::OK, Json(dossier.view())).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct IdRequest {
    pub(crate) id: u64,
}

pub(crate) async fn delete_handler<R, N>(
    State(state): State<DossierRouterState<R, N>>,
    headers: HeaderMap,
    Json(request): Json<IdRequest>,
) -> Response
where
    R: DossierRepository + 'static,
    N: Notifier + 'static,
{
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    match state.service.remove(DossierId(request.id)) {
        Ok(deleted) => (StatusCode::OK, Json(json!({ "deleted": deleted }))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn download_handler<R, N>(
    State(state): State<DossierRouterState<R, N>>,
    headers: HeaderMap,
    Json(request): Json<IdRequest>,
) -> Response
where
    R: DossierRepository + 'static,
    N: Notifier + 'static,
{
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    match state.service.archive(DossierId(request.id)) {
        Ok((name, bytes)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/zip".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{name}\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn check_status_handler<R, N>(
    State(state): State<DossierRouterState<R, N>>,
    headers: HeaderMap,
    Json(request): Json<IdRequest>,
) -> Response
where
    R: DossierRepository + 'static,
    N: Notifier + 'static,
{
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    match state.service.refresh_cnaps(DossierId(request.id)).await {
        Ok(dossier) => (StatusCode::OK, Json(dossier.view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reset_handler<R, N>(
    State(state): State<DossierRouterState<R, N>>,
    headers: HeaderMap,
) -> Response
where
    R: DossierRepository + 'static,
    N: Notifier + 'static,
{
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    match state.service.purge_all() {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "reset" }))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn upload_handler<R, N>(
    State(state): State<DossierRouterState<R, N>>,
    Path(name): Path<String>,
) -> Response
where
    R: DossierRepository + 'static,
    N: Notifier + 'static,
{
    let Some(path) = state.service.upload_path(&name) else {
        let payload = json!({ "error": "no such file" });
        return (StatusCode::NOT_FOUND, Json(payload)).into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, mime.as_ref().to_string())],
                bytes,
            )
                .into_response()
        }
        Err(_) => {
            let payload = json!({ "error": "no such file" });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
    }
}
