use std::sync::Arc;
use actix_web::{web, HttpResponse};
use actix_multipart::Multipart;
use futures_util::TryStreamExt as _;
use sha2::{Sha256, Digest};

use crate::access::{Authorizer, Operation};
use crate::auth::{Auth, Role};
use crate::error::ApiError;
use crate::models::*;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::Repo;
use crate::storage::{AttachmentStore, AttachmentStoreError};
use crate::workflow::{self, WorkflowError};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(
                web::resource("/incidents")
                    .route(web::get().to(list_incidents))
                    .route(web::post().to(create_incident)),
            )
            // registered before the {id} resource so "mine" never parses as an id
            .service(web::resource("/incidents/mine").route(web::get().to(my_reports)))
            .service(
                web::resource("/incidents/{id}")
                    .route(web::get().to(get_incident))
                    .route(web::put().to(update_incident))
                    .route(web::delete().to(delete_incident)),
            )
            .service(web::resource("/incidents/{id}/status").route(web::post().to(update_status)))
            .service(web::resource("/incidents/{id}/comments").route(web::post().to(add_comment)))
            .service(
                web::resource("/incident-types")
                    .route(web::get().to(list_types))
                    .route(web::post().to(create_type)),
            )
            .service(
                web::resource("/incident-types/{id}")
                    .route(web::put().to(update_type))
                    .route(web::delete().to(delete_type)),
            )
            .service(web::resource("/attachments").route(web::post().to(upload_attachment)))
            .service(web::resource("/auth/me").route(web::get().to(auth_me)))
            .service(web::resource("/auth/refresh").route(web::post().to(refresh_token))),
    );
    // fetch route outside the scope so stored files serve from a short path
    cfg.route("/attachments/{hash}", web::get().to(get_attachment));
    // public landing route; everything else requires a token
    cfg.route("/", web::get().to(index));
}

/// The only route that serves anonymous requests.
pub async fn index() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "service": "securelog",
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/docs",
    }))
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub attachment_store: Arc<dyn AttachmentStore>,
    pub rate_limiter: RateLimiterFacade,
}

macro_rules! ensure_staff {
    ($auth:expr) => {
        if !$auth.0.is_staff() {
            return Err(ApiError::Forbidden);
        }
    };
}

// ---------------- Dashboard -----------------------

#[utoipa::path(
    get,
    path = "/api/v1/dashboard",
    responses(
        (status = 200, description = "Dashboard statistics", body = DashboardStats),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn dashboard(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let stats = data.repo.dashboard(auth.0.sub).await?;
    Ok(HttpResponse::Ok().json(stats))
}

// ---------------- Incident list / detail -----------------------

#[utoipa::path(
    get,
    path = "/api/v1/incidents",
    params(
        ("search" = Option<String>, Query, description = "Case-insensitive match on title, description or location"),
        ("severity" = Option<Severity>, Query, description = "Severity filter"),
        ("status" = Option<Status>, Query, description = "Status filter"),
        ("page" = Option<u32>, Query, description = "1-based page, 10 per page")
    ),
    responses(
        (status = 200, description = "Paginated incident list", body = IncidentPage)
    )
)]
pub async fn list_incidents(
    _auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<IncidentFilter>,
) -> Result<HttpResponse, ApiError> {
    let mut filter = query.into_inner();
    filter.reported_by = None; // ownership scoping only via /incidents/mine
    let page = data.repo.list_incidents(filter).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/incidents/mine",
    responses(
        (status = 200, description = "Reports filed by the caller", body = IncidentPage)
    )
)]
pub async fn my_reports(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<IncidentFilter>,
) -> Result<HttpResponse, ApiError> {
    let mut filter = query.into_inner();
    filter.reported_by = Some(auth.0.sub);
    let page = data.repo.list_incidents(filter).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/incidents/{id}",
    params(("id" = Id, Path, description = "Incident id")),
    responses(
        (status = 200, description = "Incident with comments and status history", body = IncidentDetail),
        (status = 404, description = "Incident not found")
    )
)]
pub async fn get_incident(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let incident = data.repo.get_incident(id).await?;
    Authorizer::ensure(&auth.0, &incident, Operation::Read)?;
    let comments = data.repo.list_comments(id).await?;
    let status_history = data.repo.list_status_history(id).await?;
    Ok(HttpResponse::Ok().json(IncidentDetail { incident, comments, status_history }))
}

// ---------------- Incident create / update / delete -----------------------

#[utoipa::path(
    post,
    path = "/api/v1/incidents",
    request_body = NewIncidentReport,
    responses(
        (status = 201, description = "Incident created", body = IncidentReport),
        (status = 400, description = "Missing required fields"),
        (status = 409, description = "Unknown incident type"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn create_incident(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewIncidentReport>,
) -> Result<HttpResponse, ApiError> {
    let new = payload.into_inner();
    let missing = new.missing_fields();
    if !missing.is_empty() {
        return Err(ApiError::Validation(missing.iter().map(|s| s.to_string()).collect()));
    }
    if !data.rate_limiter.allow_report(auth.0.sub) {
        return Err(ApiError::RateLimited);
    }
    // the reporter always comes from the token, never from the payload
    let incident = data.repo.create_incident(auth.0.sub, &auth.0.name, new).await?;
    metrics::increment_counter!("securelog_reports_created_total");
    Ok(HttpResponse::Created().json(incident))
}

#[utoipa::path(
    put,
    path = "/api/v1/incidents/{id}",
    request_body = UpdateIncidentReport,
    params(("id" = Id, Path, description = "Incident id")),
    responses(
        (status = 200, description = "Incident updated", body = IncidentReport),
        (status = 403, description = "Forbidden - owner or staff only"),
        (status = 404, description = "Incident not found"),
        (status = 409, description = "Stale version or unknown incident type")
    )
)]
pub async fn update_incident(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateIncidentReport>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let upd = payload.into_inner();

    let incident = data.repo.get_incident(id).await?;
    Authorizer::ensure(&auth.0, &incident, Operation::Edit)?;

    // required fields may be rewritten but never blanked
    let mut blanked = Vec::new();
    for (field, value) in [
        ("title", &upd.title),
        ("description", &upd.description),
        ("location", &upd.location),
    ] {
        if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
            blanked.push(field.to_string());
        }
    }
    if !blanked.is_empty() {
        return Err(ApiError::Validation(blanked));
    }

    let updated = data.repo.update_incident(id, upd).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/incidents/{id}",
    params(("id" = Id, Path, description = "Incident id")),
    responses(
        (status = 204, description = "Incident deleted, comments and history with it"),
        (status = 403, description = "Forbidden - owner or staff only"),
        (status = 404, description = "Incident not found")
    )
)]
pub async fn delete_incident(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let incident = data.repo.get_incident(id).await?;
    Authorizer::ensure(&auth.0, &incident, Operation::Delete)?;
    data.repo.delete_incident(id).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- Quick status update (AJAX-shaped) -----------------------

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct StatusUpdateRequest {
    pub status: String,
    pub reason: Option<String>,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct StatusUpdateResponse {
    pub success: bool,
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/incidents/{id}/status",
    request_body = StatusUpdateRequest,
    params(("id" = Id, Path, description = "Incident id")),
    responses(
        (status = 200, description = "Outcome flag and message", body = StatusUpdateResponse),
        (status = 403, description = "Forbidden - owner or staff only"),
        (status = 404, description = "Incident not found")
    )
)]
pub async fn update_status(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<StatusUpdateRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let req = payload.into_inner();

    let incident = data.repo.get_incident(id).await?;
    Authorizer::ensure(&auth.0, &incident, Operation::Edit)?;

    let new_status = match workflow::parse_status(&req.status) {
        Ok(s) => s,
        // invalid values flatten into the response body for the quick-update UI
        Err(_) => {
            return Ok(HttpResponse::Ok().json(StatusUpdateResponse {
                success: false,
                message: format!("Invalid status '{}'", req.status),
            }))
        }
    };

    match workflow::change_status(data.repo.as_ref(), id, new_status, auth.0.sub, &auth.0.name, req.reason).await {
        Ok(entry) => Ok(HttpResponse::Ok().json(StatusUpdateResponse {
            success: true,
            message: format!("Status updated from {} to {}", entry.old_status, entry.new_status),
        })),
        Err(WorkflowError::Repo(e)) => Err(e.into()),
        Err(e) => Ok(HttpResponse::Ok().json(StatusUpdateResponse {
            success: false,
            message: e.to_string(),
        })),
    }
}

// ---------------- Comments (AJAX-shaped) -----------------------

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct CommentRequest {
    pub comment: String,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct CommentResponse {
    pub success: bool,
    pub comment: String,
    pub author: String,
    pub created_at: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/incidents/{id}/comments",
    request_body = CommentRequest,
    responses(
        (status = 200, description = "Created comment or failure flag", body = CommentResponse),
        (status = 404, description = "Incident not found"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn add_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<CommentRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let text = payload.into_inner().comment;

    // 404 for a missing incident, flattened failure for a bad form
    data.repo.get_incident(id).await?;
    if text.trim().is_empty() {
        return Ok(HttpResponse::Ok().json(StatusUpdateResponse {
            success: false,
            message: "Comment text is required".into(),
        }));
    }
    if !data.rate_limiter.allow_comment(auth.0.sub) {
        return Err(ApiError::RateLimited);
    }

    let comment = data
        .repo
        .add_comment(NewIncidentComment {
            incident_id: id,
            author_id: auth.0.sub,
            author_name: auth.0.name.clone(),
            comment: text,
        })
        .await?;
    metrics::increment_counter!("securelog_comments_added_total");

    Ok(HttpResponse::Ok().json(CommentResponse {
        success: true,
        comment: comment.comment,
        author: comment.author_name,
        created_at: comment.created_at.format("%Y-%m-%d %H:%M").to_string(),
    }))
}

// ---------------- Incident types (staff-managed reference data) -----------------------

#[utoipa::path(
    get,
    path = "/api/v1/incident-types",
    responses((status = 200, description = "All incident types, alphabetical", body = [IncidentType]))
)]
pub async fn list_types(_auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let types = data.repo.list_types().await?;
    Ok(HttpResponse::Ok().json(types))
}

#[utoipa::path(
    post,
    path = "/api/v1/incident-types",
    request_body = NewIncidentType,
    responses(
        (status = 201, description = "Type created", body = IncidentType),
        (status = 403, description = "Forbidden - staff only"),
        (status = 409, description = "Name already in use")
    )
)]
pub async fn create_type(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewIncidentType>,
) -> Result<HttpResponse, ApiError> {
    ensure_staff!(auth);
    let new = payload.into_inner();
    if new.name.trim().is_empty() {
        return Err(ApiError::Validation(vec!["name".into()]));
    }
    let ty = data.repo.create_type(new).await?;
    Ok(HttpResponse::Created().json(ty))
}

#[utoipa::path(
    put,
    path = "/api/v1/incident-types/{id}",
    request_body = UpdateIncidentType,
    params(("id" = Id, Path, description = "Incident type id")),
    responses(
        (status = 200, description = "Type updated", body = IncidentType),
        (status = 403, description = "Forbidden - staff only"),
        (status = 404, description = "Type not found"),
        (status = 409, description = "Name already in use")
    )
)]
pub async fn update_type(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateIncidentType>,
) -> Result<HttpResponse, ApiError> {
    ensure_staff!(auth);
    let ty = data.repo.update_type(path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ty))
}

#[utoipa::path(
    delete,
    path = "/api/v1/incident-types/{id}",
    params(("id" = Id, Path, description = "Incident type id")),
    responses(
        (status = 204, description = "Type deleted"),
        (status = 403, description = "Forbidden - staff only"),
        (status = 404, description = "Type not found"),
        (status = 409, description = "Type still referenced by reports")
    )
)]
pub async fn delete_type(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    ensure_staff!(auth);
    data.repo.delete_type(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- Attachments -----------------------

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct AttachmentUploadResponse {
    pub hash: String,
    pub mime: String,
    pub size: usize,
    pub duplicate: bool, // true when upload was a duplicate (idempotent)
}

const ATTACHMENT_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

const ALLOWED_MIME: &[&str] = &[
    "image/png", "image/jpeg", "image/gif", "image/webp",
    "application/pdf",
];

#[utoipa::path(
    post,
    path = "/api/v1/attachments",
    responses(
        (status = 201, description = "Attachment stored (new)", body = AttachmentUploadResponse),
        (status = 200, description = "Attachment already existed (idempotent)", body = AttachmentUploadResponse),
        (status = 415, description = "Unsupported media type"),
        (status = 413, description = "Payload too large"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn upload_attachment(
    auth: Auth,
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    use actix_web::http::StatusCode;
    if !data.rate_limiter.allow_attachment(auth.0.sub) {
        return Err(ApiError::RateLimited);
    }
    let mut bytes: Vec<u8> = Vec::new();
    while let Some(field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::Internal
    })? {
        if let Some(name) = field.content_disposition().get_name() {
            if name != "file" { continue; }
        } else { continue; }
        let mut field_stream = field;
        let mut hasher = Sha256::new();
        while let Some(chunk) = field_stream.try_next().await.map_err(|e| {
            log::error!("stream read error: {e}");
            ApiError::Internal
        })? {
            if bytes.len() + chunk.len() > ATTACHMENT_SIZE_LIMIT {
                return Ok(HttpResponse::build(StatusCode::PAYLOAD_TOO_LARGE).finish());
            }
            hasher.update(&chunk);
            bytes.extend_from_slice(&chunk);
        }
        let hash = format!("{:x}", hasher.finalize());
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        if !ALLOWED_MIME.contains(&mime.as_str()) {
            return Ok(HttpResponse::UnsupportedMediaType().finish());
        }
        let (status_code, duplicate_flag) = match data.attachment_store.save(&hash, &mime, &bytes).await {
            Ok(()) => (StatusCode::CREATED, false),
            Err(AttachmentStoreError::Duplicate) => (StatusCode::OK, true),
            Err(e) => {
                log::error!("attachment_store save error: {e}");
                return Err(ApiError::Internal);
            }
        };
        let resp = AttachmentUploadResponse { hash, mime, size: bytes.len(), duplicate: duplicate_flag };
        return Ok(HttpResponse::build(status_code).json(resp));
    }
    Ok(HttpResponse::BadRequest().finish())
}

pub async fn get_attachment(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let hash = path.into_inner();
    if hash.len() < 2 { return Err(ApiError::NotFound); }
    match data.attachment_store.load(&hash).await {
        Ok((bytes, mime)) => Ok(HttpResponse::Ok().insert_header(("Content-Type", mime)).body(bytes)),
        Err(AttachmentStoreError::NotFound) => Err(ApiError::NotFound),
        Err(e) => {
            log::error!("attachment_store load error: {e}");
            Err(ApiError::Internal)
        }
    }
}

// ---------------- Auth helpers -----------------------

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct MeResponse {
    pub id: Id,
    pub username: String,
    pub role: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user info", body = MeResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn auth_me(auth: Auth) -> Result<HttpResponse, ApiError> {
    let role = if auth.0.is_staff() { "staff" } else { "user" };
    let me = MeResponse {
        id: auth.0.sub,
        username: auth.0.name.clone(),
        role: role.to_string(),
    };
    Ok(HttpResponse::Ok().json(me))
}

pub async fn refresh_token(auth: Auth) -> Result<HttpResponse, ApiError> {
    let roles: Vec<Role> = auth.0.roles.clone();
    let jwt = crate::auth::create_jwt(auth.0.sub, &auth.0.name, roles)
        .map_err(|_| ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "token": jwt })))
}
