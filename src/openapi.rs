use crate::models::{
    DashboardStats, IncidentComment, IncidentDetail, IncidentPage, IncidentReport,
    IncidentStatusHistory, IncidentType, NewIncidentReport, NewIncidentType, Severity, Status,
    UpdateIncidentReport, UpdateIncidentType,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::dashboard,
        crate::routes::list_incidents,
        crate::routes::my_reports,
        crate::routes::get_incident,
        crate::routes::create_incident,
        crate::routes::update_incident,
        crate::routes::delete_incident,
        crate::routes::update_status,
        crate::routes::add_comment,
        crate::routes::list_types,
        crate::routes::create_type,
        crate::routes::update_type,
        crate::routes::delete_type,
        crate::routes::upload_attachment,
        crate::routes::auth_me,
    ),
    components(schemas(
        Severity, Status,
        IncidentType, NewIncidentType, UpdateIncidentType,
        IncidentReport, NewIncidentReport, UpdateIncidentReport,
        IncidentComment, IncidentStatusHistory,
        IncidentPage, IncidentDetail, DashboardStats,
        crate::routes::StatusUpdateRequest, crate::routes::StatusUpdateResponse,
        crate::routes::CommentRequest, crate::routes::CommentResponse,
        crate::routes::AttachmentUploadResponse, crate::routes::MeResponse,
    )),
    tags(
        (name = "incidents", description = "Incident report operations"),
        (name = "incident-types", description = "Incident category reference data"),
        (name = "attachments", description = "Attachment upload and retrieval"),
    )
)]
pub struct ApiDoc;
