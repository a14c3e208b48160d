use crate::models::{Id, IncidentStatusHistory, Status};
use crate::repo::{Repo, RepoError};

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("invalid status: {0}")]
    InvalidStatus(String),
    #[error("transition {0} -> {1} not allowed")]
    TransitionDenied(Status, Status),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Whether `old -> new` is a legal transition.
///
/// Deliberately unrestricted: any status may move to any other, matching the
/// system this replaces. The audit trail records every hop, and this is the
/// single place an adjacency table would slot in if reports ever need a
/// stricter lifecycle.
pub fn transition_allowed(_old: Status, _new: Status) -> bool {
    true
}

/// Parse a raw status value, rejecting anything outside the six known states.
pub fn parse_status(raw: &str) -> Result<Status, WorkflowError> {
    Status::parse(raw).ok_or_else(|| WorkflowError::InvalidStatus(raw.to_string()))
}

/// Move an incident to `new_status` on behalf of `changed_by`.
///
/// The caller is responsible for the permission check; this validates the
/// transition, persists the new status and appends exactly one history row
/// with the old value, the new value and the optional reason.
pub async fn change_status(
    repo: &dyn Repo,
    incident_id: Id,
    new_status: Status,
    changed_by: Id,
    changed_by_name: &str,
    reason: Option<String>,
) -> Result<IncidentStatusHistory, WorkflowError> {
    let incident = repo.get_incident(incident_id).await?;
    if !transition_allowed(incident.status, new_status) {
        return Err(WorkflowError::TransitionDenied(incident.status, new_status));
    }
    let entry = repo
        .change_status(incident_id, new_status, changed_by, changed_by_name, reason)
        .await?;
    metrics::increment_counter!("securelog_status_changes_total");
    Ok(entry)
}
