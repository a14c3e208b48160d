use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// Bootstrap primary blue, applied when a type is created without a color.
pub const DEFAULT_TYPE_COLOR: &str = "#007bff";

/// Fixed page size for every incident list view.
pub const PAGE_SIZE: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "severity", rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::Medium
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "incident_status", rename_all = "snake_case")]
pub enum Status {
    Draft,
    Submitted,
    UnderReview,
    Investigating,
    Resolved,
    Closed,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Status::Draft,
        Status::Submitted,
        Status::UnderReview,
        Status::Investigating,
        Status::Resolved,
        Status::Closed,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            "under_review" => Some(Self::UnderReview),
            "investigating" => Some(Self::Investigating),
            "resolved" => Some(Self::Resolved),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Investigating => "investigating",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::Draft
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct IncidentType {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub color_code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewIncidentType {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub color_code: Option<String>, // falls back to DEFAULT_TYPE_COLOR
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateIncidentType {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct IncidentReport {
    pub id: Id,
    pub title: String,
    pub incident_type_id: Id,
    pub description: String,
    pub location: String,
    pub date_occurred: DateTime<Utc>,
    pub date_reported: DateTime<Utc>,
    pub severity: Severity,
    pub status: Status,
    pub reported_by: Id,
    pub assigned_to: Option<Id>,
    pub people_involved: String,
    pub witnesses: String,
    pub injuries_occurred: bool,
    pub injury_details: String,
    pub property_damage: bool,
    pub damage_details: String,
    pub immediate_action_taken: String,
    pub resolution_notes: String,
    pub follow_up_required: bool,
    pub follow_up_details: String,
    pub attachment_hash: Option<String>,
    pub attachment_mime: Option<String>,
    pub version: i64, // bumped on every mutation; stale writes are rejected
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IncidentReport {
    pub fn is_urgent(&self) -> bool {
        matches!(self.severity, Severity::High | Severity::Critical)
    }

    pub fn days_since_reported(&self) -> i64 {
        (Utc::now() - self.date_reported).num_days()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewIncidentReport {
    pub title: String,
    pub incident_type_id: Id,
    pub description: String,
    pub location: String,
    pub date_occurred: DateTime<Utc>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub people_involved: String,
    #[serde(default)]
    pub witnesses: String,
    #[serde(default)]
    pub injuries_occurred: bool,
    #[serde(default)]
    pub injury_details: String,
    #[serde(default)]
    pub property_damage: bool,
    #[serde(default)]
    pub damage_details: String,
    #[serde(default)]
    pub immediate_action_taken: String,
    pub attachment_hash: Option<String>,
    pub attachment_mime: Option<String>,
}

impl NewIncidentReport {
    /// Names of required text fields that are empty or whitespace.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.title.trim().is_empty() {
            missing.push("title");
        }
        if self.description.trim().is_empty() {
            missing.push("description");
        }
        if self.location.trim().is_empty() {
            missing.push("location");
        }
        missing
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateIncidentReport {
    pub title: Option<String>,
    pub incident_type_id: Option<Id>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub date_occurred: Option<DateTime<Utc>>,
    pub severity: Option<Severity>,
    pub assigned_to: Option<Id>,
    pub people_involved: Option<String>,
    pub witnesses: Option<String>,
    pub injuries_occurred: Option<bool>,
    pub injury_details: Option<String>,
    pub property_damage: Option<bool>,
    pub damage_details: Option<String>,
    pub immediate_action_taken: Option<String>,
    pub resolution_notes: Option<String>,
    pub follow_up_required: Option<bool>,
    pub follow_up_details: Option<String>,
    pub attachment_hash: Option<String>,
    pub attachment_mime: Option<String>,
    /// Version the client read; stale writes fail with a conflict when set.
    pub version: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct IncidentComment {
    pub id: Id,
    pub incident_id: Id,
    pub author_id: Id,
    pub author_name: String,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewIncidentComment {
    pub incident_id: Id,
    pub author_id: Id,
    pub author_name: String,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct IncidentStatusHistory {
    pub id: Id,
    pub incident_id: Id,
    pub old_status: Status,
    pub new_status: Status,
    pub changed_by: Id,
    pub change_reason: String,
    pub changed_at: DateTime<Utc>,
}

/// Optional list-view predicates; absent fields impose no constraint.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct IncidentFilter {
    pub search: Option<String>,
    pub severity: Option<Severity>,
    pub status: Option<Status>,
    pub reported_by: Option<Id>,
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IncidentPage {
    pub incidents: Vec<IncidentReport>,
    pub total: i64,
    pub page: u32,
    pub page_count: u32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IncidentDetail {
    pub incident: IncidentReport,
    pub comments: Vec<IncidentComment>,
    pub status_history: Vec<IncidentStatusHistory>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardStats {
    pub total_incidents: i64,
    pub urgent_incidents: i64,
    pub my_incidents: i64,
    pub pending_incidents: i64,
    pub recent_incidents: Vec<IncidentReport>,
}
