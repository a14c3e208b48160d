use crate::auth::Claims;
use crate::error::ApiError;
use crate::models::IncidentReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Edit,
    Delete,
}

/// Single decision point for (user, report, operation). Every mutating
/// handler goes through here instead of repeating ownership conditionals.
pub struct Authorizer;

impl Authorizer {
    /// Staff may do anything. Reporters may edit or delete their own
    /// reports. Reading is open to every authenticated user.
    pub fn allows(claims: &Claims, report: &IncidentReport, op: Operation) -> bool {
        if claims.is_staff() {
            return true;
        }
        match op {
            Operation::Read => true,
            Operation::Edit | Operation::Delete => report.reported_by == claims.sub,
        }
    }

    pub fn ensure(claims: &Claims, report: &IncidentReport, op: Operation) -> Result<(), ApiError> {
        if Self::allows(claims, report, op) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}
