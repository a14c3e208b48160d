use once_cell::sync::Lazy;
use tracing::info;

use crate::models::NewIncidentType;
use crate::repo::{Repo, RepoError};

/// Built-in incident categories, created on demand at startup.
static DEFAULT_TYPES: Lazy<Vec<NewIncidentType>> = Lazy::new(|| {
    let t = |name: &str, description: &str, color: &str| NewIncidentType {
        name: name.into(),
        description: description.into(),
        color_code: Some(color.into()),
    };
    vec![
        t("Safety Incident", "Workplace accidents, injuries, near misses", "#dc3545"),
        t("Security Breach", "Unauthorized access, theft, security violations", "#fd7e14"),
        t("Equipment Failure", "Machinery breakdown, equipment malfunction", "#ffc107"),
        t("Environmental Issue", "Spills, contamination, environmental hazards", "#28a745"),
        t("HR Incident", "Workplace harassment, discrimination, misconduct", "#17a2b8"),
        t("IT Security", "Cyber attacks, data breaches, system compromises", "#6f42c1"),
        t("Other", "General incidents not covered by other categories", "#6c757d"),
    ]
});

/// Get-or-create semantics: existing names are left alone. Returns how many
/// types were created.
pub async fn seed_default_types(repo: &dyn Repo) -> Result<usize, RepoError> {
    let mut created = 0;
    for ty in DEFAULT_TYPES.iter() {
        match repo.create_type(ty.clone()).await {
            Ok(t) => {
                info!("Created incident type: {}", t.name);
                created += 1;
            }
            Err(RepoError::Conflict) => {
                info!("Incident type already exists: {}", ty.name);
            }
            Err(e) => return Err(e),
        }
    }
    info!("Seeded {created} incident types");
    Ok(created)
}
