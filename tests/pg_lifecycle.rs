#![cfg(feature = "postgres-store")]

// Exercises the Postgres repository end to end. Skips silently when no
// DATABASE_URL is configured, mirroring how CI opts in to these tests.

use chrono::Utc;
use securelog::models::{
    IncidentFilter, NewIncidentComment, NewIncidentReport, NewIncidentType, Severity, Status,
    UpdateIncidentReport,
};
use securelog::repo::pg::PgRepo;
use securelog::repo::{CommentRepo, HistoryRepo, IncidentRepo, IncidentTypeRepo, RepoError};
use sqlx::postgres::PgPoolOptions;

async fn pg_repo() -> Option<PgRepo> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await
        .ok()?;
    sqlx::migrate!().run(&pool).await.ok()?;
    Some(PgRepo::new(pool))
}

fn uniq(prefix: &str) -> String {
    format!("{prefix}{}", uuid::Uuid::new_v4())
}

fn new_report(type_id: i64, title: &str) -> NewIncidentReport {
    NewIncidentReport {
        title: title.into(),
        incident_type_id: type_id,
        description: "Something happened".into(),
        location: "Building A".into(),
        date_occurred: Utc::now(),
        severity: Severity::default(),
        people_involved: String::new(),
        witnesses: String::new(),
        injuries_occurred: false,
        injury_details: String::new(),
        property_damage: false,
        damage_details: String::new(),
        immediate_action_taken: String::new(),
        attachment_hash: None,
        attachment_mime: None,
    }
}

#[tokio::test]
#[serial_test::serial]
async fn pg_full_incident_lifecycle() {
    let Some(repo) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return };

    let ty = repo
        .create_type(NewIncidentType { name: uniq("ty-"), description: String::new(), color_code: None })
        .await
        .unwrap();

    // a referenced type refuses deletion
    let inc = repo
        .create_incident(8001, "pg-alice", new_report(ty.id, &uniq("Forklift ")))
        .await
        .unwrap();
    assert_eq!(inc.status, Status::Draft);
    assert_eq!(inc.version, 1);
    assert!(matches!(repo.delete_type(ty.id).await.unwrap_err(), RepoError::Constraint(_)));

    // optimistic concurrency
    let updated = repo
        .update_incident(
            inc.id,
            UpdateIncidentReport {
                resolution_notes: Some("Hydraulics replaced".into()),
                version: Some(inc.version),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.version, 2);
    let stale = repo
        .update_incident(
            inc.id,
            UpdateIncidentReport {
                resolution_notes: Some("stale write".into()),
                version: Some(inc.version),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(stale, RepoError::Conflict));

    // status change writes one audit row atomically
    let entry = repo
        .change_status(inc.id, Status::Submitted, 8002, "pg-staffer", Some("review".into()))
        .await
        .unwrap();
    assert_eq!(entry.old_status, Status::Draft);
    assert_eq!(entry.new_status, Status::Submitted);
    let history = repo.list_status_history(inc.id).await.unwrap();
    assert_eq!(history.len(), 1);

    // comments newest first
    repo.add_comment(NewIncidentComment {
        incident_id: inc.id,
        author_id: 8001,
        author_name: "pg-alice".into(),
        comment: "first".into(),
    })
    .await
    .unwrap();
    repo.add_comment(NewIncidentComment {
        incident_id: inc.id,
        author_id: 8002,
        author_name: "pg-staffer".into(),
        comment: "second".into(),
    })
    .await
    .unwrap();
    let comments = repo.list_comments(inc.id).await.unwrap();
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0].comment, "second");

    // the filter layer sees the new report
    let page = repo
        .list_incidents(IncidentFilter { reported_by: Some(8001), ..Default::default() })
        .await
        .unwrap();
    assert!(page.incidents.iter().any(|i| i.id == inc.id));

    // cascade delete then the type can go
    repo.delete_incident(inc.id).await.unwrap();
    assert!(matches!(repo.get_incident(inc.id).await.unwrap_err(), RepoError::NotFound));
    assert!(repo.list_comments(inc.id).await.unwrap().is_empty());
    assert!(repo.list_status_history(inc.id).await.unwrap().is_empty());
    repo.delete_type(ty.id).await.unwrap();
}

#[tokio::test]
#[serial_test::serial]
async fn pg_duplicate_type_name_conflicts() {
    let Some(repo) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return };

    let name = uniq("dup-");
    repo.create_type(NewIncidentType { name: name.clone(), description: String::new(), color_code: None })
        .await
        .unwrap();
    let err = repo
        .create_type(NewIncidentType { name, description: String::new(), color_code: None })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict));

    // commenting on a report that does not exist is NotFound, not an opaque error
    let err = repo
        .add_comment(NewIncidentComment {
            incident_id: -1,
            author_id: 8003,
            author_name: "pg-bob".into(),
            comment: "ghost".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}
