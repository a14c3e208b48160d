#![cfg(feature = "inmem-store")]

use chrono::{DateTime, Duration, Utc};
use securelog::{
    models::{
        Id, IncidentFilter, NewIncidentComment, NewIncidentReport, NewIncidentType, Severity,
        Status, UpdateIncidentReport, UpdateIncidentType,
    },
    repo::{inmem::InMemRepo, RepoError},
};
// Bring trait method namespaces into scope so calls on InMemRepo resolve.
use securelog::repo::{CommentRepo, HistoryRepo, IncidentRepo, IncidentTypeRepo};

/// Helper that returns a fresh, empty repository for every test run.
fn repo() -> InMemRepo {
    // isolate state: do **not** persist to the default file path
    std::env::set_var("SECURELOG_DATA_DIR", tempfile::tempdir().unwrap().path());
    InMemRepo::new()
}

fn new_type(name: &str) -> NewIncidentType {
    NewIncidentType {
        name: name.into(),
        description: String::new(),
        color_code: None,
    }
}

fn new_report(type_id: Id, title: &str, occurred: DateTime<Utc>) -> NewIncidentReport {
    NewIncidentReport {
        title: title.into(),
        incident_type_id: type_id,
        description: "Something happened".into(),
        location: "Building A".into(),
        date_occurred: occurred,
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
async fn type_crud_and_conflict() {
    let r = repo();

    assert!(r.list_types().await.unwrap().is_empty());

    let ty = r.create_type(new_type("Safety Incident")).await.unwrap();
    assert_eq!(ty.name, "Safety Incident");
    assert_eq!(ty.color_code, "#007bff"); // default color applied

    // duplicate name -> conflict
    let err = r.create_type(new_type("Safety Incident")).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict));

    // rename
    let updated = r
        .update_type(
            ty.id,
            UpdateIncidentType {
                name: Some("Workplace Safety".into()),
                description: Some("Accidents and near misses".into()),
                color_code: Some("#dc3545".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Workplace Safety");
    assert_eq!(updated.color_code, "#dc3545");

    // renaming onto an existing name is also a conflict
    let other = r.create_type(new_type("Security Breach")).await.unwrap();
    let err = r
        .update_type(
            other.id,
            UpdateIncidentType { name: Some("Workplace Safety".into()), description: None, color_code: None },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict));

    // alphabetical listing
    let names: Vec<_> = r.list_types().await.unwrap().into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["Security Breach", "Workplace Safety"]);
}

#[tokio::test]
async fn referenced_type_cannot_be_deleted() {
    let r = repo();
    let ty = r.create_type(new_type("Equipment Failure")).await.unwrap();
    let inc = r
        .create_incident(1, "alice", new_report(ty.id, "Forklift breakdown", Utc::now()))
        .await
        .unwrap();

    let err = r.delete_type(ty.id).await.unwrap_err();
    assert!(matches!(err, RepoError::Constraint(_)));

    // once the last referencing report goes, the type can be removed
    r.delete_incident(inc.id).await.unwrap();
    r.delete_type(ty.id).await.unwrap();
    assert!(matches!(r.get_type(ty.id).await.unwrap_err(), RepoError::NotFound));
}

#[tokio::test]
async fn create_applies_defaults_and_checks_type() {
    let r = repo();
    let ty = r.create_type(new_type("Safety Incident")).await.unwrap();

    let inc = r
        .create_incident(7, "bob", new_report(ty.id, "Slip and fall in cafeteria", Utc::now()))
        .await
        .unwrap();
    assert_eq!(inc.status, Status::Draft);
    assert_eq!(inc.severity, Severity::Medium);
    assert_eq!(inc.reported_by, 7);
    assert_eq!(inc.version, 1);
    assert!(inc.assigned_to.is_none());
    assert_eq!(inc.days_since_reported(), 0);

    // an unknown type is a referential failure, not a silent insert
    let err = r
        .create_incident(7, "bob", new_report(9999, "Bad ref", Utc::now()))
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Constraint(_)));
}

#[tokio::test]
async fn search_and_filters_combine_with_and() {
    let r = repo();
    let ty = r.create_type(new_type("Safety Incident")).await.unwrap();
    let base = Utc::now();

    let mut fire_kitchen = new_report(ty.id, "Fire in kitchen", base);
    fire_kitchen.severity = Severity::High;
    let fire_kitchen = r.create_incident(1, "alice", fire_kitchen).await.unwrap();

    let mut desc_hit = new_report(ty.id, "Smoke alarm", base - Duration::hours(1));
    desc_hit.description = "Small FIRE contained by extinguisher".into();
    let desc_hit = r.create_incident(1, "alice", desc_hit).await.unwrap();

    let mut loc_hit = new_report(ty.id, "Blocked exit", base - Duration::hours(2));
    loc_hit.location = "Fire escape, floor 3".into();
    let loc_hit = r.create_incident(2, "bob", loc_hit).await.unwrap();

    let miss = r
        .create_incident(2, "bob", new_report(ty.id, "Water leak", base - Duration::hours(3)))
        .await
        .unwrap();

    // case-insensitive OR across title, description, location
    let page = r
        .list_incidents(IncidentFilter { search: Some("fire".into()), ..Default::default() })
        .await
        .unwrap();
    let ids: Vec<_> = page.incidents.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![fire_kitchen.id, desc_hit.id, loc_hit.id]);
    assert!(!ids.contains(&miss.id));

    // severity + status combine with AND
    r.change_status(fire_kitchen.id, Status::Resolved, 1, "alice", None).await.unwrap();
    let page = r
        .list_incidents(IncidentFilter {
            severity: Some(Severity::High),
            status: Some(Status::Resolved),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.incidents[0].id, fire_kitchen.id);

    // empty filter returns everything, newest date_occurred first
    let page = r.list_incidents(IncidentFilter::default()).await.unwrap();
    assert_eq!(page.total, 4);
    let ids: Vec<_> = page.incidents.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![fire_kitchen.id, desc_hit.id, loc_hit.id, miss.id]);
}

#[tokio::test]
async fn lists_paginate_at_ten() {
    let r = repo();
    let ty = r.create_type(new_type("Other")).await.unwrap();
    let base = Utc::now();
    for i in 0..12 {
        r.create_incident(
            1,
            "alice",
            new_report(ty.id, &format!("Incident {i}"), base + Duration::minutes(i)),
        )
        .await
        .unwrap();
    }

    let first = r
        .list_incidents(IncidentFilter { page: Some(1), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(first.incidents.len(), 10);
    assert_eq!(first.total, 12);
    assert_eq!(first.page_count, 2);
    assert_eq!(first.incidents[0].title, "Incident 11"); // newest first

    let second = r
        .list_incidents(IncidentFilter { page: Some(2), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(second.incidents.len(), 2);
    assert_eq!(second.page, 2);
}

#[tokio::test]
async fn stale_update_is_rejected() {
    let r = repo();
    let ty = r.create_type(new_type("Other")).await.unwrap();
    let inc = r
        .create_incident(1, "alice", new_report(ty.id, "Door jammed", Utc::now()))
        .await
        .unwrap();

    let upd = UpdateIncidentReport {
        resolution_notes: Some("Hinges replaced".into()),
        version: Some(inc.version),
        ..Default::default()
    };
    let updated = r.update_incident(inc.id, upd).await.unwrap();
    assert_eq!(updated.version, inc.version + 1);
    assert_eq!(updated.resolution_notes, "Hinges replaced");

    // a second writer still holding version 1 loses
    let stale = UpdateIncidentReport {
        resolution_notes: Some("No action needed".into()),
        version: Some(inc.version),
        ..Default::default()
    };
    let err = r.update_incident(inc.id, stale).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict));

    // omitting the token keeps last-write-wins semantics
    let unversioned = UpdateIncidentReport {
        follow_up_required: Some(true),
        follow_up_details: Some("Check again next week".into()),
        ..Default::default()
    };
    r.update_incident(inc.id, unversioned).await.unwrap();
}

#[tokio::test]
async fn status_changes_append_history() {
    let r = repo();
    let ty = r.create_type(new_type("Other")).await.unwrap();
    let inc = r
        .create_incident(1, "alice", new_report(ty.id, "Spill", Utc::now()))
        .await
        .unwrap();

    let first = r
        .change_status(inc.id, Status::Submitted, 1, "alice", Some("ready for review".into()))
        .await
        .unwrap();
    assert_eq!(first.old_status, Status::Draft);
    assert_eq!(first.new_status, Status::Submitted);
    assert_eq!(first.change_reason, "ready for review");

    let second = r.change_status(inc.id, Status::Closed, 9, "staffer", None).await.unwrap();
    assert_eq!(second.old_status, Status::Submitted);

    let stored = r.get_incident(inc.id).await.unwrap();
    assert_eq!(stored.status, Status::Closed);
    assert_eq!(stored.version, 3); // two status writes on top of the create

    // newest first
    let history = r.list_status_history(inc.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.id);
    assert_eq!(history[1].id, first.id);

    // unknown incident
    let err = r.change_status(424242, Status::Closed, 1, "alice", None).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn comments_are_newest_first() {
    let r = repo();
    let ty = r.create_type(new_type("Other")).await.unwrap();
    let inc = r
        .create_incident(1, "alice", new_report(ty.id, "Spill", Utc::now()))
        .await
        .unwrap();

    r.add_comment(NewIncidentComment {
        incident_id: inc.id,
        author_id: 1,
        author_name: "alice".into(),
        comment: "Mopped up".into(),
    })
    .await
    .unwrap();
    let latest = r
        .add_comment(NewIncidentComment {
            incident_id: inc.id,
            author_id: 9,
            author_name: "staffer".into(),
            comment: "Reviewed on site".into(),
        })
        .await
        .unwrap();

    let comments = r.list_comments(inc.id).await.unwrap();
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0].id, latest.id);
    assert_eq!(comments[0].comment, "Reviewed on site");

    // comments on a missing incident are refused
    let err = r
        .add_comment(NewIncidentComment {
            incident_id: 424242,
            author_id: 1,
            author_name: "alice".into(),
            comment: "ghost".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn deleting_a_report_cascades_to_owned_records() {
    let r = repo();
    let ty = r.create_type(new_type("Other")).await.unwrap();
    let doomed = r
        .create_incident(1, "alice", new_report(ty.id, "Doomed", Utc::now()))
        .await
        .unwrap();
    let survivor = r
        .create_incident(1, "alice", new_report(ty.id, "Survivor", Utc::now()))
        .await
        .unwrap();

    for inc in [&doomed, &survivor] {
        r.add_comment(NewIncidentComment {
            incident_id: inc.id,
            author_id: 1,
            author_name: "alice".into(),
            comment: "note".into(),
        })
        .await
        .unwrap();
        r.change_status(inc.id, Status::Submitted, 1, "alice", None).await.unwrap();
    }

    r.delete_incident(doomed.id).await.unwrap();

    assert!(matches!(r.get_incident(doomed.id).await.unwrap_err(), RepoError::NotFound));
    assert!(r.list_comments(doomed.id).await.unwrap().is_empty());
    assert!(r.list_status_history(doomed.id).await.unwrap().is_empty());

    // the reporter's other report is untouched
    assert_eq!(r.list_comments(survivor.id).await.unwrap().len(), 1);
    assert_eq!(r.list_status_history(survivor.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn dashboard_counts_and_recent() {
    let r = repo();
    let ty = r.create_type(new_type("Other")).await.unwrap();
    let base = Utc::now();

    // 10 incidents: 2 critical, 1 high, the rest medium; user 1 reported 3
    let mut ids = Vec::new();
    for i in 0..10i64 {
        let mut new = new_report(ty.id, &format!("Incident {i}"), base + Duration::hours(i));
        new.severity = match i {
            0 | 1 => Severity::Critical,
            2 => Severity::High,
            _ => Severity::Medium,
        };
        let reporter = if i < 3 { 1 } else { 2 };
        let inc = r.create_incident(reporter, "reporter", new).await.unwrap();
        ids.push(inc.id);
    }
    // 3 submitted, 1 under review
    for id in &ids[0..3] {
        r.change_status(*id, Status::Submitted, 9, "staffer", None).await.unwrap();
    }
    r.change_status(ids[3], Status::UnderReview, 9, "staffer", None).await.unwrap();

    let stats = r.dashboard(1).await.unwrap();
    assert_eq!(stats.total_incidents, 10);
    assert_eq!(stats.urgent_incidents, 3);
    assert_eq!(stats.my_incidents, 3);
    assert_eq!(stats.pending_incidents, 4);

    // the five most recent by default ordering (largest date_occurred)
    let recent: Vec<_> = stats.recent_incidents.iter().map(|i| i.id).collect();
    let expected: Vec<_> = ids[5..10].iter().rev().copied().collect();
    assert_eq!(recent, expected);
}
