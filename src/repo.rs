use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("constraint violation: {0}")] Constraint(String),
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait IncidentTypeRepo: Send + Sync {
    async fn list_types(&self) -> RepoResult<Vec<IncidentType>>;
    async fn get_type(&self, id: Id) -> RepoResult<IncidentType>;
    async fn create_type(&self, new: NewIncidentType) -> RepoResult<IncidentType>;
    async fn update_type(&self, id: Id, upd: UpdateIncidentType) -> RepoResult<IncidentType>;
    /// Fails with `Constraint` while any report references the type.
    async fn delete_type(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait IncidentRepo: Send + Sync {
    async fn list_incidents(&self, filter: IncidentFilter) -> RepoResult<IncidentPage>;
    async fn get_incident(&self, id: Id) -> RepoResult<IncidentReport>;
    async fn create_incident(
        &self,
        reported_by: Id,
        reporter_name: &str,
        new: NewIncidentReport,
    ) -> RepoResult<IncidentReport>;
    async fn update_incident(&self, id: Id, upd: UpdateIncidentReport) -> RepoResult<IncidentReport>;
    /// Removes the report and everything it owns (comments, history).
    async fn delete_incident(&self, id: Id) -> RepoResult<()>;
    /// Writes the new status and the matching audit row atomically.
    async fn change_status(
        &self,
        id: Id,
        new_status: Status,
        changed_by: Id,
        changed_by_name: &str,
        reason: Option<String>,
    ) -> RepoResult<IncidentStatusHistory>;
    async fn dashboard(&self, user_id: Id) -> RepoResult<DashboardStats>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    async fn list_comments(&self, incident_id: Id) -> RepoResult<Vec<IncidentComment>>;
    async fn add_comment(&self, new: NewIncidentComment) -> RepoResult<IncidentComment>;
}

#[async_trait]
pub trait HistoryRepo: Send + Sync {
    async fn list_status_history(&self, incident_id: Id) -> RepoResult<Vec<IncidentStatusHistory>>;
}

pub trait Repo: IncidentTypeRepo + IncidentRepo + CommentRepo + HistoryRepo {}

impl<T> Repo for T where T: IncidentTypeRepo + IncidentRepo + CommentRepo + HistoryRepo {}

fn page_of(total: i64, page: u32) -> (u32, u32) {
    let page = page.max(1);
    let page_count = ((total + PAGE_SIZE - 1) / PAGE_SIZE) as u32;
    (page, page_count)
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        types: HashMap<Id, IncidentType>,
        incidents: HashMap<Id, IncidentReport>,
        comments: HashMap<Id, IncidentComment>,
        history: HashMap<Id, IncidentStatusHistory>,
        next_id: Id,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn data_dir() -> PathBuf {
            std::env::var("SECURELOG_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data"))
        }

        fn snapshot_path() -> PathBuf {
            if std::env::var("SECURELOG_DATA_DIR").is_ok() {
                let mut p = Self::data_dir();
                p.push("state.json");
                p
            } else {
                PathBuf::from(SNAPSHOT_PATH)
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        eprintln!("[inmem] Loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        eprintln!("[inmem] Failed to parse snapshot '{}': {e}. Starting empty.", path.display());
                        State::default()
                    }
                },
                Err(e) => {
                    eprintln!("[inmem] No snapshot at '{}': {e}. Starting empty.", path.display());
                    State::default()
                }
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    eprintln!("[inmem] Failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }

        fn matches(filter: &IncidentFilter, inc: &IncidentReport) -> bool {
            if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
                let needle = search.to_lowercase();
                let hit = inc.title.to_lowercase().contains(&needle)
                    || inc.description.to_lowercase().contains(&needle)
                    || inc.location.to_lowercase().contains(&needle);
                if !hit {
                    return false;
                }
            }
            if let Some(sev) = filter.severity {
                if inc.severity != sev {
                    return false;
                }
            }
            if let Some(st) = filter.status {
                if inc.status != st {
                    return false;
                }
            }
            if let Some(uid) = filter.reported_by {
                if inc.reported_by != uid {
                    return false;
                }
            }
            true
        }

        // Default ordering: date_occurred desc, created_at desc tie-break.
        fn sorted(mut v: Vec<IncidentReport>) -> Vec<IncidentReport> {
            v.sort_by(|a, b| {
                b.date_occurred
                    .cmp(&a.date_occurred)
                    .then(b.created_at.cmp(&a.created_at))
            });
            v
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    #[async_trait]
    impl IncidentTypeRepo for InMemRepo {
        async fn list_types(&self) -> RepoResult<Vec<IncidentType>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.types.values().cloned().collect();
            v.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(v)
        }

        async fn get_type(&self, id: Id) -> RepoResult<IncidentType> {
            let s = self.state.read().unwrap();
            s.types.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn create_type(&self, new: NewIncidentType) -> RepoResult<IncidentType> {
            let mut s = self.state.write().unwrap();
            if s.types.values().any(|t| t.name == new.name) {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let ty = IncidentType {
                id,
                name: new.name,
                description: new.description,
                color_code: new.color_code.unwrap_or_else(|| DEFAULT_TYPE_COLOR.into()),
                created_at: Utc::now(),
            };
            s.types.insert(id, ty.clone());
            drop(s); // release lock before persisting
            self.persist();
            Ok(ty)
        }

        async fn update_type(&self, id: Id, upd: UpdateIncidentType) -> RepoResult<IncidentType> {
            let mut s = self.state.write().unwrap();

            // uniqueness check before taking a mutable borrow
            if let Some(ref name) = upd.name {
                if s.types.values().any(|t| t.name == *name && t.id != id) {
                    return Err(RepoError::Conflict);
                }
            }

            let ty = s.types.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(name) = upd.name { ty.name = name; }
            if let Some(description) = upd.description { ty.description = description; }
            if let Some(color) = upd.color_code { ty.color_code = color; }

            let updated = ty.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_type(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if !s.types.contains_key(&id) {
                return Err(RepoError::NotFound);
            }
            if s.incidents.values().any(|i| i.incident_type_id == id) {
                return Err(RepoError::Constraint("incident type is referenced by reports".into()));
            }
            s.types.remove(&id);
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl IncidentRepo for InMemRepo {
        async fn list_incidents(&self, filter: IncidentFilter) -> RepoResult<IncidentPage> {
            let s = self.state.read().unwrap();
            let matched: Vec<_> = s
                .incidents
                .values()
                .filter(|i| Self::matches(&filter, i))
                .cloned()
                .collect();
            let total = matched.len() as i64;
            let (page, page_count) = page_of(total, filter.page.unwrap_or(1));
            let incidents = Self::sorted(matched)
                .into_iter()
                .skip(((page - 1) as i64 * PAGE_SIZE) as usize)
                .take(PAGE_SIZE as usize)
                .collect();
            Ok(IncidentPage { incidents, total, page, page_count })
        }

        async fn get_incident(&self, id: Id) -> RepoResult<IncidentReport> {
            let s = self.state.read().unwrap();
            s.incidents.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn create_incident(
            &self,
            reported_by: Id,
            _reporter_name: &str,
            new: NewIncidentReport,
        ) -> RepoResult<IncidentReport> {
            let mut s = self.state.write().unwrap();
            if !s.types.contains_key(&new.incident_type_id) {
                return Err(RepoError::Constraint("unknown incident type".into()));
            }
            let now = Utc::now();
            let id = Self::next_id(&mut s);
            let incident = IncidentReport {
                id,
                title: new.title,
                incident_type_id: new.incident_type_id,
                description: new.description,
                location: new.location,
                date_occurred: new.date_occurred,
                date_reported: now,
                severity: new.severity,
                status: Status::Draft,
                reported_by,
                assigned_to: None,
                people_involved: new.people_involved,
                witnesses: new.witnesses,
                injuries_occurred: new.injuries_occurred,
                injury_details: new.injury_details,
                property_damage: new.property_damage,
                damage_details: new.damage_details,
                immediate_action_taken: new.immediate_action_taken,
                resolution_notes: String::new(),
                follow_up_required: false,
                follow_up_details: String::new(),
                attachment_hash: new.attachment_hash,
                attachment_mime: new.attachment_mime,
                version: 1,
                created_at: now,
                updated_at: now,
            };
            s.incidents.insert(id, incident.clone());
            drop(s);
            self.persist();
            Ok(incident)
        }

        async fn update_incident(&self, id: Id, upd: UpdateIncidentReport) -> RepoResult<IncidentReport> {
            let mut s = self.state.write().unwrap();

            if let Some(type_id) = upd.incident_type_id {
                if !s.types.contains_key(&type_id) {
                    return Err(RepoError::Constraint("unknown incident type".into()));
                }
            }

            let inc = s.incidents.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(expected) = upd.version {
                if expected != inc.version {
                    return Err(RepoError::Conflict);
                }
            }

            if let Some(title) = upd.title { inc.title = title; }
            if let Some(type_id) = upd.incident_type_id { inc.incident_type_id = type_id; }
            if let Some(description) = upd.description { inc.description = description; }
            if let Some(location) = upd.location { inc.location = location; }
            if let Some(date_occurred) = upd.date_occurred { inc.date_occurred = date_occurred; }
            if let Some(severity) = upd.severity { inc.severity = severity; }
            if let Some(assigned_to) = upd.assigned_to { inc.assigned_to = Some(assigned_to); }
            if let Some(people_involved) = upd.people_involved { inc.people_involved = people_involved; }
            if let Some(witnesses) = upd.witnesses { inc.witnesses = witnesses; }
            if let Some(injuries) = upd.injuries_occurred { inc.injuries_occurred = injuries; }
            if let Some(injury_details) = upd.injury_details { inc.injury_details = injury_details; }
            if let Some(damage) = upd.property_damage { inc.property_damage = damage; }
            if let Some(damage_details) = upd.damage_details { inc.damage_details = damage_details; }
            if let Some(action) = upd.immediate_action_taken { inc.immediate_action_taken = action; }
            if let Some(notes) = upd.resolution_notes { inc.resolution_notes = notes; }
            if let Some(follow_up) = upd.follow_up_required { inc.follow_up_required = follow_up; }
            if let Some(details) = upd.follow_up_details { inc.follow_up_details = details; }
            if let Some(hash) = upd.attachment_hash { inc.attachment_hash = Some(hash); }
            if let Some(mime) = upd.attachment_mime { inc.attachment_mime = Some(mime); }

            inc.version += 1;
            inc.updated_at = Utc::now();

            let updated = inc.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_incident(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if s.incidents.remove(&id).is_none() {
                return Err(RepoError::NotFound);
            }
            // owned records go with the aggregate root
            s.comments.retain(|_, c| c.incident_id != id);
            s.history.retain(|_, h| h.incident_id != id);
            drop(s);
            self.persist();
            Ok(())
        }

        async fn change_status(
            &self,
            id: Id,
            new_status: Status,
            changed_by: Id,
            _changed_by_name: &str,
            reason: Option<String>,
        ) -> RepoResult<IncidentStatusHistory> {
            let mut s = self.state.write().unwrap();
            let old_status = {
                let inc = s.incidents.get_mut(&id).ok_or(RepoError::NotFound)?;
                let old = inc.status;
                inc.status = new_status;
                inc.version += 1;
                inc.updated_at = Utc::now();
                old
            };
            let hist_id = Self::next_id(&mut s);
            let entry = IncidentStatusHistory {
                id: hist_id,
                incident_id: id,
                old_status,
                new_status,
                changed_by,
                change_reason: reason.unwrap_or_default(),
                changed_at: Utc::now(),
            };
            s.history.insert(hist_id, entry.clone());
            drop(s);
            self.persist();
            Ok(entry)
        }

        async fn dashboard(&self, user_id: Id) -> RepoResult<DashboardStats> {
            let s = self.state.read().unwrap();
            let all: Vec<_> = s.incidents.values().cloned().collect();
            let total_incidents = all.len() as i64;
            let urgent_incidents = all.iter().filter(|i| i.is_urgent()).count() as i64;
            let my_incidents = all.iter().filter(|i| i.reported_by == user_id).count() as i64;
            let pending_incidents = all
                .iter()
                .filter(|i| matches!(i.status, Status::Submitted | Status::UnderReview))
                .count() as i64;
            let recent_incidents = Self::sorted(all).into_iter().take(5).collect();
            Ok(DashboardStats {
                total_incidents,
                urgent_incidents,
                my_incidents,
                pending_incidents,
                recent_incidents,
            })
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn list_comments(&self, incident_id: Id) -> RepoResult<Vec<IncidentComment>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .comments
                .values()
                .filter(|c| c.incident_id == incident_id)
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))); // newest first
            Ok(v)
        }

        async fn add_comment(&self, new: NewIncidentComment) -> RepoResult<IncidentComment> {
            let mut s = self.state.write().unwrap();
            if !s.incidents.contains_key(&new.incident_id) {
                return Err(RepoError::NotFound);
            }
            let now = Utc::now();
            let id = Self::next_id(&mut s);
            let comment = IncidentComment {
                id,
                incident_id: new.incident_id,
                author_id: new.author_id,
                author_name: new.author_name,
                comment: new.comment,
                created_at: now,
                updated_at: now,
            };
            s.comments.insert(id, comment.clone());
            drop(s);
            self.persist();
            Ok(comment)
        }
    }

    #[async_trait]
    impl HistoryRepo for InMemRepo {
        async fn list_status_history(&self, incident_id: Id) -> RepoResult<Vec<IncidentStatusHistory>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .history
                .values()
                .filter(|h| h.incident_id == incident_id)
                .cloned()
                .collect();
            v.sort_by(|a, b| b.changed_at.cmp(&a.changed_at).then(b.id.cmp(&a.id)));
            Ok(v)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres, QueryBuilder};

    const INCIDENT_COLUMNS: &str = "id, title, incident_type_id, description, location, \
        date_occurred, date_reported, severity, status, reported_by, assigned_to, \
        people_involved, witnesses, injuries_occurred, injury_details, property_damage, \
        damage_details, immediate_action_taken, resolution_notes, follow_up_required, \
        follow_up_details, attachment_hash, attachment_mime, version, created_at, updated_at";

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        /// Register the principal from the token on first write so the
        /// foreign keys on reports, comments and history hold.
        async fn ensure_user<'e, E>(executor: E, id: Id, username: &str) -> RepoResult<()>
        where
            E: sqlx::Executor<'e, Database = Postgres>,
        {
            sqlx::query("INSERT INTO users (id, username) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
                .bind(id)
                .bind(username)
                .execute(executor)
                .await
                .map_err(map_err)?;
            Ok(())
        }

        fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &IncidentFilter) {
            if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
                let pattern = format!("%{search}%");
                qb.push(" AND (title ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR description ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR location ILIKE ")
                    .push_bind(pattern)
                    .push(")");
            }
            if let Some(sev) = filter.severity {
                qb.push(" AND severity = ").push_bind(sev);
            }
            if let Some(st) = filter.status {
                qb.push(" AND status = ").push_bind(st);
            }
            if let Some(uid) = filter.reported_by {
                qb.push(" AND reported_by = ").push_bind(uid);
            }
        }
    }

    fn map_err(e: sqlx::Error) -> RepoError {
        use sqlx::error::ErrorKind;
        match &e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) => match db.kind() {
                ErrorKind::UniqueViolation => RepoError::Conflict,
                ErrorKind::ForeignKeyViolation => {
                    RepoError::Constraint(db.message().to_string())
                }
                _ => RepoError::Internal(e.to_string()),
            },
            _ => RepoError::Internal(e.to_string()),
        }
    }

    #[async_trait]
    impl IncidentTypeRepo for PgRepo {
        async fn list_types(&self) -> RepoResult<Vec<IncidentType>> {
            sqlx::query_as::<_, IncidentType>(
                "SELECT id, name, description, color_code, created_at FROM incident_types ORDER BY name",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn get_type(&self, id: Id) -> RepoResult<IncidentType> {
            sqlx::query_as::<_, IncidentType>(
                "SELECT id, name, description, color_code, created_at FROM incident_types WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?
            .ok_or(RepoError::NotFound)
        }

        async fn create_type(&self, new: NewIncidentType) -> RepoResult<IncidentType> {
            sqlx::query_as::<_, IncidentType>(
                "INSERT INTO incident_types (name, description, color_code) VALUES ($1, $2, $3) \
                 RETURNING id, name, description, color_code, created_at",
            )
            .bind(&new.name)
            .bind(&new.description)
            .bind(new.color_code.as_deref().unwrap_or(DEFAULT_TYPE_COLOR))
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn update_type(&self, id: Id, upd: UpdateIncidentType) -> RepoResult<IncidentType> {
            sqlx::query_as::<_, IncidentType>(
                "UPDATE incident_types SET name = COALESCE($2, name), \
                 description = COALESCE($3, description), color_code = COALESCE($4, color_code) \
                 WHERE id = $1 RETURNING id, name, description, color_code, created_at",
            )
            .bind(id)
            .bind(upd.name.as_deref())
            .bind(upd.description.as_deref())
            .bind(upd.color_code.as_deref())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?
            .ok_or(RepoError::NotFound)
        }

        async fn delete_type(&self, id: Id) -> RepoResult<()> {
            // FK on incident_reports is RESTRICT; a referenced type maps to Constraint.
            let res = sqlx::query("DELETE FROM incident_types WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl IncidentRepo for PgRepo {
        async fn list_incidents(&self, filter: IncidentFilter) -> RepoResult<IncidentPage> {
            let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM incident_reports WHERE 1=1");
            Self::push_filters(&mut count_qb, &filter);
            let total: i64 = count_qb
                .build_query_scalar()
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)?;

            let (page, page_count) = page_of(total, filter.page.unwrap_or(1));

            let mut qb = QueryBuilder::new(format!(
                "SELECT {INCIDENT_COLUMNS} FROM incident_reports WHERE 1=1"
            ));
            Self::push_filters(&mut qb, &filter);
            qb.push(" ORDER BY date_occurred DESC, created_at DESC LIMIT ")
                .push_bind(PAGE_SIZE)
                .push(" OFFSET ")
                .push_bind((page as i64 - 1) * PAGE_SIZE);
            let incidents = qb
                .build_query_as::<IncidentReport>()
                .fetch_all(&self.pool)
                .await
                .map_err(map_err)?;

            Ok(IncidentPage { incidents, total, page, page_count })
        }

        async fn get_incident(&self, id: Id) -> RepoResult<IncidentReport> {
            sqlx::query_as::<_, IncidentReport>(&format!(
                "SELECT {INCIDENT_COLUMNS} FROM incident_reports WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?
            .ok_or(RepoError::NotFound)
        }

        async fn create_incident(
            &self,
            reported_by: Id,
            reporter_name: &str,
            new: NewIncidentReport,
        ) -> RepoResult<IncidentReport> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            Self::ensure_user(&mut *tx, reported_by, reporter_name).await?;
            let incident = sqlx::query_as::<_, IncidentReport>(&format!(
                "INSERT INTO incident_reports \
                 (title, incident_type_id, description, location, date_occurred, severity, \
                  reported_by, people_involved, witnesses, injuries_occurred, injury_details, \
                  property_damage, damage_details, immediate_action_taken, attachment_hash, attachment_mime) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16) \
                 RETURNING {INCIDENT_COLUMNS}"
            ))
            .bind(&new.title)
            .bind(new.incident_type_id)
            .bind(&new.description)
            .bind(&new.location)
            .bind(new.date_occurred)
            .bind(new.severity)
            .bind(reported_by)
            .bind(&new.people_involved)
            .bind(&new.witnesses)
            .bind(new.injuries_occurred)
            .bind(&new.injury_details)
            .bind(new.property_damage)
            .bind(&new.damage_details)
            .bind(&new.immediate_action_taken)
            .bind(new.attachment_hash.as_deref())
            .bind(new.attachment_mime.as_deref())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_err)?;
            tx.commit().await.map_err(map_err)?;
            Ok(incident)
        }

        async fn update_incident(&self, id: Id, upd: UpdateIncidentReport) -> RepoResult<IncidentReport> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;

            let current: Option<Id> =
                sqlx::query_scalar("SELECT version FROM incident_reports WHERE id = $1 FOR UPDATE")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(map_err)?;
            let current = current.ok_or(RepoError::NotFound)?;
            if let Some(expected) = upd.version {
                if expected != current {
                    return Err(RepoError::Conflict);
                }
            }
            if let Some(assignee) = upd.assigned_to {
                Self::ensure_user(&mut *tx, assignee, &format!("user-{assignee}")).await?;
            }

            let incident = sqlx::query_as::<_, IncidentReport>(&format!(
                "UPDATE incident_reports SET \
                 title = COALESCE($2, title), \
                 incident_type_id = COALESCE($3, incident_type_id), \
                 description = COALESCE($4, description), \
                 location = COALESCE($5, location), \
                 date_occurred = COALESCE($6, date_occurred), \
                 severity = COALESCE($7, severity), \
                 assigned_to = COALESCE($8, assigned_to), \
                 people_involved = COALESCE($9, people_involved), \
                 witnesses = COALESCE($10, witnesses), \
                 injuries_occurred = COALESCE($11, injuries_occurred), \
                 injury_details = COALESCE($12, injury_details), \
                 property_damage = COALESCE($13, property_damage), \
                 damage_details = COALESCE($14, damage_details), \
                 immediate_action_taken = COALESCE($15, immediate_action_taken), \
                 resolution_notes = COALESCE($16, resolution_notes), \
                 follow_up_required = COALESCE($17, follow_up_required), \
                 follow_up_details = COALESCE($18, follow_up_details), \
                 attachment_hash = COALESCE($19, attachment_hash), \
                 attachment_mime = COALESCE($20, attachment_mime), \
                 version = version + 1, updated_at = now() \
                 WHERE id = $1 RETURNING {INCIDENT_COLUMNS}"
            ))
            .bind(id)
            .bind(upd.title.as_deref())
            .bind(upd.incident_type_id)
            .bind(upd.description.as_deref())
            .bind(upd.location.as_deref())
            .bind(upd.date_occurred)
            .bind(upd.severity)
            .bind(upd.assigned_to)
            .bind(upd.people_involved.as_deref())
            .bind(upd.witnesses.as_deref())
            .bind(upd.injuries_occurred)
            .bind(upd.injury_details.as_deref())
            .bind(upd.property_damage)
            .bind(upd.damage_details.as_deref())
            .bind(upd.immediate_action_taken.as_deref())
            .bind(upd.resolution_notes.as_deref())
            .bind(upd.follow_up_required)
            .bind(upd.follow_up_details.as_deref())
            .bind(upd.attachment_hash.as_deref())
            .bind(upd.attachment_mime.as_deref())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_err)?;

            tx.commit().await.map_err(map_err)?;
            Ok(incident)
        }

        async fn delete_incident(&self, id: Id) -> RepoResult<()> {
            // comments and history cascade at the schema level
            let res = sqlx::query("DELETE FROM incident_reports WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn change_status(
            &self,
            id: Id,
            new_status: Status,
            changed_by: Id,
            changed_by_name: &str,
            reason: Option<String>,
        ) -> RepoResult<IncidentStatusHistory> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;

            let old_status: Option<Status> =
                sqlx::query_scalar("SELECT status FROM incident_reports WHERE id = $1 FOR UPDATE")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(map_err)?;
            let old_status = old_status.ok_or(RepoError::NotFound)?;

            Self::ensure_user(&mut *tx, changed_by, changed_by_name).await?;

            sqlx::query(
                "UPDATE incident_reports SET status = $2, version = version + 1, updated_at = now() WHERE id = $1",
            )
            .bind(id)
            .bind(new_status)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

            let entry = sqlx::query_as::<_, IncidentStatusHistory>(
                "INSERT INTO incident_status_history (incident_id, old_status, new_status, changed_by, change_reason) \
                 VALUES ($1, $2, $3, $4, $5) \
                 RETURNING id, incident_id, old_status, new_status, changed_by, change_reason, changed_at",
            )
            .bind(id)
            .bind(old_status)
            .bind(new_status)
            .bind(changed_by)
            .bind(reason.unwrap_or_default())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_err)?;

            tx.commit().await.map_err(map_err)?;
            Ok(entry)
        }

        async fn dashboard(&self, user_id: Id) -> RepoResult<DashboardStats> {
            let total_incidents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM incident_reports")
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)?;
            let urgent_incidents: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM incident_reports WHERE severity IN ('high', 'critical')",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?;
            let my_incidents: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM incident_reports WHERE reported_by = $1")
                    .bind(user_id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_err)?;
            let pending_incidents: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM incident_reports WHERE status IN ('submitted', 'under_review')",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?;
            let recent_incidents = sqlx::query_as::<_, IncidentReport>(&format!(
                "SELECT {INCIDENT_COLUMNS} FROM incident_reports \
                 ORDER BY date_occurred DESC, created_at DESC LIMIT 5"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;

            Ok(DashboardStats {
                total_incidents,
                urgent_incidents,
                my_incidents,
                pending_incidents,
                recent_incidents,
            })
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn list_comments(&self, incident_id: Id) -> RepoResult<Vec<IncidentComment>> {
            sqlx::query_as::<_, IncidentComment>(
                "SELECT id, incident_id, author_id, author_name, comment, created_at, updated_at \
                 FROM incident_comments WHERE incident_id = $1 ORDER BY created_at DESC, id DESC",
            )
            .bind(incident_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn add_comment(&self, new: NewIncidentComment) -> RepoResult<IncidentComment> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            Self::ensure_user(&mut *tx, new.author_id, &new.author_name).await?;
            let comment = sqlx::query_as::<_, IncidentComment>(
                "INSERT INTO incident_comments (incident_id, author_id, author_name, comment) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING id, incident_id, author_id, author_name, comment, created_at, updated_at",
            )
            .bind(new.incident_id)
            .bind(new.author_id)
            .bind(&new.author_name)
            .bind(&new.comment)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| match map_err(e) {
                // a missing incident surfaces as an FK violation on insert
                RepoError::Constraint(_) => RepoError::NotFound,
                other => other,
            })?;
            tx.commit().await.map_err(map_err)?;
            Ok(comment)
        }
    }

    #[async_trait]
    impl HistoryRepo for PgRepo {
        async fn list_status_history(&self, incident_id: Id) -> RepoResult<Vec<IncidentStatusHistory>> {
            sqlx::query_as::<_, IncidentStatusHistory>(
                "SELECT id, incident_id, old_status, new_status, changed_by, change_reason, changed_at \
                 FROM incident_status_history WHERE incident_id = $1 ORDER BY changed_at DESC, id DESC",
            )
            .bind(incident_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
        }
    }
}
