//! Repository for appointment events.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::visibility_clause;
use crate::entities::{CreateEventRequest, Event, UpdateEventRequest};
use crate::types::{DatabaseError, DatabaseResult, Visibility, Window};

const SELECT_EVENT: &str = r#"SELECT e.id, e.title, e.description, e.start, e."end", e.creator_id,
        u.username AS creator, e.calendar_id, e.status, e.parent_event_id, e.created_on, e.updated_on
     FROM events e
     JOIN users u ON u.id = e.creator_id"#;

/// Events are visible to the manager of their creator
const MANAGED: &str =
    "e.creator_id IN (SELECT user_id FROM calendar_user_profiles WHERE manager_id = ?)";

#[derive(Clone)]
pub struct EventRepository {
    pool: SqlitePool,
}

impl EventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, visibility: Visibility, window: Window) -> DatabaseResult<Vec<Event>> {
        let (clause, manager) = visibility_clause(visibility, MANAGED);
        let sql = format!("{SELECT_EVENT} WHERE {clause} ORDER BY e.start ASC, e.id ASC LIMIT ? OFFSET ?");

        let mut query = sqlx::query_as::<_, Event>(&sql);
        if let Some(manager) = manager {
            query = query.bind(manager);
        }

        let events = query
            .bind(window.limit)
            .bind(window.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(events)
    }

    pub async fn count(&self, visibility: Visibility) -> DatabaseResult<i64> {
        let (clause, manager) = visibility_clause(visibility, MANAGED);
        let sql = format!("SELECT COUNT(*) FROM events e WHERE {clause}");

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        if let Some(manager) = manager {
            query = query.bind(manager);
        }

        Ok(query.fetch_one(&self.pool).await?)
    }

    pub async fn find(&self, visibility: Visibility, id: i64) -> DatabaseResult<Option<Event>> {
        let (clause, manager) = visibility_clause(visibility, MANAGED);
        let sql = format!("{SELECT_EVENT} WHERE e.id = ? AND {clause}");

        let mut query = sqlx::query_as::<_, Event>(&sql).bind(id);
        if let Some(manager) = manager {
            query = query.bind(manager);
        }

        Ok(query.fetch_optional(&self.pool).await?)
    }

    /// Direct children of `parent_id` that the caller may see
    pub async fn children(&self, visibility: Visibility, parent_id: i64) -> DatabaseResult<Vec<Event>> {
        let (clause, manager) = visibility_clause(visibility, MANAGED);
        let sql = format!(
            "{SELECT_EVENT} WHERE e.parent_event_id = ? AND {clause} ORDER BY e.start ASC, e.id ASC"
        );

        let mut query = sqlx::query_as::<_, Event>(&sql).bind(parent_id);
        if let Some(manager) = manager {
            query = query.bind(manager);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    pub async fn create(&self, request: &CreateEventRequest) -> DatabaseResult<Event> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"INSERT INTO events (
                title, description, start, "end", creator_id, calendar_id, status,
                parent_event_id, created_on, updated_on
             )
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.start)
        .bind(request.end)
        .bind(request.creator_id)
        .bind(request.calendar_id)
        .bind(&request.status)
        .bind(request.parent_event_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let event_id = result.last_insert_rowid();
        info!(event_id, creator_id = request.creator_id, parent = ?request.parent_event_id, "created event");

        self.find(Visibility::All, event_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("event {event_id}")))
    }

    pub async fn update(&self, id: i64, request: &UpdateEventRequest) -> DatabaseResult<Event> {
        let result = sqlx::query(
            r#"UPDATE events
             SET title = ?, description = ?, start = ?, "end" = ?, status = ?,
                 parent_event_id = ?, updated_on = ?
             WHERE id = ?"#,
        )
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.start)
        .bind(request.end)
        .bind(&request.status)
        .bind(request.parent_event_id)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("event {id}")));
        }

        info!(event_id = id, "updated event");

        self.find(Visibility::All, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("event {id}")))
    }

    /// Overwrite the status in one statement.
    ///
    /// With `expected` set the row is only touched while its current status
    /// still matches; a mismatch is reported as [`DatabaseError::Conflict`].
    /// Without it the last writer wins.
    pub async fn update_status(
        &self,
        id: i64,
        status: &str,
        expected: Option<&str>,
    ) -> DatabaseResult<()> {
        let now = Utc::now();

        let result = match expected {
            Some(expected) => {
                sqlx::query("UPDATE events SET status = ?, updated_on = ? WHERE id = ? AND status = ?")
                    .bind(status)
                    .bind(now)
                    .bind(id)
                    .bind(expected)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("UPDATE events SET status = ?, updated_on = ? WHERE id = ?")
                    .bind(status)
                    .bind(now)
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM events WHERE id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

            return Err(if exists > 0 {
                debug!(event_id = id, ?expected, "status precondition failed");
                DatabaseError::Conflict(format!("event {id} status changed concurrently"))
            } else {
                DatabaseError::NotFound(format!("event {id}"))
            });
        }

        info!(event_id = id, status, "updated event status");
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> DatabaseResult<()> {
        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("event {id}")));
        }

        info!(event_id = id, "deleted event");
        Ok(())
    }
}
