//! Event entity definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub creator_id: i64,
    /// Creator username, joined from `users`
    pub creator: String,
    pub calendar_id: Option<i64>,
    /// Stored verbatim; the API does not restrict it to [`EventStatus`] codes
    pub status: String,
    pub parent_event_id: Option<i64>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub creator_id: i64,
    pub calendar_id: Option<i64>,
    pub status: String,
    pub parent_event_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEventRequest {
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: String,
    pub parent_event_id: Option<i64>,
}

impl From<&Event> for UpdateEventRequest {
    fn from(event: &Event) -> Self {
        Self {
            title: event.title.clone(),
            description: event.description.clone(),
            start: event.start,
            end: event.end,
            status: event.status.clone(),
            parent_event_id: event.parent_event_id,
        }
    }
}

/// Status codes the dialer itself writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Pending,
    Completed,
    Paused,
    Closed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "1",
            EventStatus::Completed => "2",
            EventStatus::Paused => "3",
            EventStatus::Closed => "4",
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
