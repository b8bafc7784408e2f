//! Event REST endpoints

use std::collections::BTreeMap;

use axum::{
    extract::{rejection::{JsonRejection, QueryRejection}, Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use chrono::{DateTime, Utc};
use dialer_database::{Event, UpdateEventRequest, Visibility};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use utoipa::ToSchema;

use super::{nullable, WriteMode};
use crate::error::{ApiError, ApiResult};
use crate::hyperlink::{is_hyperlink, parse_link, LinkBase, Resource};
use crate::middleware::Caller;
use crate::pagination::{Page, PageQuery, PageRequest};
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct EventResponse {
    pub url: String,
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Creator username
    pub creator: String,
    pub calendar: Option<i64>,
    pub status: String,
    pub parent_event: Option<String>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl EventResponse {
    pub fn new(event: Event, base: &LinkBase) -> Self {
        Self {
            url: base.link(Resource::Event, event.id),
            parent_event: event.parent_event_id.map(|id| base.link(Resource::Event, id)),
            title: event.title,
            description: event.description,
            start: event.start,
            end: event.end,
            creator: event.creator,
            calendar: event.calendar_id,
            status: event.status,
            created_on: event.created_on,
            updated_on: event.updated_on,
        }
    }
}

/// Entry of the child listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChildEvent {
    pub url: String,
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ChildEvent {
    fn new(event: Event, base: &LinkBase) -> Self {
        Self {
            url: base.link(Resource::Event, event.id),
            title: event.title,
            description: event.description,
            start: event.start,
            end: event.end,
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct EventPayload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Any string or number
    #[schema(value_type = Option<String>)]
    pub status: Option<Value>,
    /// Hyperlink, path or bare id of the parent event
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub parent_event: Option<Option<Value>>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct StatusUpdateRequest {
    #[schema(value_type = String)]
    pub status: Option<Value>,
    /// Only apply the update while the stored status still equals this value
    #[schema(value_type = Option<String>)]
    pub expected_status: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusMessage {
    pub status: String,
}

/// Create event routes
pub fn create_event_routes() -> Router<AppState> {
    Router::new()
        .route("/rest-api/event/", get(list_events))
        .route(
            "/rest-api/event/:id/",
            get(get_event)
                .put(update_event)
                .patch(partial_update_event)
                .delete(delete_event),
        )
        .route("/rest-api/event/:id/updat_event_status/", patch(update_event_status))
        .route("/rest-api/event/:id/get_list_child/", get(get_list_child))
}

/// Status values are stored verbatim; numbers keep their JSON spelling
fn status_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

async fn find_event(state: &AppState, visibility: Visibility, id: i64) -> ApiResult<Event> {
    state
        .events
        .find(visibility, id)
        .await?
        .ok_or_else(|| ApiError::not_found("event not found"))
}

/// Resolve a submitted parent reference to a visible event id
async fn resolve_parent(
    state: &AppState,
    visibility: Visibility,
    event_id: i64,
    value: &Value,
) -> ApiResult<i64> {
    let parent_id = match value {
        Value::String(text) if is_hyperlink(text) || text.starts_with('/') => {
            parse_link(text, Resource::Event)
        }
        Value::String(text) => text.trim().parse::<i64>().ok(),
        Value::Number(number) => number.as_i64(),
        _ => None,
    };

    let Some(parent_id) = parent_id else {
        return Err(ApiError::field(
            "parent_event",
            "Invalid hyperlink - incorrect URL match.",
        ));
    };

    if parent_id == event_id {
        return Err(ApiError::field(
            "parent_event",
            "An event cannot be its own parent.",
        ));
    }

    let Some(parent) = state.events.find(visibility, parent_id).await? else {
        return Err(ApiError::field(
            "parent_event",
            "Invalid hyperlink - object does not exist.",
        ));
    };

    // Hierarchy is one level deep.
    if parent.parent_event_id.is_some() {
        return Err(ApiError::field(
            "parent_event",
            "A child event cannot be used as a parent.",
        ));
    }
    if !state.events.children(Visibility::All, event_id).await?.is_empty() {
        return Err(ApiError::field(
            "parent_event",
            "An event with child events cannot be given a parent.",
        ));
    }

    Ok(parent_id)
}

#[utoipa::path(
    get,
    path = "/rest-api/event/",
    tag = "Events",
    params(PageQuery),
    responses(
        (status = 200, description = "Events created by the caller's calendar users", body = EventPage),
        (status = 404, description = "Invalid page", body = ErrorResponse)
    )
)]
pub async fn list_events(
    State(state): State<AppState>,
    caller: Caller,
    base: LinkBase,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<Page<EventResponse>>> {
    let Query(query) = query?;
    let visibility = caller.visibility();

    let count = state.events.count(visibility).await?;
    let page = PageRequest::new(&query, state.page_size(), count)?;
    let events = state.events.list(visibility, page.window()).await?;

    let results = events
        .into_iter()
        .map(|event| EventResponse::new(event, &base))
        .collect();

    Ok(Json(page.envelope(
        &base,
        &Resource::Event.collection_path(),
        count,
        results,
    )))
}

#[utoipa::path(
    get,
    path = "/rest-api/event/{id}/",
    tag = "Events",
    params(("id" = i64, Path, description = "Event id")),
    responses(
        (status = 200, description = "Event", body = EventResponse),
        (status = 404, description = "Not found or not visible", body = ErrorResponse)
    )
)]
pub async fn get_event(
    State(state): State<AppState>,
    caller: Caller,
    base: LinkBase,
    Path(id): Path<i64>,
) -> ApiResult<Json<EventResponse>> {
    let event = find_event(&state, caller.visibility(), id).await?;
    Ok(Json(EventResponse::new(event, &base)))
}

async fn write_event(
    state: &AppState,
    caller: &Caller,
    base: &LinkBase,
    id: i64,
    payload: EventPayload,
    mode: WriteMode,
) -> ApiResult<Json<EventResponse>> {
    let visibility = caller.visibility();
    let existing = find_event(state, visibility, id).await?;
    let mut request = UpdateEventRequest::from(&existing);

    let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut reject = |field: &str, message: &str| {
        errors
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    };

    match payload.title {
        Some(title) if title.trim().is_empty() => reject("title", "This field may not be blank."),
        Some(title) => request.title = title,
        None if mode.requires_all() => reject("title", "This field is required."),
        None => {}
    }
    if let Some(description) = payload.description {
        request.description = description;
    }
    match payload.start {
        Some(start) => request.start = start,
        None if mode.requires_all() => reject("start", "This field is required."),
        None => {}
    }
    match payload.end {
        Some(end) => request.end = end,
        None if mode.requires_all() => reject("end", "This field is required."),
        None => {}
    }
    if let Some(status) = &payload.status {
        match status_text(status) {
            Some(status) => request.status = status,
            None => reject("status", "Expected a string or number."),
        }
    }

    match &payload.parent_event {
        None if mode == WriteMode::Partial => {}
        None | Some(None) => request.parent_event_id = None,
        Some(Some(value)) => match resolve_parent(state, visibility, id, value).await {
            Ok(parent_id) => request.parent_event_id = Some(parent_id),
            Err(error) if !error.fields.is_empty() => {
                for (name, messages) in error.fields {
                    errors.entry(name).or_default().extend(messages);
                }
            }
            Err(error) => return Err(error),
        },
    }

    if errors.is_empty() && request.end < request.start {
        errors.insert("end".to_string(), vec!["End must not precede start.".to_string()]);
    }

    if !errors.is_empty() {
        return Err(ApiError::invalid_fields(errors));
    }

    let event = state.events.update(id, &request).await?;
    Ok(Json(EventResponse::new(event, base)))
}

#[utoipa::path(
    put,
    path = "/rest-api/event/{id}/",
    tag = "Events",
    params(("id" = i64, Path, description = "Event id")),
    request_body = EventPayload,
    responses(
        (status = 200, description = "Event replaced", body = EventResponse),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 404, description = "Not found or not visible", body = ErrorResponse)
    )
)]
pub async fn update_event(
    State(state): State<AppState>,
    caller: Caller,
    base: LinkBase,
    Path(id): Path<i64>,
    payload: Result<Json<EventPayload>, JsonRejection>,
) -> ApiResult<Json<EventResponse>> {
    caller.require_user()?;
    let Json(payload) = payload?;
    write_event(&state, &caller, &base, id, payload, WriteMode::Replace).await
}

#[utoipa::path(
    patch,
    path = "/rest-api/event/{id}/",
    tag = "Events",
    params(("id" = i64, Path, description = "Event id")),
    request_body = EventPayload,
    responses(
        (status = 200, description = "Event updated", body = EventResponse),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 404, description = "Not found or not visible", body = ErrorResponse)
    )
)]
pub async fn partial_update_event(
    State(state): State<AppState>,
    caller: Caller,
    base: LinkBase,
    Path(id): Path<i64>,
    payload: Result<Json<EventPayload>, JsonRejection>,
) -> ApiResult<Json<EventResponse>> {
    caller.require_user()?;
    let Json(payload) = payload?;
    write_event(&state, &caller, &base, id, payload, WriteMode::Partial).await
}

#[utoipa::path(
    delete,
    path = "/rest-api/event/{id}/",
    tag = "Events",
    params(("id" = i64, Path, description = "Event id")),
    responses(
        (status = 204, description = "Event and its children deleted"),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 404, description = "Not found or not visible", body = ErrorResponse)
    )
)]
pub async fn delete_event(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    caller.require_user()?;
    find_event(&state, caller.visibility(), id).await?;
    state.events.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    patch,
    path = "/rest-api/event/{id}/updat_event_status/",
    tag = "Events",
    params(("id" = i64, Path, description = "Event id")),
    request_body = StatusUpdateRequest,
    responses(
        (status = 200, description = "Status stored verbatim", body = StatusMessage),
        (status = 400, description = "Missing status", body = ErrorResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 404, description = "Not found or not visible", body = ErrorResponse),
        (status = 409, description = "Stored status differs from expected_status", body = ErrorResponse)
    )
)]
pub async fn update_event_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> ApiResult<Json<StatusMessage>> {
    let user = caller.require_user()?;
    let event = find_event(&state, caller.visibility(), id).await?;
    let Json(payload) = payload?;

    let status = match payload.status.as_ref() {
        None | Some(Value::Null) => {
            return Err(ApiError::field("status", "This field is required."))
        }
        Some(value) => status_text(value)
            .ok_or_else(|| ApiError::field("status", "Expected a string or number."))?,
    };

    let expected = match payload.expected_status.as_ref() {
        None | Some(Value::Null) => None,
        Some(value) => Some(status_text(value).ok_or_else(|| {
            ApiError::field("expected_status", "Expected a string or number.")
        })?),
    };

    state
        .events
        .update_status(event.id, &status, expected.as_deref())
        .await?;

    info!(event_id = event.id, user_id = user.id, status = %status, "event status changed");

    Ok(Json(StatusMessage {
        status: "event status has been updated".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/rest-api/event/{id}/get_list_child/",
    tag = "Events",
    params(("id" = i64, Path, description = "Parent event id")),
    responses(
        (status = 200, description = "Visible children of the event", body = Vec<ChildEvent>),
        (status = 404, description = "Not found or not visible", body = ErrorResponse)
    )
)]
pub async fn get_list_child(
    State(state): State<AppState>,
    caller: Caller,
    base: LinkBase,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<ChildEvent>>> {
    let visibility = caller.visibility();
    let event = find_event(&state, visibility, id).await?;

    let children = state
        .events
        .children(visibility, event.id)
        .await?
        .into_iter()
        .map(|child| ChildEvent::new(child, &base))
        .collect();

    Ok(Json(children))
}
