//! Calendar setting REST endpoints

use std::collections::BTreeMap;

use axum::{
    extract::{rejection::{JsonRejection, QueryRejection}, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use dialer_database::{CalendarSetting, CalendarSettingValues};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::{nullable, WriteMode};
use crate::error::{ApiError, ApiResult};
use crate::hyperlink::{LinkBase, Resource};
use crate::middleware::Caller;
use crate::pagination::{Page, PageQuery, PageRequest};
use crate::references::{Choice, ReferenceField, ReferenceResolver};
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct CalendarSettingResponse {
    pub url: String,
    /// Owner username
    pub user: String,
    pub label: String,
    pub callerid: String,
    pub caller_name: String,
    pub call_timeout: i64,
    pub survey: Option<String>,
    pub aleg_gateway: Option<String>,
    pub sms_gateway: Option<String>,
    pub voicemail: bool,
    pub amd_behavior: Option<i64>,
    pub voicemail_audiofile: Option<String>,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

impl CalendarSettingResponse {
    pub fn new(setting: CalendarSetting, base: &LinkBase) -> Self {
        let link = |resource: Resource, id: Option<i64>| id.map(|id| base.link(resource, id));

        Self {
            url: base.link(Resource::CalendarSetting, setting.id),
            survey: link(Resource::Survey, setting.survey_id),
            aleg_gateway: link(Resource::Gateway, setting.aleg_gateway_id),
            sms_gateway: link(Resource::SmsGateway, setting.sms_gateway_id),
            voicemail_audiofile: link(Resource::AudioFile, setting.voicemail_audiofile_id),
            user: setting.username,
            label: setting.label,
            callerid: setting.callerid,
            caller_name: setting.caller_name,
            call_timeout: setting.call_timeout,
            voicemail: setting.voicemail,
            amd_behavior: setting.amd_behavior,
            created_date: setting.created_date,
            updated_date: setting.updated_date,
        }
    }
}

/// Writable representation; `url` and `user` are ignored when submitted.
///
/// Reference fields take a hyperlink, a server-relative path or a bare id.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CalendarSettingPayload {
    pub label: Option<String>,
    pub callerid: Option<String>,
    pub caller_name: Option<String>,
    pub call_timeout: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub survey: Option<Option<Value>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub aleg_gateway: Option<Option<Value>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub sms_gateway: Option<Option<Value>>,
    pub voicemail: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<i64>)]
    pub amd_behavior: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub voicemail_audiofile: Option<Option<Value>>,
}

impl CalendarSettingPayload {
    fn reference(&self, field: ReferenceField) -> Option<&Option<Value>> {
        match field {
            ReferenceField::Survey => self.survey.as_ref(),
            ReferenceField::AlegGateway => self.aleg_gateway.as_ref(),
            ReferenceField::SmsGateway => self.sms_gateway.as_ref(),
            ReferenceField::VoicemailAudiofile => self.voicemail_audiofile.as_ref(),
        }
    }
}

/// Selectable values of each reference field for the caller
#[derive(Debug, Serialize, ToSchema)]
pub struct CalendarSettingChoices {
    pub survey: Vec<Choice>,
    pub aleg_gateway: Vec<Choice>,
    pub sms_gateway: Vec<Choice>,
    pub voicemail_audiofile: Vec<Choice>,
}

/// Create calendar setting routes
pub fn create_calendar_setting_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/rest-api/calendar-setting/",
            get(list_calendar_settings)
                .post(create_calendar_setting)
                .options(calendar_setting_choices),
        )
        .route(
            "/rest-api/calendar-setting/:id/",
            get(get_calendar_setting)
                .put(update_calendar_setting)
                .patch(partial_update_calendar_setting)
                .delete(delete_calendar_setting),
        )
}

/// Apply a payload on top of `values`, resolving references for the caller
async fn merge_payload(
    resolver: &ReferenceResolver<'_>,
    payload: &CalendarSettingPayload,
    mut values: CalendarSettingValues,
    mode: WriteMode,
) -> ApiResult<CalendarSettingValues> {
    let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut reject = |field: &str, message: &str| {
        errors
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    };

    match &payload.label {
        Some(label) if label.trim().is_empty() => reject("label", "This field may not be blank."),
        Some(label) => values.label = label.clone(),
        None if mode.requires_all() => reject("label", "This field is required."),
        None => {}
    }

    if let Some(callerid) = &payload.callerid {
        values.callerid = callerid.clone();
    }
    if let Some(caller_name) = &payload.caller_name {
        values.caller_name = caller_name.clone();
    }
    match payload.call_timeout {
        Some(timeout) if timeout <= 0 => {
            reject("call_timeout", "Ensure this value is greater than 0.")
        }
        Some(timeout) => values.call_timeout = timeout,
        None => {}
    }
    if let Some(voicemail) = payload.voicemail {
        values.voicemail = voicemail;
    }
    if let Some(amd_behavior) = payload.amd_behavior {
        values.amd_behavior = amd_behavior;
    }

    for field in ReferenceField::ALL {
        let resolved = match payload.reference(field) {
            None if mode == WriteMode::Partial => continue,
            None | Some(None) => Ok(None),
            Some(Some(value)) => resolver.apply(field, value).await,
        };

        match resolved {
            Ok(id) => match field {
                ReferenceField::Survey => values.survey_id = id,
                ReferenceField::AlegGateway => values.aleg_gateway_id = id,
                ReferenceField::SmsGateway => values.sms_gateway_id = id,
                ReferenceField::VoicemailAudiofile => values.voicemail_audiofile_id = id,
            },
            Err(error) if !error.fields.is_empty() => {
                for (name, messages) in error.fields {
                    errors.entry(name).or_default().extend(messages);
                }
            }
            Err(error) => return Err(error),
        }
    }

    if !errors.is_empty() {
        return Err(ApiError::invalid_fields(errors));
    }

    Ok(values)
}

#[utoipa::path(
    get,
    path = "/rest-api/calendar-setting/",
    tag = "Calendar settings",
    params(PageQuery),
    responses(
        (status = 200, description = "Calendar settings visible to the caller", body = CalendarSettingPage),
        (status = 404, description = "Invalid page", body = ErrorResponse)
    )
)]
pub async fn list_calendar_settings(
    State(state): State<AppState>,
    caller: Caller,
    base: LinkBase,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<Page<CalendarSettingResponse>>> {
    let Query(query) = query?;
    let visibility = caller.visibility();

    let count = state.calendar_settings.count(visibility).await?;
    let page = PageRequest::new(&query, state.page_size(), count)?;
    let settings = state.calendar_settings.list(visibility, page.window()).await?;

    let results = settings
        .into_iter()
        .map(|setting| CalendarSettingResponse::new(setting, &base))
        .collect();

    Ok(Json(page.envelope(
        &base,
        &Resource::CalendarSetting.collection_path(),
        count,
        results,
    )))
}

#[utoipa::path(
    post,
    path = "/rest-api/calendar-setting/",
    tag = "Calendar settings",
    request_body = CalendarSettingPayload,
    responses(
        (status = 201, description = "Calendar setting created", body = CalendarSettingResponse),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse)
    )
)]
pub async fn create_calendar_setting(
    State(state): State<AppState>,
    caller: Caller,
    base: LinkBase,
    payload: Result<Json<CalendarSettingPayload>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let user = caller.require_user()?;
    let Json(payload) = payload?;

    let resolver = ReferenceResolver::new(&state, user);
    let values = merge_payload(
        &resolver,
        &payload,
        CalendarSettingValues::default(),
        WriteMode::Create,
    )
    .await?;

    let setting = state.calendar_settings.create(user.id, &values).await?;
    let response = CalendarSettingResponse::new(setting, &base);

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, response.url.clone())],
        Json(response),
    ))
}

#[utoipa::path(
    options,
    path = "/rest-api/calendar-setting/",
    tag = "Calendar settings",
    responses(
        (status = 200, description = "Reference choices available to the caller", body = CalendarSettingChoices)
    )
)]
pub async fn calendar_setting_choices(
    State(state): State<AppState>,
    caller: Caller,
    base: LinkBase,
) -> ApiResult<impl IntoResponse> {
    let mut choices = CalendarSettingChoices {
        survey: Vec::new(),
        aleg_gateway: Vec::new(),
        sms_gateway: Vec::new(),
        voicemail_audiofile: Vec::new(),
    };

    if let Some(user) = caller.user() {
        let resolver = ReferenceResolver::new(&state, user);
        choices.survey = resolver.choices(ReferenceField::Survey, &base).await?;
        choices.aleg_gateway = resolver.choices(ReferenceField::AlegGateway, &base).await?;
        choices.sms_gateway = resolver.choices(ReferenceField::SmsGateway, &base).await?;
        choices.voicemail_audiofile = resolver
            .choices(ReferenceField::VoicemailAudiofile, &base)
            .await?;
    }

    Ok(([(header::ALLOW, "GET, POST, HEAD, OPTIONS")], Json(choices)))
}

#[utoipa::path(
    get,
    path = "/rest-api/calendar-setting/{id}/",
    tag = "Calendar settings",
    params(("id" = i64, Path, description = "Calendar setting id")),
    responses(
        (status = 200, description = "Calendar setting", body = CalendarSettingResponse),
        (status = 404, description = "Not found or not visible", body = ErrorResponse)
    )
)]
pub async fn get_calendar_setting(
    State(state): State<AppState>,
    caller: Caller,
    base: LinkBase,
    Path(id): Path<i64>,
) -> ApiResult<Json<CalendarSettingResponse>> {
    let setting = state
        .calendar_settings
        .find(caller.visibility(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("calendar setting not found"))?;

    Ok(Json(CalendarSettingResponse::new(setting, &base)))
}

async fn write_calendar_setting(
    state: &AppState,
    caller: &Caller,
    base: &LinkBase,
    id: i64,
    payload: CalendarSettingPayload,
    mode: WriteMode,
) -> ApiResult<Json<CalendarSettingResponse>> {
    let user = caller.require_user()?;
    let existing = state
        .calendar_settings
        .find(caller.visibility(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("calendar setting not found"))?;

    let resolver = ReferenceResolver::new(state, user);
    let values = merge_payload(
        &resolver,
        &payload,
        CalendarSettingValues::from(&existing),
        mode,
    )
    .await?;

    let setting = state.calendar_settings.update(id, &values).await?;
    Ok(Json(CalendarSettingResponse::new(setting, base)))
}

#[utoipa::path(
    put,
    path = "/rest-api/calendar-setting/{id}/",
    tag = "Calendar settings",
    params(("id" = i64, Path, description = "Calendar setting id")),
    request_body = CalendarSettingPayload,
    responses(
        (status = 200, description = "Calendar setting replaced", body = CalendarSettingResponse),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 404, description = "Not found or not visible", body = ErrorResponse)
    )
)]
pub async fn update_calendar_setting(
    State(state): State<AppState>,
    caller: Caller,
    base: LinkBase,
    Path(id): Path<i64>,
    payload: Result<Json<CalendarSettingPayload>, JsonRejection>,
) -> ApiResult<Json<CalendarSettingResponse>> {
    caller.require_user()?;
    let Json(payload) = payload?;
    write_calendar_setting(&state, &caller, &base, id, payload, WriteMode::Replace).await
}

#[utoipa::path(
    patch,
    path = "/rest-api/calendar-setting/{id}/",
    tag = "Calendar settings",
    params(("id" = i64, Path, description = "Calendar setting id")),
    request_body = CalendarSettingPayload,
    responses(
        (status = 200, description = "Calendar setting updated", body = CalendarSettingResponse),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 404, description = "Not found or not visible", body = ErrorResponse)
    )
)]
pub async fn partial_update_calendar_setting(
    State(state): State<AppState>,
    caller: Caller,
    base: LinkBase,
    Path(id): Path<i64>,
    payload: Result<Json<CalendarSettingPayload>, JsonRejection>,
) -> ApiResult<Json<CalendarSettingResponse>> {
    caller.require_user()?;
    let Json(payload) = payload?;
    write_calendar_setting(&state, &caller, &base, id, payload, WriteMode::Partial).await
}

#[utoipa::path(
    delete,
    path = "/rest-api/calendar-setting/{id}/",
    tag = "Calendar settings",
    params(("id" = i64, Path, description = "Calendar setting id")),
    responses(
        (status = 204, description = "Calendar setting deleted"),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 404, description = "Not found or not visible", body = ErrorResponse)
    )
)]
pub async fn delete_calendar_setting(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    caller.require_user()?;
    state
        .calendar_settings
        .find(caller.visibility(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("calendar setting not found"))?;

    state.calendar_settings.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
