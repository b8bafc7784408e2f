use std::str::FromStr;

use axum::{
    body::Body,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_METHOD, AUTHORIZATION,
            CONTENT_TYPE, COOKIE, HOST, LOCATION, ORIGIN, SET_COOKIE,
        },
        HeaderMap, Method, Request, StatusCode,
    },
    Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Duration, TimeZone, Utc};
use dialer_auth::NewAccount;
use dialer_config::AppConfig;
use dialer_database::{
    CalendarSettingValues, CreateEventRequest, EventStatus, Visibility,
};
use dialer_gateway::{create_router, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tempfile::TempDir;
use tower::ServiceExt;

type TestResult<T = ()> = anyhow::Result<T>;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

const HOST_NAME: &str = "testserver";
const PASSWORD: &str = "s3cret";

struct TestContext {
    _temp_dir: TempDir,
    pool: SqlitePool,
    state: AppState,
}

struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestContext {
    async fn new() -> TestResult<Self> {
        Self::with_config(AppConfig::default()).await
    }

    async fn with_config(config: AppConfig) -> TestResult<Self> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("gateway.sqlite");
        let db_url = format!("sqlite://{}", db_path.display());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;

        let state = AppState::new(pool.clone(), &config);

        Ok(Self {
            _temp_dir: temp_dir,
            pool,
            state,
        })
    }

    fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    async fn user(&self, username: &str) -> TestResult<i64> {
        self.account(username, false, None).await
    }

    async fn account(&self, username: &str, is_superuser: bool, manager_id: Option<i64>) -> TestResult<i64> {
        let user = self
            .state
            .authenticator
            .register_user(&NewAccount {
                username: username.to_string(),
                email: None,
                password: PASSWORD.to_string(),
                is_superuser,
                manager_id,
            })
            .await?;
        Ok(user.id)
    }

    async fn setting(&self, owner: i64, label: &str) -> TestResult<i64> {
        let values = CalendarSettingValues {
            label: label.to_string(),
            ..CalendarSettingValues::default()
        };
        Ok(self.state.calendar_settings.create(owner, &values).await?.id)
    }

    async fn event(&self, creator: i64, title: &str, parent: Option<i64>) -> TestResult<i64> {
        let start = at(9);
        let event = self
            .state
            .events
            .create(&CreateEventRequest {
                title: title.to_string(),
                description: format!("{title} notes"),
                start,
                end: start + Duration::hours(1),
                creator_id: creator,
                calendar_id: None,
                status: EventStatus::Pending.to_string(),
                parent_event_id: parent,
            })
            .await?;
        Ok(event.id)
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        username: Option<&str>,
        body: Option<Value>,
    ) -> TestResult<Response> {
        let mut builder = Request::builder().method(method).uri(uri).header(HOST, HOST_NAME);
        if let Some(username) = username {
            builder = builder.header(AUTHORIZATION, basic(username));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> TestResult<Response> {
        let response = self.router().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await?.to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };

        Ok(Response {
            status,
            headers,
            body,
        })
    }

    async fn stored_survey(&self, setting_id: i64) -> TestResult<Option<i64>> {
        let setting = self
            .state
            .calendar_settings
            .find(Visibility::All, setting_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("setting {setting_id} missing"))?;
        Ok(setting.survey_id)
    }
}

fn basic(username: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{PASSWORD}")))
}

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2013, 12, 2, hour, 0, 0).unwrap()
}

fn link(path: &str) -> String {
    format!("http://{HOST_NAME}{path}")
}

mod calendar_settings {
    use super::*;

    #[tokio::test]
    async fn bare_id_not_owned_by_caller_is_cleared() -> TestResult {
        let ctx = TestContext::new().await?;
        let manager = ctx.user("manager").await?;
        let other = ctx.user("other").await?;
        let foreign = ctx.state.references.create_survey(other, "foreign").await?;
        let setting = ctx.setting(manager, "reminders").await?;

        let response = ctx
            .send(
                Method::PATCH,
                &format!("/rest-api/calendar-setting/{setting}/"),
                Some("manager"),
                Some(json!({ "survey": foreign.id.to_string() })),
            )
            .await?;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["survey"], Value::Null);
        assert_eq!(ctx.stored_survey(setting).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn bare_id_owned_by_caller_resolves_to_hyperlink() -> TestResult {
        let ctx = TestContext::new().await?;
        let manager = ctx.user("manager").await?;
        let survey = ctx.state.references.create_survey(manager, "mine").await?;
        let setting = ctx.setting(manager, "reminders").await?;

        let response = ctx
            .send(
                Method::PATCH,
                &format!("/rest-api/calendar-setting/{setting}/"),
                Some("manager"),
                Some(json!({ "survey": survey.id })),
            )
            .await?;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.body["survey"],
            link(&format!("/rest-api/sealed-survey/{}/", survey.id))
        );
        assert_eq!(ctx.stored_survey(setting).await?, Some(survey.id));
        Ok(())
    }

    #[tokio::test]
    async fn full_hyperlink_passes_through_unmodified() -> TestResult {
        let ctx = TestContext::new().await?;
        let manager = ctx.user("manager").await?;
        let survey = ctx.state.references.create_survey(manager, "mine").await?;
        let setting = ctx.setting(manager, "reminders").await?;
        let hyperlink = link(&format!("/rest-api/sealed-survey/{}/", survey.id));

        let response = ctx
            .send(
                Method::PATCH,
                &format!("/rest-api/calendar-setting/{setting}/"),
                Some("manager"),
                Some(json!({ "survey": hyperlink })),
            )
            .await?;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["survey"], hyperlink);
        assert_eq!(ctx.stored_survey(setting).await?, Some(survey.id));
        Ok(())
    }

    #[tokio::test]
    async fn hyperlink_outside_choice_set_is_rejected() -> TestResult {
        let ctx = TestContext::new().await?;
        let manager = ctx.user("manager").await?;
        let other = ctx.user("other").await?;
        let foreign = ctx.state.references.create_survey(other, "foreign").await?;
        let setting = ctx.setting(manager, "reminders").await?;

        let response = ctx
            .send(
                Method::PATCH,
                &format!("/rest-api/calendar-setting/{setting}/"),
                Some("manager"),
                Some(json!({ "survey": link(&format!("/rest-api/sealed-survey/{}/", foreign.id)) })),
            )
            .await?;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.body["fields"]["survey"].is_array());

        let wrong_target = ctx
            .send(
                Method::PATCH,
                &format!("/rest-api/calendar-setting/{setting}/"),
                Some("manager"),
                Some(json!({ "survey": link("/rest-api/gateway/1/") })),
            )
            .await?;
        assert_eq!(wrong_target.status, StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn strict_references_reject_unresolvable_ids() -> TestResult {
        let mut config = AppConfig::default();
        config.api.strict_references = true;
        let ctx = TestContext::with_config(config).await?;
        let manager = ctx.user("manager").await?;
        let setting = ctx.setting(manager, "reminders").await?;

        let response = ctx
            .send(
                Method::PATCH,
                &format!("/rest-api/calendar-setting/{setting}/"),
                Some("manager"),
                Some(json!({ "sms_gateway": "999" })),
            )
            .await?;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.body["fields"]["sms_gateway"].is_array());
        Ok(())
    }

    #[tokio::test]
    async fn gateways_resolve_within_profile_and_sms_gateways_globally() -> TestResult {
        let ctx = TestContext::new().await?;
        let manager = ctx.user("manager").await?;
        let attached = ctx.state.references.create_gateway("attached").await?;
        let detached = ctx.state.references.create_gateway("detached").await?;
        ctx.state.references.attach_gateway(manager, attached.id).await?;
        let sms = ctx.state.references.create_sms_gateway("sms").await?;

        let created = ctx
            .send(
                Method::POST,
                "/rest-api/calendar-setting/",
                Some("manager"),
                Some(json!({
                    "label": "reminders",
                    "callerid": "123456",
                    "caller_name": "xyz",
                    "aleg_gateway": attached.id.to_string(),
                    "sms_gateway": sms.id.to_string(),
                })),
            )
            .await?;

        assert_eq!(created.status, StatusCode::CREATED);
        assert_eq!(
            created.body["aleg_gateway"],
            link(&format!("/rest-api/gateway/{}/", attached.id))
        );
        assert_eq!(
            created.body["sms_gateway"],
            link(&format!("/rest-api/sms-gateway/{}/", sms.id))
        );
        assert_eq!(created.body["user"], "manager");
        assert_eq!(created.body["call_timeout"], 60);
        let url = created.body["url"].as_str().unwrap_or_default().to_string();
        assert_eq!(created.headers.get(LOCATION).and_then(|v| v.to_str().ok()), Some(url.as_str()));

        let path = url.trim_start_matches(&format!("http://{HOST_NAME}"));
        let cleared = ctx
            .send(
                Method::PATCH,
                path,
                Some("manager"),
                Some(json!({ "aleg_gateway": detached.id })),
            )
            .await?;
        assert_eq!(cleared.status, StatusCode::OK);
        assert_eq!(cleared.body["aleg_gateway"], Value::Null);
        assert_eq!(cleared.body["sms_gateway"], created.body["sms_gateway"]);
        Ok(())
    }

    #[tokio::test]
    async fn voicemail_audio_follows_amd_flag() -> TestResult {
        let ctx = TestContext::new().await?;
        let manager = ctx.user("manager").await?;
        let audio = ctx.state.references.create_audio_file(manager, "greeting").await?;
        let setting = ctx.setting(manager, "reminders").await?;
        let uri = format!("/rest-api/calendar-setting/{setting}/");

        let disabled = ctx
            .send(Method::PATCH, &uri, Some("manager"), Some(json!({ "voicemail_audiofile": audio.id })))
            .await?;
        assert_eq!(disabled.status, StatusCode::OK);
        assert_eq!(disabled.body["voicemail_audiofile"], Value::Null);

        let mut config = AppConfig::default();
        config.features.amd = true;
        let amd = AppState::new(ctx.pool.clone(), &config);
        let request = Request::builder()
            .method(Method::PATCH)
            .uri(&uri)
            .header(HOST, HOST_NAME)
            .header(AUTHORIZATION, basic("manager"))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "voicemail_audiofile": audio.id }).to_string()))?;
        let response = create_router(amd).oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(&response.into_body().collect().await?.to_bytes())?;
        assert_eq!(
            body["voicemail_audiofile"],
            link(&format!("/rest-api/audio_files/{}/", audio.id))
        );
        Ok(())
    }

    #[tokio::test]
    async fn put_clears_absent_references_and_patch_keeps_them() -> TestResult {
        let ctx = TestContext::new().await?;
        let manager = ctx.user("manager").await?;
        let survey = ctx.state.references.create_survey(manager, "mine").await?;
        let setting = ctx.setting(manager, "reminders").await?;
        let uri = format!("/rest-api/calendar-setting/{setting}/");

        ctx.send(Method::PATCH, &uri, Some("manager"), Some(json!({ "survey": survey.id })))
            .await?;
        let patched = ctx
            .send(Method::PATCH, &uri, Some("manager"), Some(json!({ "caller_name": "clinic" })))
            .await?;
        assert_eq!(patched.body["caller_name"], "clinic");
        assert_ne!(patched.body["survey"], Value::Null);

        let missing_label = ctx
            .send(Method::PUT, &uri, Some("manager"), Some(json!({ "callerid": "1" })))
            .await?;
        assert_eq!(missing_label.status, StatusCode::BAD_REQUEST);
        assert!(missing_label.body["fields"]["label"].is_array());

        let replaced = ctx
            .send(Method::PUT, &uri, Some("manager"), Some(json!({ "label": "renamed" })))
            .await?;
        assert_eq!(replaced.status, StatusCode::OK);
        assert_eq!(replaced.body["label"], "renamed");
        assert_eq!(replaced.body["survey"], Value::Null);
        Ok(())
    }

    #[tokio::test]
    async fn create_validates_payload() -> TestResult {
        let ctx = TestContext::new().await?;
        ctx.user("manager").await?;

        let response = ctx
            .send(
                Method::POST,
                "/rest-api/calendar-setting/",
                Some("manager"),
                Some(json!({ "call_timeout": 0 })),
            )
            .await?;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.body["fields"]["label"].is_array());
        assert!(response.body["fields"]["call_timeout"].is_array());

        let malformed = Request::builder()
            .method(Method::POST)
            .uri("/rest-api/calendar-setting/")
            .header(AUTHORIZATION, basic("manager"))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))?;
        let response = ctx.dispatch(malformed).await?;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.body["error"].is_string());
        Ok(())
    }

    #[tokio::test]
    async fn anonymous_callers_read_nothing_and_cannot_write() -> TestResult {
        let ctx = TestContext::new().await?;
        let manager = ctx.user("manager").await?;
        let setting = ctx.setting(manager, "reminders").await?;

        let list = ctx.send(Method::GET, "/rest-api/calendar-setting/", None, None).await?;
        assert_eq!(list.status, StatusCode::OK);
        assert_eq!(list.body["count"], 0);

        let create = ctx
            .send(Method::POST, "/rest-api/calendar-setting/", None, Some(json!({ "label": "x" })))
            .await?;
        assert_eq!(create.status, StatusCode::UNAUTHORIZED);

        let delete = ctx
            .send(Method::DELETE, &format!("/rest-api/calendar-setting/{setting}/"), None, None)
            .await?;
        assert_eq!(delete.status, StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn settings_are_scoped_to_owner_unless_superuser() -> TestResult {
        let ctx = TestContext::new().await?;
        let manager = ctx.user("manager").await?;
        let other = ctx.user("other").await?;
        ctx.account("root", true, None).await?;
        let mine = ctx.setting(manager, "mine").await?;
        let theirs = ctx.setting(other, "theirs").await?;

        let list = ctx.send(Method::GET, "/rest-api/calendar-setting/", Some("manager"), None).await?;
        assert_eq!(list.body["count"], 1);
        assert_eq!(
            list.body["results"][0]["url"],
            link(&format!("/rest-api/calendar-setting/{mine}/"))
        );

        let hidden = ctx
            .send(Method::GET, &format!("/rest-api/calendar-setting/{theirs}/"), Some("manager"), None)
            .await?;
        assert_eq!(hidden.status, StatusCode::NOT_FOUND);

        let admin = ctx.send(Method::GET, "/rest-api/calendar-setting/", Some("root"), None).await?;
        assert_eq!(admin.body["count"], 2);

        let deleted = ctx
            .send(Method::DELETE, &format!("/rest-api/calendar-setting/{mine}/"), Some("manager"), None)
            .await?;
        assert_eq!(deleted.status, StatusCode::NO_CONTENT);
        Ok(())
    }

    #[tokio::test]
    async fn list_is_paginated() -> TestResult {
        let mut config = AppConfig::default();
        config.api.page_size = 2;
        let ctx = TestContext::with_config(config).await?;
        let manager = ctx.user("manager").await?;
        for label in ["a", "b", "c"] {
            ctx.setting(manager, label).await?;
        }

        let first = ctx.send(Method::GET, "/rest-api/calendar-setting/", Some("manager"), None).await?;
        assert_eq!(first.body["count"], 3);
        assert_eq!(first.body["results"].as_array().map(Vec::len), Some(2));
        assert_eq!(first.body["next"], link("/rest-api/calendar-setting/?page=2"));
        assert_eq!(first.body["previous"], Value::Null);

        let second = ctx
            .send(Method::GET, "/rest-api/calendar-setting/?page=2", Some("manager"), None)
            .await?;
        assert_eq!(second.body["results"].as_array().map(Vec::len), Some(1));
        assert_eq!(second.body["next"], Value::Null);

        let beyond = ctx
            .send(Method::GET, "/rest-api/calendar-setting/?page=3", Some("manager"), None)
            .await?;
        assert_eq!(beyond.status, StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn options_lists_caller_choices() -> TestResult {
        let ctx = TestContext::new().await?;
        let manager = ctx.user("manager").await?;
        let other = ctx.user("other").await?;
        ctx.state.references.create_survey(manager, "mine").await?;
        ctx.state.references.create_survey(other, "theirs").await?;
        ctx.state.references.create_sms_gateway("global").await?;

        let response = ctx
            .send(Method::OPTIONS, "/rest-api/calendar-setting/", Some("manager"), None)
            .await?;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["survey"].as_array().map(Vec::len), Some(1));
        assert_eq!(response.body["survey"][0]["display_name"], "mine");
        assert_eq!(response.body["sms_gateway"][0]["display_name"], "global");
        assert_eq!(response.body["aleg_gateway"], json!([]));
        Ok(())
    }

    #[tokio::test]
    async fn cors_preflight_is_answered_without_choices() -> TestResult {
        let ctx = TestContext::new().await?;
        ctx.user("manager").await?;

        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .uri("/rest-api/calendar-setting/")
            .header(HOST, HOST_NAME)
            .header(ORIGIN, "http://dialer.example")
            .header(ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())?;
        let response = ctx.dispatch(preflight).await?;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).and_then(|v| v.to_str().ok()),
            Some("http://dialer.example")
        );
        assert!(response.body.get("survey").is_none());

        let cross_origin = Request::builder()
            .method(Method::OPTIONS)
            .uri("/rest-api/calendar-setting/")
            .header(HOST, HOST_NAME)
            .header(ORIGIN, "http://dialer.example")
            .header(AUTHORIZATION, basic("manager"))
            .body(Body::empty())?;
        let response = ctx.dispatch(cross_origin).await?;

        assert_eq!(response.status, StatusCode::OK);
        assert!(response.body["survey"].is_array());
        Ok(())
    }
}

mod events {
    use super::*;

    struct Scenario {
        ctx: TestContext,
        calendar_user: i64,
        stranger: i64,
    }

    /// `manager` administers `agent`; `stranger` is unrelated
    async fn scenario() -> TestResult<Scenario> {
        let ctx = TestContext::new().await?;
        let manager = ctx.user("manager").await?;
        let calendar_user = ctx.account("agent", false, Some(manager)).await?;
        let stranger = ctx.user("stranger").await?;
        ctx.account("root", true, None).await?;
        Ok(Scenario {
            ctx,
            calendar_user,
            stranger,
        })
    }

    #[tokio::test]
    async fn list_is_scoped_to_administered_calendar_users() -> TestResult {
        let Scenario { ctx, calendar_user, stranger } = scenario().await?;
        let visible = ctx.event(calendar_user, "visit", None).await?;
        ctx.event(stranger, "elsewhere", None).await?;

        let response = ctx.send(Method::GET, "/rest-api/event/", Some("manager"), None).await?;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["count"], 1);
        assert_eq!(
            response.body["results"][0]["url"],
            link(&format!("/rest-api/event/{visible}/"))
        );
        assert_eq!(response.body["results"][0]["creator"], "agent");

        let admin = ctx.send(Method::GET, "/rest-api/event/", Some("root"), None).await?;
        assert_eq!(admin.body["count"], 2);

        let anonymous = ctx.send(Method::GET, "/rest-api/event/", None, None).await?;
        assert_eq!(anonymous.body["count"], 0);
        Ok(())
    }

    #[tokio::test]
    async fn events_outside_scope_are_not_found() -> TestResult {
        let Scenario { ctx, stranger, .. } = scenario().await?;
        let hidden = ctx.event(stranger, "elsewhere", None).await?;

        let get = ctx
            .send(Method::GET, &format!("/rest-api/event/{hidden}/"), Some("manager"), None)
            .await?;
        assert_eq!(get.status, StatusCode::NOT_FOUND);

        let status = ctx
            .send(
                Method::PATCH,
                &format!("/rest-api/event/{hidden}/updat_event_status/"),
                Some("manager"),
                Some(json!({ "status": "2" })),
            )
            .await?;
        assert_eq!(status.status, StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn update_status_stores_value_verbatim() -> TestResult {
        let Scenario { ctx, calendar_user, .. } = scenario().await?;
        let event = ctx.event(calendar_user, "visit", None).await?;
        let uri = format!("/rest-api/event/{event}/updat_event_status/");

        let response = ctx
            .send(Method::PATCH, &uri, Some("manager"), Some(json!({ "status": "X" })))
            .await?;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, json!({ "status": "event status has been updated" }));

        let stored = ctx.state.events.find(Visibility::All, event).await?;
        assert_eq!(stored.map(|e| e.status), Some("X".to_string()));

        ctx.send(Method::PATCH, &uri, Some("manager"), Some(json!({ "status": 3 })))
            .await?;
        let stored = ctx.state.events.find(Visibility::All, event).await?;
        assert_eq!(stored.map(|e| e.status), Some("3".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn update_status_requires_status_and_authentication() -> TestResult {
        let Scenario { ctx, calendar_user, .. } = scenario().await?;
        let event = ctx.event(calendar_user, "visit", None).await?;
        let uri = format!("/rest-api/event/{event}/updat_event_status/");

        let missing = ctx
            .send(Method::PATCH, &uri, Some("manager"), Some(json!({ "state": "X" })))
            .await?;
        assert_eq!(missing.status, StatusCode::BAD_REQUEST);
        assert!(missing.body["fields"]["status"].is_array());

        let anonymous = ctx
            .send(Method::PATCH, &uri, None, Some(json!({ "status": "X" })))
            .await?;
        assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn conditional_status_update_detects_stale_writes() -> TestResult {
        let Scenario { ctx, calendar_user, .. } = scenario().await?;
        let event = ctx.event(calendar_user, "visit", None).await?;
        let uri = format!("/rest-api/event/{event}/updat_event_status/");

        let first = ctx
            .send(
                Method::PATCH,
                &uri,
                Some("manager"),
                Some(json!({ "status": "2", "expected_status": "1" })),
            )
            .await?;
        assert_eq!(first.status, StatusCode::OK);

        let stale = ctx
            .send(
                Method::PATCH,
                &uri,
                Some("manager"),
                Some(json!({ "status": "3", "expected_status": "1" })),
            )
            .await?;
        assert_eq!(stale.status, StatusCode::CONFLICT);

        let stored = ctx.state.events.find(Visibility::All, event).await?;
        assert_eq!(stored.map(|e| e.status), Some("2".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn child_listing_returns_structured_entries() -> TestResult {
        let Scenario { ctx, calendar_user, stranger } = scenario().await?;
        let parent = ctx.event(calendar_user, "parent", None).await?;
        let tricky = r#"Call "Bob" {urgent}, it's 'late'"#;
        let child = ctx.event(calendar_user, tricky, Some(parent)).await?;
        let second = ctx.event(calendar_user, "follow-up", Some(parent)).await?;
        ctx.event(stranger, "foreign child", Some(parent)).await?;

        let response = ctx
            .send(
                Method::GET,
                &format!("/rest-api/event/{parent}/get_list_child/"),
                Some("manager"),
                None,
            )
            .await?;

        assert_eq!(response.status, StatusCode::OK);
        let entries = response.body.as_array().cloned().unwrap_or_default();
        assert_eq!(entries.len(), 2);

        let first = entries
            .iter()
            .find(|entry| entry["url"] == link(&format!("/rest-api/event/{child}/")))
            .ok_or_else(|| anyhow::anyhow!("child {child} missing"))?;
        assert_eq!(first["title"], tricky);
        assert_eq!(first["description"], format!("{tricky} notes"));
        let start: DateTime<Utc> = serde_json::from_value(first["start"].clone())?;
        let end: DateTime<Utc> = serde_json::from_value(first["end"].clone())?;
        assert_eq!(start, at(9));
        assert_eq!(end, at(10));
        assert_eq!(first.as_object().map(|o| o.len()), Some(5));

        assert!(entries
            .iter()
            .any(|entry| entry["url"] == link(&format!("/rest-api/event/{second}/"))));
        Ok(())
    }

    #[tokio::test]
    async fn update_validates_times_and_parent() -> TestResult {
        let Scenario { ctx, calendar_user, stranger } = scenario().await?;
        let event = ctx.event(calendar_user, "visit", None).await?;
        let parent = ctx.event(calendar_user, "series", None).await?;
        let foreign = ctx.event(stranger, "elsewhere", None).await?;
        let uri = format!("/rest-api/event/{event}/");

        let backwards = ctx
            .send(
                Method::PATCH,
                &uri,
                Some("manager"),
                Some(json!({ "end": "2013-12-02T08:00:00Z" })),
            )
            .await?;
        assert_eq!(backwards.status, StatusCode::BAD_REQUEST);
        assert!(backwards.body["fields"]["end"].is_array());

        let own_parent = ctx
            .send(Method::PATCH, &uri, Some("manager"), Some(json!({ "parent_event": event })))
            .await?;
        assert_eq!(own_parent.status, StatusCode::BAD_REQUEST);

        let hidden_parent = ctx
            .send(Method::PATCH, &uri, Some("manager"), Some(json!({ "parent_event": foreign })))
            .await?;
        assert_eq!(hidden_parent.status, StatusCode::BAD_REQUEST);

        let updated = ctx
            .send(
                Method::PATCH,
                &uri,
                Some("manager"),
                Some(json!({
                    "title": "moved",
                    "parent_event": link(&format!("/rest-api/event/{parent}/")),
                })),
            )
            .await?;
        assert_eq!(updated.status, StatusCode::OK);
        assert_eq!(updated.body["title"], "moved");
        assert_eq!(updated.body["parent_event"], link(&format!("/rest-api/event/{parent}/")));
        Ok(())
    }

    #[tokio::test]
    async fn parent_assignment_stays_one_level_deep() -> TestResult {
        let Scenario { ctx, calendar_user, .. } = scenario().await?;
        let root = ctx.event(calendar_user, "series", None).await?;
        let child = ctx.event(calendar_user, "visit", Some(root)).await?;
        let loose = ctx.event(calendar_user, "call", None).await?;

        let under_child = ctx
            .send(
                Method::PATCH,
                &format!("/rest-api/event/{loose}/"),
                Some("manager"),
                Some(json!({ "parent_event": link(&format!("/rest-api/event/{child}/")) })),
            )
            .await?;
        assert_eq!(under_child.status, StatusCode::BAD_REQUEST);
        assert!(under_child.body["fields"]["parent_event"].is_array());

        let parent_under_loose = ctx
            .send(
                Method::PATCH,
                &format!("/rest-api/event/{root}/"),
                Some("manager"),
                Some(json!({ "parent_event": loose })),
            )
            .await?;
        assert_eq!(parent_under_loose.status, StatusCode::BAD_REQUEST);
        assert!(parent_under_loose.body["fields"]["parent_event"].is_array());

        let stored = ctx.state.events.find(Visibility::All, loose).await?;
        assert_eq!(stored.and_then(|e| e.parent_event_id), None);
        let stored = ctx.state.events.find(Visibility::All, root).await?;
        assert_eq!(stored.and_then(|e| e.parent_event_id), None);
        Ok(())
    }

    #[tokio::test]
    async fn parent_assignment_rejects_cycles() -> TestResult {
        let Scenario { ctx, calendar_user, .. } = scenario().await?;
        let first = ctx.event(calendar_user, "first", None).await?;
        let second = ctx.event(calendar_user, "second", Some(first)).await?;

        let cycle = ctx
            .send(
                Method::PATCH,
                &format!("/rest-api/event/{first}/"),
                Some("manager"),
                Some(json!({ "parent_event": link(&format!("/rest-api/event/{second}/")) })),
            )
            .await?;
        assert_eq!(cycle.status, StatusCode::BAD_REQUEST);
        assert!(cycle.body["fields"]["parent_event"].is_array());

        let children = ctx
            .send(
                Method::GET,
                &format!("/rest-api/event/{first}/get_list_child/"),
                Some("manager"),
                None,
            )
            .await?;
        assert_eq!(children.status, StatusCode::OK);
        let entries = children.body.as_array().cloned().unwrap_or_default();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["url"], link(&format!("/rest-api/event/{second}/")));

        let orphaned = ctx
            .send(
                Method::PATCH,
                &format!("/rest-api/event/{second}/"),
                Some("manager"),
                Some(json!({ "parent_event": null })),
            )
            .await?;
        assert_eq!(orphaned.status, StatusCode::OK);
        assert_eq!(orphaned.body["parent_event"], Value::Null);
        Ok(())
    }

    #[tokio::test]
    async fn put_requires_core_fields() -> TestResult {
        let Scenario { ctx, calendar_user, .. } = scenario().await?;
        let event = ctx.event(calendar_user, "visit", None).await?;

        let response = ctx
            .send(
                Method::PUT,
                &format!("/rest-api/event/{event}/"),
                Some("manager"),
                Some(json!({ "description": "only this" })),
            )
            .await?;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        for field in ["title", "start", "end"] {
            assert!(response.body["fields"][field].is_array(), "{field} should be required");
        }
        Ok(())
    }

    #[tokio::test]
    async fn delete_removes_event_and_children() -> TestResult {
        let Scenario { ctx, calendar_user, .. } = scenario().await?;
        let parent = ctx.event(calendar_user, "parent", None).await?;
        let child = ctx.event(calendar_user, "child", Some(parent)).await?;

        let response = ctx
            .send(Method::DELETE, &format!("/rest-api/event/{parent}/"), Some("manager"), None)
            .await?;
        assert_eq!(response.status, StatusCode::NO_CONTENT);

        let gone = ctx
            .send(Method::GET, &format!("/rest-api/event/{child}/"), Some("manager"), None)
            .await?;
        assert_eq!(gone.status, StatusCode::NOT_FOUND);
        Ok(())
    }
}

mod auth {
    use super::*;

    #[tokio::test]
    async fn login_issues_token_usable_as_bearer_and_cookie() -> TestResult {
        let ctx = TestContext::new().await?;
        let manager = ctx.user("manager").await?;
        ctx.setting(manager, "mine").await?;

        let login = ctx
            .send(
                Method::POST,
                "/rest-api/auth/login/",
                None,
                Some(json!({ "username": "manager", "password": PASSWORD })),
            )
            .await?;
        assert_eq!(login.status, StatusCode::OK);
        assert_eq!(login.body["user"]["username"], "manager");
        let token = login.body["token"].as_str().unwrap_or_default().to_string();
        let cookie = login
            .headers
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(cookie.starts_with(&format!("sessionid={token}")));

        let bearer = Request::builder()
            .uri("/rest-api/calendar-setting/")
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())?;
        assert_eq!(ctx.dispatch(bearer).await?.body["count"], 1);

        let with_cookie = Request::builder()
            .uri("/rest-api/calendar-setting/")
            .header(COOKIE, format!("sessionid={token}"))
            .body(Body::empty())?;
        assert_eq!(ctx.dispatch(with_cookie).await?.body["count"], 1);

        let logout = Request::builder()
            .method(Method::POST)
            .uri("/rest-api/auth/logout/")
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())?;
        assert_eq!(ctx.dispatch(logout).await?.status, StatusCode::NO_CONTENT);

        let revoked = Request::builder()
            .uri("/rest-api/calendar-setting/")
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())?;
        assert_eq!(ctx.dispatch(revoked).await?.status, StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_credentials_are_rejected() -> TestResult {
        let ctx = TestContext::new().await?;
        ctx.user("manager").await?;

        let login = ctx
            .send(
                Method::POST,
                "/rest-api/auth/login/",
                None,
                Some(json!({ "username": "manager", "password": "wrong" })),
            )
            .await?;
        assert_eq!(login.status, StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .uri("/rest-api/event/")
            .header(
                AUTHORIZATION,
                format!("Basic {}", STANDARD.encode("manager:wrong")),
            )
            .body(Body::empty())?;
        assert_eq!(ctx.dispatch(request).await?.status, StatusCode::UNAUTHORIZED);
        Ok(())
    }
}

mod service {
    use super::*;

    #[tokio::test]
    async fn health_reports_database() -> TestResult {
        let ctx = TestContext::new().await?;
        let response = ctx.send(Method::GET, "/health", None, None).await?;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["status"], "ok");
        assert_eq!(response.body["database"], "ok");
        Ok(())
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    async fn openapi_document_is_served() -> TestResult {
        let ctx = TestContext::new().await?;
        let response = ctx.send(Method::GET, "/api-docs/openapi.json", None, None).await?;

        assert_eq!(response.status, StatusCode::OK);
        assert!(response.body["paths"]["/rest-api/event/{id}/get_list_child/"].is_object());
        Ok(())
    }
}
