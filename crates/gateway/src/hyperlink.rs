//! Absolute hyperlinks between API resources

use std::convert::Infallible;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use url::Url;

use crate::state::AppState;

const API_ROOT: &str = "rest-api";
const API_PREFIX: &str = "/rest-api/";
const RELATIVE_BASE: &str = "http://localhost/";

/// Collections that can be the target of a hyperlink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    CalendarSetting,
    Event,
    Survey,
    Gateway,
    SmsGateway,
    AudioFile,
}

impl Resource {
    pub fn segment(self) -> &'static str {
        match self {
            Resource::CalendarSetting => "calendar-setting",
            Resource::Event => "event",
            Resource::Survey => "sealed-survey",
            Resource::Gateway => "gateway",
            Resource::SmsGateway => "sms-gateway",
            Resource::AudioFile => "audio_files",
        }
    }

    /// Server-relative path of one record, e.g. `/rest-api/gateway/3/`
    pub fn path(self, id: i64) -> String {
        format!("{API_PREFIX}{}/{id}/", self.segment())
    }

    pub fn collection_path(self) -> String {
        format!("{API_PREFIX}{}/", self.segment())
    }
}

/// Scheme and authority that hyperlinks in a response are built against.
///
/// Taken from the request `Host` header, or the configured public base url
/// when the request has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkBase(String);

impl LinkBase {
    pub fn new(base: &str) -> Self {
        Self(base.trim_end_matches('/').to_string())
    }

    pub fn from_headers(headers: &HeaderMap, fallback: &str) -> Self {
        let host = headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|host| !host.is_empty() && !host.contains(['/', ' ', '@']));

        let Some(host) = host else {
            return Self::new(fallback);
        };

        let scheme = headers
            .get("x-forwarded-proto")
            .and_then(|value| value.to_str().ok())
            .filter(|proto| proto.eq_ignore_ascii_case("https"))
            .map_or("http", |_| "https");

        Self(format!("{scheme}://{host}"))
    }

    pub fn link(&self, resource: Resource, id: i64) -> String {
        format!("{}{}", self.0, resource.path(id))
    }

    pub fn link_to(&self, path: &str) -> String {
        format!("{}{path}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl FromRequestParts<AppState> for LinkBase {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers, &state.api.public_base_url))
    }
}

/// Whether `value` is a full `http`/`https` hyperlink rather than an identifier
pub fn is_hyperlink(value: &str) -> bool {
    let lower = value.get(..8).unwrap_or(value).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Id of the `resource` record a hyperlink or server-relative path points at
pub fn parse_link(value: &str, resource: Resource) -> Option<i64> {
    let url = if is_hyperlink(value) {
        Url::parse(value).ok()?
    } else if value.starts_with('/') {
        Url::parse(RELATIVE_BASE).ok()?.join(value).ok()?
    } else {
        return None;
    };

    let segments: Vec<&str> = url.path_segments()?.collect();
    let id = match segments.as_slice() {
        [API_ROOT, segment, id] | [API_ROOT, segment, id, ""] if *segment == resource.segment() => id,
        _ => return None,
    };

    id.parse::<i64>().ok().filter(|id| *id > 0)
}
