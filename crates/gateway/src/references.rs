//! Normalisation of calendar-setting reference fields.
//!
//! A reference may be submitted as a full hyperlink, a server-relative path
//! or a bare numeric id. Bare ids are looked up in the caller's own records
//! and rewritten to the canonical path; links are checked against the same
//! caller-scoped choice set.

use dialer_database::{DatabaseResult, ReferenceRepository, User};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::hyperlink::{is_hyperlink, parse_link, LinkBase, Resource};
use crate::state::AppState;

/// Reference columns of a calendar setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceField {
    Survey,
    AlegGateway,
    SmsGateway,
    VoicemailAudiofile,
}

impl ReferenceField {
    pub const ALL: [ReferenceField; 4] = [
        ReferenceField::Survey,
        ReferenceField::AlegGateway,
        ReferenceField::SmsGateway,
        ReferenceField::VoicemailAudiofile,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReferenceField::Survey => "survey",
            ReferenceField::AlegGateway => "aleg_gateway",
            ReferenceField::SmsGateway => "sms_gateway",
            ReferenceField::VoicemailAudiofile => "voicemail_audiofile",
        }
    }

    pub fn resource(self) -> Resource {
        match self {
            ReferenceField::Survey => Resource::Survey,
            ReferenceField::AlegGateway => Resource::Gateway,
            ReferenceField::SmsGateway => Resource::SmsGateway,
            ReferenceField::VoicemailAudiofile => Resource::AudioFile,
        }
    }
}

/// Result of looking up a bare reference id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Canonical server-relative path of the record
    Resolved(String),
    NotFound,
    /// The record exists but is outside the caller's choice set
    NotOwned,
    /// Not an identifier at all
    Malformed,
    /// Lookups for this field are switched off
    Unavailable,
}

impl Resolution {
    fn reason(&self) -> &'static str {
        match self {
            Resolution::Resolved(_) => "resolved",
            Resolution::NotFound => "no record with this id",
            Resolution::NotOwned => "record is not available to this user",
            Resolution::Malformed => "not a valid identifier",
            Resolution::Unavailable => "answering machine detection is disabled",
        }
    }
}

/// One selectable value of a reference field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Choice {
    pub value: String,
    pub display_name: String,
}

pub struct ReferenceResolver<'a> {
    references: &'a ReferenceRepository,
    caller_id: i64,
    amd_enabled: bool,
    strict: bool,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(state: &'a AppState, caller: &User) -> Self {
        Self {
            references: &state.references,
            caller_id: caller.id,
            amd_enabled: state.features.amd,
            strict: state.api.strict_references,
        }
    }

    /// Look up a bare identifier in the caller's view of `field`'s collection
    pub async fn resolve_bare(&self, field: ReferenceField, raw: &str) -> DatabaseResult<Resolution> {
        let Some(id) = raw.trim().parse::<i64>().ok().filter(|id| *id > 0) else {
            return Ok(Resolution::Malformed);
        };

        let resolution = match field {
            ReferenceField::Survey => match self.references.find_survey(id).await? {
                None => Resolution::NotFound,
                Some(survey) if survey.user_id != self.caller_id => Resolution::NotOwned,
                Some(_) => Resolution::Resolved(Resource::Survey.path(id)),
            },
            ReferenceField::AlegGateway => {
                if self.references.find_gateway(id).await?.is_none() {
                    Resolution::NotFound
                } else if !self.references.profile_has_gateway(self.caller_id, id).await? {
                    Resolution::NotOwned
                } else {
                    Resolution::Resolved(Resource::Gateway.path(id))
                }
            }
            ReferenceField::SmsGateway => match self.references.find_sms_gateway(id).await? {
                None => Resolution::NotFound,
                Some(_) => Resolution::Resolved(Resource::SmsGateway.path(id)),
            },
            ReferenceField::VoicemailAudiofile if !self.amd_enabled => Resolution::Unavailable,
            ReferenceField::VoicemailAudiofile => match self.references.find_audio_file(id).await? {
                None => Resolution::NotFound,
                Some(audio) if audio.user_id != self.caller_id => Resolution::NotOwned,
                Some(_) => Resolution::Resolved(Resource::AudioFile.path(id)),
            },
        };

        Ok(resolution)
    }

    /// Rewrite a submitted value into a link, or `None` to clear the field.
    ///
    /// Hyperlinks and paths are returned unmodified. Bare ids that cannot be
    /// resolved clear the field, or fail the request in strict mode.
    pub async fn normalise(&self, field: ReferenceField, value: &Value) -> ApiResult<Option<String>> {
        let raw = match value {
            Value::Null => return Ok(None),
            Value::String(text) if text.trim().is_empty() => return Ok(None),
            Value::String(text) if is_hyperlink(text) || text.starts_with('/') => {
                return Ok(Some(text.clone()));
            }
            Value::String(text) => text.clone(),
            Value::Number(number) => number.to_string(),
            other => other.to_string(),
        };

        match self.resolve_bare(field, &raw).await? {
            Resolution::Resolved(path) => {
                debug!(field = field.name(), raw = %raw, path = %path, "resolved bare reference");
                Ok(Some(path))
            }
            failure if self.strict => Err(ApiError::field(field.name(), failure.reason())),
            failure => {
                warn!(
                    field = field.name(),
                    raw = %raw,
                    reason = failure.reason(),
                    "clearing unresolvable reference"
                );
                Ok(None)
            }
        }
    }

    /// Check a link against the caller's choice set and return the record id
    pub async fn validate(&self, field: ReferenceField, link: &str) -> ApiResult<i64> {
        let Some(id) = parse_link(link, field.resource()) else {
            return Err(ApiError::field(
                field.name(),
                "Invalid hyperlink - incorrect URL match.",
            ));
        };

        if !self.in_choice_set(field, id).await? {
            return Err(ApiError::field(
                field.name(),
                "Invalid hyperlink - object does not exist.",
            ));
        }

        Ok(id)
    }

    /// [`normalise`](Self::normalise) then [`validate`](Self::validate)
    pub async fn apply(&self, field: ReferenceField, value: &Value) -> ApiResult<Option<i64>> {
        match self.normalise(field, value).await? {
            None => Ok(None),
            Some(link) => self.validate(field, &link).await.map(Some),
        }
    }

    async fn in_choice_set(&self, field: ReferenceField, id: i64) -> DatabaseResult<bool> {
        let member = match field {
            ReferenceField::Survey => self
                .references
                .find_survey(id)
                .await?
                .is_some_and(|survey| survey.user_id == self.caller_id),
            ReferenceField::AlegGateway => {
                self.references.profile_has_gateway(self.caller_id, id).await?
            }
            ReferenceField::SmsGateway => self.references.find_sms_gateway(id).await?.is_some(),
            ReferenceField::VoicemailAudiofile => self
                .references
                .find_audio_file(id)
                .await?
                .is_some_and(|audio| audio.user_id == self.caller_id),
        };

        Ok(member)
    }

    /// Every value the caller may pick for `field`, as absolute links
    pub async fn choices(&self, field: ReferenceField, base: &LinkBase) -> DatabaseResult<Vec<Choice>> {
        let resource = field.resource();
        let rows: Vec<(i64, String)> = match field {
            ReferenceField::Survey => self
                .references
                .surveys_for_user(self.caller_id)
                .await?
                .into_iter()
                .map(|survey| (survey.id, survey.name))
                .collect(),
            ReferenceField::AlegGateway => self
                .references
                .profile_gateways(self.caller_id)
                .await?
                .into_iter()
                .map(|gateway| (gateway.id, gateway.name))
                .collect(),
            ReferenceField::SmsGateway => self
                .references
                .sms_gateways()
                .await?
                .into_iter()
                .map(|gateway| (gateway.id, gateway.name))
                .collect(),
            ReferenceField::VoicemailAudiofile => self
                .references
                .audio_files_for_user(self.caller_id)
                .await?
                .into_iter()
                .map(|audio| (audio.id, audio.name))
                .collect(),
        };

        Ok(rows
            .into_iter()
            .map(|(id, name)| Choice {
                value: base.link(resource, id),
                display_name: name,
            })
            .collect())
    }
}
