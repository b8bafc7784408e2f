//! Calendar setting entity definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Per-user outbound call configuration for appointment reminders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CalendarSetting {
    pub id: i64,
    pub user_id: i64,
    /// Owner username, joined from `users`
    pub username: String,
    pub label: String,
    pub callerid: String,
    pub caller_name: String,
    pub call_timeout: i64,
    pub survey_id: Option<i64>,
    pub aleg_gateway_id: Option<i64>,
    pub sms_gateway_id: Option<i64>,
    pub voicemail: bool,
    pub amd_behavior: Option<i64>,
    pub voicemail_audiofile_id: Option<i64>,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

/// Writable columns of a calendar setting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarSettingValues {
    pub label: String,
    pub callerid: String,
    pub caller_name: String,
    pub call_timeout: i64,
    pub survey_id: Option<i64>,
    pub aleg_gateway_id: Option<i64>,
    pub sms_gateway_id: Option<i64>,
    pub voicemail: bool,
    pub amd_behavior: Option<i64>,
    pub voicemail_audiofile_id: Option<i64>,
}

impl Default for CalendarSettingValues {
    fn default() -> Self {
        Self {
            label: String::new(),
            callerid: String::new(),
            caller_name: String::new(),
            call_timeout: 60,
            survey_id: None,
            aleg_gateway_id: None,
            sms_gateway_id: None,
            voicemail: false,
            amd_behavior: None,
            voicemail_audiofile_id: None,
        }
    }
}

impl From<&CalendarSetting> for CalendarSettingValues {
    fn from(setting: &CalendarSetting) -> Self {
        Self {
            label: setting.label.clone(),
            callerid: setting.callerid.clone(),
            caller_name: setting.caller_name.clone(),
            call_timeout: setting.call_timeout,
            survey_id: setting.survey_id,
            aleg_gateway_id: setting.aleg_gateway_id,
            sms_gateway_id: setting.sms_gateway_id,
            voicemail: setting.voicemail,
            amd_behavior: setting.amd_behavior,
            voicemail_audiofile_id: setting.voicemail_audiofile_id,
        }
    }
}
