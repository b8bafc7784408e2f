//! Repository for calendar settings.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use super::visibility_clause;
use crate::entities::{CalendarSetting, CalendarSettingValues};
use crate::types::{DatabaseError, DatabaseResult, Visibility, Window};

const SELECT_SETTING: &str = "SELECT cs.id, cs.user_id, u.username, cs.label, cs.callerid, cs.caller_name,
        cs.call_timeout, cs.survey_id, cs.aleg_gateway_id, cs.sms_gateway_id, cs.voicemail,
        cs.amd_behavior, cs.voicemail_audiofile_id, cs.created_date, cs.updated_date
     FROM calendar_settings cs
     JOIN users u ON u.id = cs.user_id";

const OWNED: &str = "cs.user_id = ?";

#[derive(Clone)]
pub struct CalendarSettingRepository {
    pool: SqlitePool,
}

impl CalendarSettingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(
        &self,
        visibility: Visibility,
        window: Window,
    ) -> DatabaseResult<Vec<CalendarSetting>> {
        let (clause, owner) = visibility_clause(visibility, OWNED);
        let sql = format!("{SELECT_SETTING} WHERE {clause} ORDER BY cs.id ASC LIMIT ? OFFSET ?");

        let mut query = sqlx::query_as::<_, CalendarSetting>(&sql);
        if let Some(owner) = owner {
            query = query.bind(owner);
        }

        let settings = query
            .bind(window.limit)
            .bind(window.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(settings)
    }

    pub async fn count(&self, visibility: Visibility) -> DatabaseResult<i64> {
        let (clause, owner) = visibility_clause(visibility, OWNED);
        let sql = format!("SELECT COUNT(*) FROM calendar_settings cs WHERE {clause}");

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        if let Some(owner) = owner {
            query = query.bind(owner);
        }

        Ok(query.fetch_one(&self.pool).await?)
    }

    pub async fn find(
        &self,
        visibility: Visibility,
        id: i64,
    ) -> DatabaseResult<Option<CalendarSetting>> {
        let (clause, owner) = visibility_clause(visibility, OWNED);
        let sql = format!("{SELECT_SETTING} WHERE cs.id = ? AND {clause}");

        let mut query = sqlx::query_as::<_, CalendarSetting>(&sql).bind(id);
        if let Some(owner) = owner {
            query = query.bind(owner);
        }

        Ok(query.fetch_optional(&self.pool).await?)
    }

    pub async fn create(
        &self,
        user_id: i64,
        values: &CalendarSettingValues,
    ) -> DatabaseResult<CalendarSetting> {
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO calendar_settings (
                user_id, label, callerid, caller_name, call_timeout, survey_id, aleg_gateway_id,
                sms_gateway_id, voicemail, amd_behavior, voicemail_audiofile_id, created_date, updated_date
             )
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(&values.label)
        .bind(&values.callerid)
        .bind(&values.caller_name)
        .bind(values.call_timeout)
        .bind(values.survey_id)
        .bind(values.aleg_gateway_id)
        .bind(values.sms_gateway_id)
        .bind(values.voicemail)
        .bind(values.amd_behavior)
        .bind(values.voicemail_audiofile_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let setting_id = result.last_insert_rowid();
        info!(setting_id, user_id, label = %values.label, "created calendar setting");

        self.find(Visibility::All, setting_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("calendar setting {setting_id}")))
    }

    pub async fn update(
        &self,
        id: i64,
        values: &CalendarSettingValues,
    ) -> DatabaseResult<CalendarSetting> {
        let result = sqlx::query(
            "UPDATE calendar_settings
             SET label = ?, callerid = ?, caller_name = ?, call_timeout = ?, survey_id = ?,
                 aleg_gateway_id = ?, sms_gateway_id = ?, voicemail = ?, amd_behavior = ?,
                 voicemail_audiofile_id = ?, updated_date = ?
             WHERE id = ?",
        )
        .bind(&values.label)
        .bind(&values.callerid)
        .bind(&values.caller_name)
        .bind(values.call_timeout)
        .bind(values.survey_id)
        .bind(values.aleg_gateway_id)
        .bind(values.sms_gateway_id)
        .bind(values.voicemail)
        .bind(values.amd_behavior)
        .bind(values.voicemail_audiofile_id)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("calendar setting {id}")));
        }

        info!(setting_id = id, "updated calendar setting");

        self.find(Visibility::All, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("calendar setting {id}")))
    }

    pub async fn delete(&self, id: i64) -> DatabaseResult<()> {
        let result = sqlx::query("DELETE FROM calendar_settings WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("calendar setting {id}")));
        }

        info!(setting_id = id, "deleted calendar setting");
        Ok(())
    }
}
