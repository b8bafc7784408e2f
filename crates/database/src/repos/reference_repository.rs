//! Read access to surveys, gateways and audio files referenced by calendar settings.

use sqlx::SqlitePool;

use crate::entities::{AudioFile, Gateway, SmsGateway, Survey};
use crate::types::DatabaseResult;

#[derive(Clone)]
pub struct ReferenceRepository {
    pool: SqlitePool,
}

impl ReferenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_survey(&self, id: i64) -> DatabaseResult<Option<Survey>> {
        let survey = sqlx::query_as::<_, Survey>("SELECT id, user_id, name FROM surveys WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(survey)
    }

    pub async fn surveys_for_user(&self, user_id: i64) -> DatabaseResult<Vec<Survey>> {
        let surveys = sqlx::query_as::<_, Survey>(
            "SELECT id, user_id, name FROM surveys WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(surveys)
    }

    pub async fn find_gateway(&self, id: i64) -> DatabaseResult<Option<Gateway>> {
        let gateway = sqlx::query_as::<_, Gateway>("SELECT id, name FROM gateways WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(gateway)
    }

    /// Gateways attached to the user's profile
    pub async fn profile_gateways(&self, user_id: i64) -> DatabaseResult<Vec<Gateway>> {
        let gateways = sqlx::query_as::<_, Gateway>(
            "SELECT g.id, g.name
             FROM gateways g
             JOIN user_profile_gateways upg ON upg.gateway_id = g.id
             WHERE upg.user_id = ?
             ORDER BY g.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(gateways)
    }

    pub async fn profile_has_gateway(&self, user_id: i64, gateway_id: i64) -> DatabaseResult<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM user_profile_gateways WHERE user_id = ? AND gateway_id = ?",
        )
        .bind(user_id)
        .bind(gateway_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(found > 0)
    }

    pub async fn attach_gateway(&self, user_id: i64, gateway_id: i64) -> DatabaseResult<()> {
        sqlx::query("INSERT OR IGNORE INTO user_profile_gateways (user_id, gateway_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(gateway_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn find_sms_gateway(&self, id: i64) -> DatabaseResult<Option<SmsGateway>> {
        let gateway = sqlx::query_as::<_, SmsGateway>("SELECT id, name FROM sms_gateways WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(gateway)
    }

    pub async fn sms_gateways(&self) -> DatabaseResult<Vec<SmsGateway>> {
        let gateways = sqlx::query_as::<_, SmsGateway>("SELECT id, name FROM sms_gateways ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(gateways)
    }

    pub async fn find_audio_file(&self, id: i64) -> DatabaseResult<Option<AudioFile>> {
        let audio = sqlx::query_as::<_, AudioFile>(
            "SELECT id, user_id, name FROM audio_files WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(audio)
    }

    pub async fn audio_files_for_user(&self, user_id: i64) -> DatabaseResult<Vec<AudioFile>> {
        let files = sqlx::query_as::<_, AudioFile>(
            "SELECT id, user_id, name FROM audio_files WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(files)
    }

    pub async fn create_survey(&self, user_id: i64, name: &str) -> DatabaseResult<Survey> {
        let result = sqlx::query("INSERT INTO surveys (user_id, name) VALUES (?, ?)")
            .bind(user_id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(Survey {
            id: result.last_insert_rowid(),
            user_id,
            name: name.to_string(),
        })
    }

    pub async fn create_gateway(&self, name: &str) -> DatabaseResult<Gateway> {
        let result = sqlx::query("INSERT INTO gateways (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(Gateway {
            id: result.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    pub async fn create_sms_gateway(&self, name: &str) -> DatabaseResult<SmsGateway> {
        let result = sqlx::query("INSERT INTO sms_gateways (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(SmsGateway {
            id: result.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    pub async fn create_audio_file(&self, user_id: i64, name: &str) -> DatabaseResult<AudioFile> {
        let result = sqlx::query("INSERT INTO audio_files (user_id, name) VALUES (?, ?)")
            .bind(user_id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(AudioFile {
            id: result.last_insert_rowid(),
            user_id,
            name: name.to_string(),
        })
    }
}
