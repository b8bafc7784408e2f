//! Repository for user accounts and the manager/calendar-user relation.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use crate::entities::{CalendarUserProfile, CreateUserRequest, User};
use crate::types::{DatabaseError, DatabaseResult};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, is_superuser, is_active, date_joined";

/// Repository for user database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: i64) -> DatabaseResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_username(&self, username: &str) -> DatabaseResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Create a new user
    pub async fn create(&self, request: &CreateUserRequest) -> DatabaseResult<User> {
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO users (username, email, password_hash, is_superuser, is_active, date_joined)
             VALUES (?, ?, ?, ?, 1, ?)",
        )
        .bind(&request.username)
        .bind(&request.email)
        .bind(&request.password_hash)
        .bind(request.is_superuser)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match DatabaseError::from(e) {
            DatabaseError::Duplicate(_) => {
                DatabaseError::Duplicate(format!("username {} is taken", request.username))
            }
            other => other,
        })?;

        let user_id = result.last_insert_rowid();
        info!(user_id, username = %request.username, superuser = request.is_superuser, "created user");

        self.find_by_id(user_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("user {user_id}")))
    }

    /// Ids of the calendar users administered by `manager_id`
    pub async fn calendar_user_ids(&self, manager_id: i64) -> DatabaseResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM calendar_user_profiles WHERE manager_id = ? ORDER BY user_id",
        )
        .bind(manager_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Make `user_id` a calendar user administered by `manager_id`
    pub async fn assign_manager(
        &self,
        user_id: i64,
        manager_id: i64,
        calendar_setting_id: Option<i64>,
    ) -> DatabaseResult<CalendarUserProfile> {
        sqlx::query(
            "INSERT INTO calendar_user_profiles (user_id, manager_id, calendar_setting_id)
             VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                manager_id = excluded.manager_id,
                calendar_setting_id = excluded.calendar_setting_id",
        )
        .bind(user_id)
        .bind(manager_id)
        .bind(calendar_setting_id)
        .execute(&self.pool)
        .await?;

        info!(user_id, manager_id, "assigned calendar user manager");

        let profile = sqlx::query_as::<_, CalendarUserProfile>(
            "SELECT id, user_id, manager_id, calendar_setting_id
             FROM calendar_user_profiles WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(profile)
    }
}
