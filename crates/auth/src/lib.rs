use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use dialer_config::AuthConfig;
use dialer_database::{CreateUserRequest, DatabaseError, User, UserRepository};
use rand::RngCore;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct Authenticator {
    pool: SqlitePool,
    users: UserRepository,
    session_ttl: Duration,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user already exists")]
    UserExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account is disabled")]
    InactiveUser,
    #[error("malformed authorization header")]
    MalformedHeader,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("repository error: {0}")]
    Repository(DatabaseError),
    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] argon2::password_hash::Error),
    #[error("session not found")]
    SessionNotFound,
    #[error("session expired")]
    SessionExpired,
    #[error("invalid session token")]
    InvalidSession,
}

impl From<DatabaseError> for AuthError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::Duplicate(_) => AuthError::UserExists,
            other => AuthError::Repository(other),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

/// Account details for [`Authenticator::register_user`]
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub is_superuser: bool,
    /// Registers the account as a calendar user administered by this user
    pub manager_id: Option<i64>,
}

impl Authenticator {
    pub fn new(pool: SqlitePool, config: AuthConfig) -> Self {
        let ttl_seconds = i64::try_from(config.session_ttl_seconds).unwrap_or(i64::MAX);
        let session_ttl = Duration::try_seconds(ttl_seconds).unwrap_or(Duration::MAX);

        Self {
            users: UserRepository::new(pool.clone()),
            pool,
            session_ttl,
        }
    }

    pub async fn register_user(&self, account: &NewAccount) -> Result<User, AuthError> {
        if self.users.find_by_username(&account.username).await?.is_some() {
            return Err(AuthError::UserExists);
        }

        let password_hash = self.hash_password(&account.password)?;
        let user = self
            .users
            .create(&CreateUserRequest {
                username: account.username.clone(),
                email: account.email.clone(),
                password_hash: Some(password_hash),
                is_superuser: account.is_superuser,
            })
            .await?;

        if let Some(manager_id) = account.manager_id {
            self.users.assign_manager(user.id, manager_id, None).await?;
        }

        Ok(user)
    }

    /// Check a username/password pair without opening a session
    pub async fn verify_credentials(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let Some(user) = self.users.find_by_username(username).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        let Some(secret) = user.password_hash.as_deref() else {
            return Err(AuthError::InvalidCredentials);
        };

        let stored_hash = PasswordHash::new(secret)?;
        Argon2::default()
            .verify_password(password.as_bytes(), &stored_hash)
            .map_err(|_| AuthError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AuthError::InactiveUser);
        }

        Ok(user)
    }

    pub async fn login_with_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let user = self.verify_credentials(username, password).await?;
        let session = self.issue_session(user.id).await?;
        info!(user_id = user.id, username, "user logged in");
        Ok(session)
    }

    /// Authenticate the credentials of an HTTP Basic `Authorization` header.
    ///
    /// `credentials` is the part after the `Basic ` scheme.
    pub async fn authenticate_basic(&self, credentials: &str) -> Result<User, AuthError> {
        let decoded = STANDARD
            .decode(credentials.trim())
            .map_err(|_| AuthError::MalformedHeader)?;
        let decoded = String::from_utf8(decoded).map_err(|_| AuthError::MalformedHeader)?;
        let (username, password) = decoded.split_once(':').ok_or(AuthError::MalformedHeader)?;

        self.verify_credentials(username, password).await
    }

    pub async fn authenticate_token(&self, token: &str) -> Result<(User, AuthSession), AuthError> {
        let row = sqlx::query("SELECT user_id, expires_at FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Err(AuthError::SessionNotFound);
        };

        let user_id: i64 = row.try_get("user_id")?;
        let expires_at: String = row.try_get("expires_at")?;

        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map_err(|_| AuthError::InvalidSession)?
            .with_timezone(&Utc);

        if expires_at <= Utc::now() {
            sqlx::query("DELETE FROM sessions WHERE token = ?")
                .bind(token)
                .execute(&self.pool)
                .await?;
            debug!(user_id, "dropped expired session");
            return Err(AuthError::SessionExpired);
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidSession)?;

        if !user.is_active {
            return Err(AuthError::InactiveUser);
        }

        let session = AuthSession {
            token: token.to_owned(),
            user_id,
            expires_at,
        };

        Ok((user, session))
    }

    pub async fn revoke_session(&self, token: &str) -> Result<(), AuthError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::SessionNotFound);
        }

        Ok(())
    }

    /// Delete every expired session, returning how many were removed
    pub async fn purge_expired_sessions(&self) -> Result<u64, AuthError> {
        let now = Utc::now();
        let rows = sqlx::query("SELECT token, expires_at FROM sessions")
            .fetch_all(&self.pool)
            .await?;

        let mut removed = 0;
        for row in rows {
            let token: String = row.try_get("token")?;
            let expires_at: String = row.try_get("expires_at")?;
            let expired = match DateTime::parse_from_rfc3339(&expires_at) {
                Ok(value) => value.with_timezone(&Utc) <= now,
                Err(_) => {
                    warn!("removing session with unreadable expiry");
                    true
                }
            };

            if expired {
                removed += sqlx::query("DELETE FROM sessions WHERE token = ?")
                    .bind(&token)
                    .execute(&self.pool)
                    .await?
                    .rows_affected();
            }
        }

        if removed > 0 {
            info!(removed, "purged expired sessions");
        }
        Ok(removed)
    }

    async fn issue_session(&self, user_id: i64) -> Result<AuthSession, AuthError> {
        let token = self.generate_session_token();
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.session_ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        sqlx::query(
            "INSERT INTO sessions (user_id, token, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(&token)
        .bind(now.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(AuthSession {
            token,
            user_id,
            expires_at,
        })
    }

    pub fn hash_password(&self, password: &str) -> Result<String, argon2::password_hash::Error> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
        Ok(hash.to_string())
    }

    fn generate_session_token(&self) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}
