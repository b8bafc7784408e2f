//! Dialer Database Crate
//!
//! Connection management, migrations and repositories for the appointment
//! module: users, calendar settings, events and the reference entities a
//! calendar setting points at.

use sqlx::SqlitePool;
use dialer_config::DatabaseConfig;

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repos;
pub mod types;

pub use connection::prepare_database;
pub use migrations::{run_migrations, MIGRATOR};

pub use repos::{
    CalendarSettingRepository, EventRepository, ReferenceRepository, UserRepository,
};

pub use entities::{
    AudioFile, CalendarSetting, CalendarSettingValues, CalendarUserProfile, CreateEventRequest,
    CreateUserRequest, Event, EventStatus, Gateway, SmsGateway, Survey, UpdateEventRequest, User,
};

pub use types::{DatabaseError, DatabaseResult, Visibility, Window};

/// Connect to the configured database and bring its schema up to date
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|e| DatabaseError::ConnectionError(format!("{e:#}")))?;

    run_migrations(&pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("{e:#}")))?;

    Ok(pool)
}
