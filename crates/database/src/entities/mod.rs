//! Domain entities for the database layer

pub mod calendar_setting;
pub mod event;
pub mod reference;
pub mod user;

pub use calendar_setting::{CalendarSetting, CalendarSettingValues};
pub use event::{CreateEventRequest, Event, EventStatus, UpdateEventRequest};
pub use reference::{AudioFile, Gateway, SmsGateway, Survey};
pub use user::{CalendarUserProfile, CreateUserRequest, User};
