//! Database repository implementations

pub mod calendar_setting_repository;
pub mod event_repository;
pub mod reference_repository;
pub mod user_repository;

pub use calendar_setting_repository::*;
pub use event_repository::*;
pub use reference_repository::*;
pub use user_repository::*;

use crate::types::Visibility;

/// SQL predicate for a visibility rule plus the id to bind, if any.
///
/// `owned` is the predicate used for `Visibility::User`, written with a
/// single `?` placeholder.
pub(crate) fn visibility_clause(
    visibility: Visibility,
    owned: &'static str,
) -> (&'static str, Option<i64>) {
    match visibility {
        Visibility::All => ("1 = 1", None),
        Visibility::User(user_id) => (owned, Some(user_id)),
        Visibility::Nobody => ("0 = 1", None),
    }
}
