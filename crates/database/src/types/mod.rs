//! Shared types and result types for the database layer

pub mod errors;

pub use errors::DatabaseError;

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Which rows a caller may see.
///
/// The meaning of `User` depends on the collection: calendar settings are
/// visible to their owner, events to the manager of their creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    All,
    User(i64),
    Nobody,
}

/// Limit/offset window for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub limit: i64,
    pub offset: i64,
}

impl Window {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self { limit, offset }
    }

    /// Everything, for callers that do not paginate
    pub fn unbounded() -> Self {
        Self { limit: -1, offset: 0 }
    }
}
