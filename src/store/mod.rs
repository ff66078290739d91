//! Storage collaborator: the system of record for rooms and meetings.

mod wal_store;

pub use wal_store::WalStore;

use async_trait::async_trait;

use crate::model::*;

/// Which integrity rule a write broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A meeting referenced a room that does not exist.
    MissingRoom(RoomId),
    /// `(number, company)` is already taken.
    DuplicateRoom { number: i32, company: Company },
    /// Exclusion constraint: the room already has a meeting touching this span.
    OverlappingMeeting(MeetingId),
}

#[derive(Debug)]
pub enum StoreError {
    NotFound,
    IntegrityViolation(Violation),
    LimitExceeded(&'static str),
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "not found"),
            StoreError::IntegrityViolation(Violation::MissingRoom(id)) => {
                write!(f, "integrity violation: room {id} does not exist")
            }
            StoreError::IntegrityViolation(Violation::DuplicateRoom { number, company }) => {
                write!(f, "integrity violation: room {number} already exists for {company}")
            }
            StoreError::IntegrityViolation(Violation::OverlappingMeeting(id)) => {
                write!(f, "integrity violation: overlaps meeting {id}")
            }
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::Backend(e) => write!(f, "storage backend error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Typed repository for rooms and meetings.
///
/// Reads return owned snapshots; callers never hold storage locks.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Rooms ────────────────────────────────────────────────

    /// Insert a room. Fails with `DuplicateRoom` when `(number, company)` is taken.
    async fn insert_room(&self, room: NewRoom) -> Result<Room, StoreError>;

    async fn find_room(&self, id: RoomId) -> Result<Room, StoreError>;

    /// All rooms matching the filter, ordered by id.
    async fn find_rooms(&self, filter: &RoomFilter) -> Result<Vec<Room>, StoreError>;

    /// Delete a room and, by cascade, all of its meetings.
    async fn delete_room(&self, id: RoomId) -> Result<(), StoreError>;

    // ── Meetings ─────────────────────────────────────────────

    /// Insert a meeting, assigning its id and creation time.
    ///
    /// Enforces referential integrity (`MissingRoom`) and the exclusion
    /// constraint (`OverlappingMeeting`) atomically with the write.
    async fn insert_meeting(&self, meeting: NewMeeting) -> Result<Meeting, StoreError>;

    async fn find_meeting(&self, id: MeetingId) -> Result<Meeting, StoreError>;

    /// All meetings, optionally restricted to one room, ordered by `(start, id)`.
    async fn find_meetings(&self, room_id: Option<RoomId>) -> Result<Vec<Meeting>, StoreError>;

    /// Meetings of one room whose span touches `window` (inclusive).
    async fn find_meetings_by_room_overlapping(
        &self,
        room_id: RoomId,
        window: Span,
    ) -> Result<Vec<Meeting>, StoreError>;

    /// Meetings of every room whose span touches `window` (inclusive).
    async fn find_meetings_overlapping(&self, window: Span) -> Result<Vec<Meeting>, StoreError>;

    async fn delete_meeting(&self, id: MeetingId) -> Result<(), StoreError>;
}
