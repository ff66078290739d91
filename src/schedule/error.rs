use crate::model::{Company, MeetingId, RoomId};
use crate::store::{StoreError, Violation};

#[derive(Debug)]
pub enum BookingError {
    Validation(String),
    MeetingConflict(MeetingId),
    RoomNotFound(RoomId),
    MeetingNotFound(MeetingId),
    RoomExists { number: i32, company: Company },
    Storage(String),
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::Validation(msg) => write!(f, "invalid request: {msg}"),
            BookingError::MeetingConflict(id) => {
                write!(f, "room already booked: conflicts with meeting {id}")
            }
            BookingError::RoomNotFound(id) => write!(f, "room does not exist: {id}"),
            BookingError::MeetingNotFound(id) => write!(f, "meeting does not exist: {id}"),
            BookingError::RoomExists { number, company } => {
                write!(f, "room {number} already exists for {company}")
            }
            BookingError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for BookingError {}

/// Store failures that carry no entity context. Callers that know which
/// id they asked for map `NotFound` themselves.
impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::IntegrityViolation(Violation::MissingRoom(id)) => {
                BookingError::RoomNotFound(id)
            }
            StoreError::IntegrityViolation(Violation::DuplicateRoom { number, company }) => {
                BookingError::RoomExists { number, company }
            }
            StoreError::IntegrityViolation(Violation::OverlappingMeeting(id)) => {
                BookingError::MeetingConflict(id)
            }
            StoreError::LimitExceeded(msg) => BookingError::Validation(msg.to_string()),
            StoreError::NotFound | StoreError::Backend(_) => BookingError::Storage(e.to_string()),
        }
    }
}
