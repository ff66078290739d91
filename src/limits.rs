use crate::model::Ms;

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_MEETINGS_PER_ROOM: usize = 100_000;
pub const MAX_TITLE_LEN: usize = 512;
pub const MAX_ATTENDEES: usize = 256;
pub const MAX_ATTENDEE_LEN: usize = 256;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
