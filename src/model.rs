use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unix milliseconds, always UTC — the only time type.
pub type Ms = i64;

pub type RoomId = i64;
pub type MeetingId = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const DAY_MS: Ms = 24 * 60 * MINUTE_MS;

/// Closed interval `[start, end]`.
///
/// Booking conflicts use inclusive boundaries: two meetings that merely touch
/// (one ends exactly when the other starts) still collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start <= end, "Span start must not be after end");
        Self { start, end }
    }

    /// Inclusive intersection test. Touching spans count.
    pub fn touches(&self, other: &Span) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Midnight UTC of the day containing `t`.
pub fn day_start(t: Ms) -> Ms {
    t - t.rem_euclid(DAY_MS)
}

/// Current wall-clock time.
pub fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

// ── Company ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Company {
    Coke,
    Pepsi,
}

impl Company {
    pub const ALL: [Company; 2] = [Company::Coke, Company::Pepsi];

    /// Short code used as the room name prefix.
    pub fn code(self) -> &'static str {
        match self {
            Company::Coke => "C",
            Company::Pepsi => "P",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Company::Coke => "coke",
            Company::Pepsi => "pepsi",
        }
    }

    /// Case-insensitive lookup by display name.
    pub fn from_name(name: &str) -> Option<Company> {
        let name = name.trim();
        Company::ALL
            .into_iter()
            .find(|c| c.display_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Company {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ── Entities ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub number: i32,
    pub company: Company,
}

impl Room {
    pub fn derive_name(number: i32, company: Company) -> String {
        format!("{}{}", company.code(), number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: MeetingId,
    pub room_id: RoomId,
    pub title: String,
    pub attendees: Vec<String>,
    pub created: Ms,
    pub start: Ms,
    pub end: Ms,
}

impl Meeting {
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }
}

/// A room as handed to storage, before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoom {
    pub name: String,
    pub number: i32,
    pub company: Company,
}

/// A meeting as handed to storage, before an id and creation time are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMeeting {
    pub room_id: RoomId,
    pub title: String,
    pub attendees: Vec<String>,
    pub start: Ms,
    pub end: Ms,
}

impl NewMeeting {
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }
}

// ── Requests ─────────────────────────────────────────────────────

/// Inbound booking request. `end` is never part of a request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeetingRequest {
    pub room_id: RoomId,
    pub title: String,
    pub attendees: Vec<String>,
    pub start: Option<Ms>,
}

/// Inbound room request. The company is still the raw display name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoomRequest {
    pub number: i32,
    pub company: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoomFilter {
    pub name: Option<String>,
    pub company: Option<Company>,
}

impl RoomFilter {
    pub fn matches(&self, room: &Room) -> bool {
        self.name.as_ref().is_none_or(|n| *n == room.name)
            && self.company.is_none_or(|c| c == room.company)
    }
}

/// room → slot start → occupying meeting (or `None` when free).
pub type AvailabilityGrid = BTreeMap<RoomId, BTreeMap<Ms, Option<Meeting>>>;

// ── Storage state ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// Meetings in this room, sorted by `start`.
    pub meetings: Vec<Meeting>,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            meetings: Vec::new(),
        }
    }

    /// Insert meeting maintaining sort order by start.
    pub fn insert_meeting(&mut self, meeting: Meeting) {
        let pos = self
            .meetings
            .binary_search_by_key(&meeting.start, |m| m.start)
            .unwrap_or_else(|e| e);
        self.meetings.insert(pos, meeting);
    }

    pub fn remove_meeting(&mut self, id: MeetingId) -> Option<Meeting> {
        let pos = self.meetings.iter().position(|m| m.id == id)?;
        Some(self.meetings.remove(pos))
    }

    /// Meetings whose span touches the query window (inclusive).
    /// Uses binary search to skip meetings starting after `query.end`.
    pub fn touching(&self, query: &Span) -> impl Iterator<Item = &Meeting> {
        let right_bound = self.meetings.partition_point(|m| m.start <= query.end);
        self.meetings[..right_bound]
            .iter()
            .filter(move |m| m.end >= query.start)
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: RoomId,
        name: String,
        number: i32,
        company: Company,
    },
    RoomDeleted {
        id: RoomId,
    },
    MeetingBooked {
        id: MeetingId,
        room_id: RoomId,
        title: String,
        attendees: Vec<String>,
        created: Ms,
        start: Ms,
        end: Ms,
    },
    MeetingCancelled {
        id: MeetingId,
        room_id: RoomId,
    },
    /// Written at the head of a compacted log so ids of deleted entities
    /// are not handed out again after replay.
    IdsReserved {
        next_room_id: RoomId,
        next_meeting_id: MeetingId,
    },
}

impl Event {
    pub fn booked(meeting: &Meeting) -> Self {
        Event::MeetingBooked {
            id: meeting.id,
            room_id: meeting.room_id,
            title: meeting.title.clone(),
            attendees: meeting.attendees.clone(),
            created: meeting.created,
            start: meeting.start,
            end: meeting.end,
        }
    }

    pub fn room_created(room: &Room) -> Self {
        Event::RoomCreated {
            id: room.id,
            name: room.name.clone(),
            number: room.number,
            company: room.company,
        }
    }
}
