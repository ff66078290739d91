use crate::limits::*;
use crate::model::*;

use super::BookingError;
use super::slots::{SlotMinutes, is_slot_aligned};

/// First meeting of `room_id` whose span touches `span`.
///
/// Boundaries are inclusive: a meeting ending exactly when the new one
/// starts is a conflict. Meetings of other rooms in `existing` are skipped.
pub fn conflicts<'a, I>(room_id: RoomId, span: &Span, existing: I) -> Option<MeetingId>
where
    I: IntoIterator<Item = &'a Meeting>,
{
    existing
        .into_iter()
        .find(|m| m.room_id == room_id && m.span().touches(span))
        .map(|m| m.id)
}

pub(crate) fn validate_start(start: Option<Ms>, slot: SlotMinutes) -> Result<Ms, BookingError> {
    let start = start.ok_or_else(|| BookingError::Validation("start is required".into()))?;
    if !(MIN_VALID_TIMESTAMP_MS..MAX_VALID_TIMESTAMP_MS).contains(&start) {
        return Err(BookingError::Validation("start out of range".into()));
    }
    if !is_slot_aligned(start, slot) {
        return Err(BookingError::Validation(format!(
            "start must fall on a {}-minute slot boundary",
            slot.get()
        )));
    }
    Ok(start)
}

pub(crate) fn validate_title(title: &str) -> Result<(), BookingError> {
    if title.trim().is_empty() {
        return Err(BookingError::Validation("title is required".into()));
    }
    if title.len() > MAX_TITLE_LEN {
        return Err(BookingError::Validation("title too long".into()));
    }
    Ok(())
}

pub(crate) fn validate_attendees(attendees: &[String]) -> Result<(), BookingError> {
    if attendees.len() > MAX_ATTENDEES {
        return Err(BookingError::Validation("too many attendees".into()));
    }
    if attendees.iter().any(|a| a.len() > MAX_ATTENDEE_LEN) {
        return Err(BookingError::Validation("attendee name too long".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;

    fn meeting(id: MeetingId, room_id: RoomId, start: Ms) -> Meeting {
        Meeting {
            id,
            room_id,
            title: "t".into(),
            attendees: vec![],
            created: 0,
            start,
            end: start + H,
        }
    }

    #[test]
    fn disjoint_is_free() {
        let existing = [meeting(1, 1, 9 * H)];
        assert_eq!(conflicts(1, &Span::new(11 * H, 12 * H), &existing), None);
        assert_eq!(conflicts(1, &Span::new(7 * H, 8 * H - 1), &existing), None);
    }

    #[test]
    fn touching_either_end_conflicts() {
        let existing = [meeting(1, 1, 9 * H)];
        assert_eq!(conflicts(1, &Span::new(10 * H, 11 * H), &existing), Some(1));
        assert_eq!(conflicts(1, &Span::new(8 * H, 9 * H), &existing), Some(1));
    }

    #[test]
    fn containment_conflicts() {
        let existing = [meeting(4, 1, 9 * H)];
        let inside = Span::new(9 * H + 10, 9 * H + 20);
        let around = Span::new(8 * H, 11 * H);
        assert!(conflicts(1, &inside, &existing).is_some());
        assert!(conflicts(1, &around, &existing).is_some());
    }

    #[test]
    fn other_rooms_are_ignored() {
        let existing = [meeting(1, 2, 9 * H)];
        assert_eq!(conflicts(1, &Span::new(9 * H, 10 * H), &existing), None);
    }

    #[test]
    fn start_validation() {
        let slot = SlotMinutes::HOUR;
        let aligned = MIN_VALID_TIMESTAMP_MS + 5 * H;
        assert_eq!(validate_start(Some(aligned), slot).unwrap(), aligned);
        assert!(matches!(validate_start(None, slot), Err(BookingError::Validation(_))));
        assert!(matches!(
            validate_start(Some(aligned + 1), slot),
            Err(BookingError::Validation(_))
        ));
        assert!(matches!(validate_start(Some(0), slot), Err(BookingError::Validation(_))));
    }

    #[test]
    fn title_and_attendee_validation() {
        assert!(validate_title("standup").is_ok());
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(MAX_TITLE_LEN + 1)).is_err());
        assert!(validate_attendees(&["ann".into()]).is_ok());
        assert!(validate_attendees(&vec!["a".into(); MAX_ATTENDEES + 1]).is_err());
    }
}
