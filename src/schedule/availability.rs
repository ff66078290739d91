use std::collections::BTreeMap;

use crate::model::*;

use super::slots::{SlotGrid, SlotMinutes, slot_key};

/// Fold rooms and meetings into the availability grid of one UTC day.
///
/// Every room gets a full row of empty slots. Each meeting then fills the
/// cell keyed by its slot-truncated start. Meetings of unknown rooms, or
/// starting outside `day`, leave the grid untouched. When two meetings
/// land in one cell the later one in `meetings` wins.
pub fn compile(
    day: Ms,
    slot: SlotMinutes,
    rooms: &[Room],
    meetings: &[Meeting],
) -> AvailabilityGrid {
    let grid = SlotGrid::new(day, slot);
    let empty_row: BTreeMap<Ms, Option<Meeting>> = grid.iter().map(|t| (t, None)).collect();

    let mut out: AvailabilityGrid = rooms
        .iter()
        .map(|room| (room.id, empty_row.clone()))
        .collect();

    for meeting in meetings {
        let Some(row) = out.get_mut(&meeting.room_id) else {
            continue;
        };
        let key = slot_key(meeting.start, slot);
        let Some(cell) = row.get_mut(&key) else {
            continue;
        };
        if let Some(previous) = cell.replace(meeting.clone()) {
            tracing::warn!(
                room_id = meeting.room_id,
                slot_start = key,
                kept = meeting.id,
                dropped = previous.id,
                "two meetings share one availability slot"
            );
            metrics::counter!(crate::observability::SLOT_COLLISIONS_TOTAL).increment(1);
        }
    }
    out
}

/// Number of occupied cells in a grid.
pub fn booked_cells(grid: &AvailabilityGrid) -> usize {
    grid.values()
        .flat_map(|row| row.values())
        .filter(|cell| cell.is_some())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;
    // 2024-03-01T00:00:00Z
    const DAY: Ms = 1_709_251_200_000;

    fn room(id: RoomId) -> Room {
        Room {
            id,
            name: format!("C{id}"),
            number: id as i32,
            company: Company::Coke,
        }
    }

    fn meeting(id: MeetingId, room_id: RoomId, start: Ms) -> Meeting {
        Meeting {
            id,
            room_id,
            title: format!("m{id}"),
            attendees: vec![],
            created: 0,
            start,
            end: start + H,
        }
    }

    #[test]
    fn empty_rooms_give_empty_grid() {
        let grid = compile(DAY, SlotMinutes::HOUR, &[], &[meeting(1, 1, DAY)]);
        assert!(grid.is_empty());
    }

    #[test]
    fn rooms_without_meetings_are_all_free() {
        let grid = compile(DAY, SlotMinutes::HOUR, &[room(1), room(2), room(3)], &[]);
        assert_eq!(grid.len(), 3);
        for row in grid.values() {
            assert_eq!(row.len(), 24);
            assert!(row.values().all(Option::is_none));
        }
    }

    #[test]
    fn boundary_meeting_fills_one_cell() {
        let m = meeting(1, 1, DAY + 9 * H);
        let grid = compile(DAY, SlotMinutes::HOUR, &[room(1)], std::slice::from_ref(&m));
        assert_eq!(grid[&1][&(DAY + 9 * H)], Some(m));
        assert_eq!(booked_cells(&grid), 1);
    }

    #[test]
    fn outside_meetings_are_ignored() {
        let meetings = [
            // Previous day, ending at midnight.
            meeting(1, 1, DAY - H),
            meeting(2, 1, DAY + DAY_MS),
            meeting(3, 99, DAY + 2 * H),
        ];
        let grid = compile(DAY, SlotMinutes::HOUR, &[room(1)], &meetings);
        assert_eq!(booked_cells(&grid), 0);
    }

    #[test]
    fn later_meeting_wins_a_shared_cell() {
        let slot = SlotMinutes::new(120).unwrap();
        let meetings = [meeting(1, 1, DAY + 2 * H), meeting(2, 1, DAY + 3 * H)];
        let grid = compile(DAY, slot, &[room(1)], &meetings);
        assert_eq!(grid[&1].len(), 12);
        assert_eq!(grid[&1][&(DAY + 2 * H)].as_ref().map(|m| m.id), Some(2));
        assert_eq!(booked_cells(&grid), 1);
    }

    #[test]
    fn grid_serializes_as_nested_maps() {
        let grid = compile(DAY, SlotMinutes::new(720).unwrap(), &[room(5)], &[meeting(8, 5, DAY)]);
        let json = serde_json::to_value(&grid).unwrap();
        assert_eq!(json["5"][DAY.to_string()]["id"], 8);
        assert!(json["5"][(DAY + 12 * H).to_string()].is_null());
    }
}
