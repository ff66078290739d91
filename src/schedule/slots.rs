use crate::model::*;

const MINUTES_PER_DAY: u32 = 1440;

/// Slot length in minutes. Always a divisor of 1440, so a day is tiled
/// exactly with no remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotMinutes(u32);

impl SlotMinutes {
    pub const HOUR: SlotMinutes = SlotMinutes(60);

    pub fn new(minutes: u32) -> Result<Self, String> {
        if minutes == 0 || MINUTES_PER_DAY % minutes != 0 {
            return Err(format!(
                "slot length must evenly divide 1440 minutes, got {minutes}"
            ));
        }
        Ok(SlotMinutes(minutes))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn as_ms(self) -> Ms {
        Ms::from(self.0) * MINUTE_MS
    }

    pub fn per_day(self) -> usize {
        (MINUTES_PER_DAY / self.0) as usize
    }
}

impl Default for SlotMinutes {
    fn default() -> Self {
        SlotMinutes::HOUR
    }
}

/// The slot start instants of one UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotGrid {
    midnight: Ms,
    slot: SlotMinutes,
}

impl SlotGrid {
    /// `day` may be any instant within the day.
    pub fn new(day: Ms, slot: SlotMinutes) -> Self {
        Self {
            midnight: day_start(day),
            slot,
        }
    }

    pub fn midnight(&self) -> Ms {
        self.midnight
    }

    pub fn len(&self) -> usize {
        self.slot.per_day()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `[00:00, 24:00]` of the day, the window availability reads from storage.
    pub fn day_span(&self) -> Span {
        Span::new(self.midnight, self.midnight + DAY_MS)
    }

    pub fn iter(&self) -> impl Iterator<Item = Ms> + use<> {
        let (midnight, step) = (self.midnight, self.slot.as_ms());
        (0..self.len() as Ms).map(move |i| midnight + i * step)
    }
}

pub fn day_slots(day: Ms, slot: SlotMinutes) -> Vec<Ms> {
    SlotGrid::new(day, slot).iter().collect()
}

/// The start of the slot containing `t`, counted from `t`'s UTC midnight.
pub fn slot_key(t: Ms, slot: SlotMinutes) -> Ms {
    let midnight = day_start(t);
    midnight + (t - midnight) / slot.as_ms() * slot.as_ms()
}

pub fn is_slot_aligned(t: Ms, slot: SlotMinutes) -> bool {
    slot_key(t, slot) == t
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;
    // 2024-03-01T00:00:00Z
    const DAY: Ms = 1_709_251_200_000;

    fn minutes(m: u32) -> SlotMinutes {
        SlotMinutes::new(m).unwrap()
    }

    #[test]
    fn hourly_grid_covers_the_day() {
        let slots = day_slots(DAY + 13 * H + 17, SlotMinutes::HOUR);
        assert_eq!(slots.len(), 24);
        assert_eq!(slots[0], DAY);
        assert_eq!(slots[23], DAY + 23 * H);
        assert!(slots.windows(2).all(|w| w[1] - w[0] == H));
    }

    #[test]
    fn other_divisors() {
        assert_eq!(day_slots(DAY, minutes(15)).len(), 96);
        assert_eq!(day_slots(DAY, minutes(1440)), vec![DAY]);
        assert_eq!(day_slots(DAY, minutes(90)).len(), 16);
    }

    #[test]
    fn rejects_non_divisors() {
        assert!(SlotMinutes::new(0).is_err());
        assert!(SlotMinutes::new(7).is_err());
        assert!(SlotMinutes::new(1441).is_err());
        assert!(SlotMinutes::new(2880).is_err());
    }

    #[test]
    fn grid_is_restartable() {
        let grid = SlotGrid::new(DAY, minutes(30));
        let first: Vec<Ms> = grid.iter().collect();
        let second: Vec<Ms> = grid.iter().collect();
        assert_eq!(first, second);
        assert_eq!(grid.len(), 48);
        assert_eq!(grid.day_span(), Span::new(DAY, DAY + DAY_MS));
    }

    #[test]
    fn negative_instants_use_their_own_midnight() {
        let slots = day_slots(-1, SlotMinutes::HOUR);
        assert_eq!(slots[0], -DAY_MS);
        assert_eq!(slot_key(-1, SlotMinutes::HOUR), -H);
    }

    #[test]
    fn slot_key_truncates() {
        let slot = minutes(30);
        assert_eq!(slot_key(DAY + 9 * H + 29 * MINUTE_MS, slot), DAY + 9 * H);
        assert_eq!(slot_key(DAY + 9 * H + 30 * MINUTE_MS, slot), DAY + 9 * H + 30 * MINUTE_MS);
        assert!(is_slot_aligned(DAY + 9 * H, slot));
        assert!(!is_slot_aligned(DAY + 9 * H + 1, slot));
    }
}
