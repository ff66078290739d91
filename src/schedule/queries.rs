use crate::model::*;
use crate::store::StoreError;

use super::availability::{booked_cells, compile};
use super::slots::SlotGrid;
use super::{BookingError, BookingService};

impl BookingService {
    pub async fn get(&self, id: MeetingId) -> Result<Meeting, BookingError> {
        self.store.find_meeting(id).await.map_err(|e| match e {
            StoreError::NotFound => BookingError::MeetingNotFound(id),
            e => e.into(),
        })
    }

    /// All meetings ordered by `(start, id)`, optionally for one room.
    pub async fn get_all(&self, room_id: Option<RoomId>) -> Result<Vec<Meeting>, BookingError> {
        Ok(self.store.find_meetings(room_id).await?)
    }

    /// Availability grid for the UTC day containing `day`.
    pub async fn get_available(&self, day: Ms) -> Result<AvailabilityGrid, BookingError> {
        let grid = SlotGrid::new(day, self.config.slot);
        let rooms = self.store.find_rooms(&RoomFilter::default()).await?;
        let meetings = self.store.find_meetings_overlapping(grid.day_span()).await?;
        let compiled = compile(grid.midnight(), self.config.slot, &rooms, &meetings);
        tracing::debug!(
            day = grid.midnight(),
            rooms = rooms.len(),
            meetings = meetings.len(),
            booked = booked_cells(&compiled),
            "compiled availability"
        );
        Ok(compiled)
    }

    pub async fn get_rooms(&self, filter: &RoomFilter) -> Result<Vec<Room>, BookingError> {
        Ok(self.store.find_rooms(filter).await?)
    }

    pub async fn get_room(&self, id: RoomId) -> Result<Room, BookingError> {
        self.store.find_room(id).await.map_err(|e| match e {
            StoreError::NotFound => BookingError::RoomNotFound(id),
            e => e.into(),
        })
    }
}
