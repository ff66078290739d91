use crate::model::*;
use crate::observability;
use crate::store::StoreError;

use super::conflict::{conflicts, validate_attendees, validate_start, validate_title};
use super::{BookingError, BookingService};

impl BookingService {
    /// Book one slot. `end` is always `start` plus the configured slot length.
    pub async fn create(&self, req: MeetingRequest) -> Result<Meeting, BookingError> {
        if req.room_id == 0 {
            return Err(BookingError::Validation("room_id is required".into()));
        }
        validate_title(&req.title)?;
        validate_attendees(&req.attendees)?;
        let start = validate_start(req.start, self.config.slot)?;
        let span = Span::new(start, start + self.config.slot.as_ms());

        let candidates = self
            .store
            .find_meetings_by_room_overlapping(req.room_id, span)
            .await?;
        if let Some(existing) = conflicts(req.room_id, &span, &candidates) {
            metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(BookingError::MeetingConflict(existing));
        }

        let meeting = self
            .store
            .insert_meeting(NewMeeting {
                room_id: req.room_id,
                title: req.title,
                attendees: req.attendees,
                start: span.start,
                end: span.end,
            })
            .await
            .map_err(BookingError::from)
            .inspect_err(|e| {
                if matches!(e, BookingError::MeetingConflict(_)) {
                    metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
                }
            })?;

        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);
        tracing::info!(
            meeting_id = meeting.id,
            room_id = meeting.room_id,
            start = meeting.start,
            "meeting booked"
        );
        Ok(meeting)
    }

    /// Cancel a meeting. `Ok(false)` when a lenient delete found nothing.
    pub async fn delete(&self, id: MeetingId) -> Result<bool, BookingError> {
        match self.store.delete_meeting(id).await {
            Ok(()) => {
                tracing::info!(meeting_id = id, "meeting cancelled");
                Ok(true)
            }
            Err(StoreError::NotFound) if self.config.strict_deletes => {
                Err(BookingError::MeetingNotFound(id))
            }
            Err(StoreError::NotFound) => {
                tracing::debug!(meeting_id = id, "delete of unknown meeting ignored");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn create_room(&self, req: RoomRequest) -> Result<Room, BookingError> {
        if req.number <= 0 {
            return Err(BookingError::Validation("room number must be positive".into()));
        }
        if req.company.trim().is_empty() {
            return Err(BookingError::Validation("company is required".into()));
        }
        let company = Company::from_name(&req.company).ok_or_else(|| {
            BookingError::Validation(format!("unknown company: {}", req.company.trim()))
        })?;

        let room = self
            .store
            .insert_room(NewRoom {
                name: Room::derive_name(req.number, company),
                number: req.number,
                company,
            })
            .await?;
        tracing::info!(room_id = room.id, name = %room.name, "room created");
        Ok(room)
    }

    /// Delete a room together with all of its meetings.
    pub async fn delete_room(&self, id: RoomId) -> Result<bool, BookingError> {
        match self.store.delete_room(id).await {
            Ok(()) => {
                tracing::info!(room_id = id, "room deleted");
                Ok(true)
            }
            Err(StoreError::NotFound) if self.config.strict_deletes => {
                Err(BookingError::RoomNotFound(id))
            }
            Err(StoreError::NotFound) => {
                tracing::debug!(room_id = id, "delete of unknown room ignored");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
