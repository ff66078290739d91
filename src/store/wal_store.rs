use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};

use crate::limits::*;
use crate::model::*;
use crate::wal::Wal;

use super::{Store, StoreError, Violation};

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that queue up while a flush is running are
/// written together and made durable with a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();

    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    // A failed batch leaves no bytes behind for later batches to follow.
    if let Err(e) = &result {
        tracing::error!("WAL batch of {} failed: {e}", batch.len());
        if let Err(e) = wal.rollback() {
            tracing::error!("WAL rollback failed: {e}");
        }
    }

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Apply a meeting event to its room. Room create/delete are handled at the map level.
fn apply_to_room(rs: &mut RoomState, event: &Event, index: &DashMap<MeetingId, RoomId>) {
    match event {
        Event::MeetingBooked {
            id,
            room_id,
            title,
            attendees,
            created,
            start,
            end,
        } => {
            rs.insert_meeting(Meeting {
                id: *id,
                room_id: *room_id,
                title: title.clone(),
                attendees: attendees.clone(),
                created: *created,
                start: *start,
                end: *end,
            });
            index.insert(*id, *room_id);
        }
        Event::MeetingCancelled { id, .. } => {
            rs.remove_meeting(*id);
            index.remove(id);
        }
        Event::RoomCreated { .. } | Event::RoomDeleted { .. } | Event::IdsReserved { .. } => {}
    }
}

/// In-memory rooms and meetings, made durable by a write-ahead log.
///
/// Each room has its own `RwLock`; a meeting write holds the room's write
/// guard across the conflict re-check, the WAL append, and the apply, which
/// makes the overlap rule an exclusion constraint rather than a best-effort
/// check. Room inserts and deletes are additionally serialized by `catalog`
/// so the `(number, company)` uniqueness check cannot race.
pub struct WalStore {
    rooms: DashMap<RoomId, SharedRoomState>,
    meeting_to_room: DashMap<MeetingId, RoomId>,
    catalog: Mutex<()>,
    next_room_id: AtomicI64,
    next_meeting_id: AtomicI64,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl WalStore {
    /// Replay the log at `wal_path` and start its writer task.
    /// Must be called from within a tokio runtime.
    pub fn open(wal_path: &Path) -> io::Result<Self> {
        let events = Wal::replay(wal_path)?;
        let wal = Wal::open(wal_path)?;

        let meeting_to_room = DashMap::new();
        let mut rooms: HashMap<RoomId, RoomState> = HashMap::new();
        let mut next_room_id: RoomId = 1;
        let mut next_meeting_id: MeetingId = 1;

        for event in &events {
            match event {
                Event::RoomCreated {
                    id,
                    name,
                    number,
                    company,
                } => {
                    next_room_id = next_room_id.max(id + 1);
                    rooms.insert(
                        *id,
                        RoomState::new(Room {
                            id: *id,
                            name: name.clone(),
                            number: *number,
                            company: *company,
                        }),
                    );
                }
                Event::RoomDeleted { id } => {
                    if let Some(rs) = rooms.remove(id) {
                        for m in &rs.meetings {
                            meeting_to_room.remove(&m.id);
                        }
                    }
                }
                Event::IdsReserved {
                    next_room_id: r,
                    next_meeting_id: m,
                } => {
                    next_room_id = next_room_id.max(*r);
                    next_meeting_id = next_meeting_id.max(*m);
                }
                Event::MeetingBooked { id, room_id, .. } => {
                    next_meeting_id = next_meeting_id.max(id + 1);
                    if let Some(rs) = rooms.get_mut(room_id) {
                        apply_to_room(rs, event, &meeting_to_room);
                    }
                }
                Event::MeetingCancelled { room_id, .. } => {
                    if let Some(rs) = rooms.get_mut(room_id) {
                        apply_to_room(rs, event, &meeting_to_room);
                    }
                }
            }
        }

        tracing::info!(
            "replayed {} WAL events: {} rooms, {} meetings",
            events.len(),
            rooms.len(),
            meeting_to_room.len()
        );

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            rooms: rooms
                .into_iter()
                .map(|(id, rs)| (id, Arc::new(RwLock::new(rs))))
                .collect(),
            meeting_to_room,
            catalog: Mutex::new(()),
            next_room_id: AtomicI64::new(next_room_id),
            next_meeting_id: AtomicI64::new(next_meeting_id),
            wal_tx,
        })
    }

    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Backend("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Backend("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Backend(format!("WAL append failed: {e}")))
    }

    fn room_state(&self, id: RoomId) -> Option<SharedRoomState> {
        self.rooms.get(&id).map(|e| e.value().clone())
    }

    /// Snapshot of room handles. DashMap refs must not live across an await.
    fn room_states(&self) -> Vec<SharedRoomState> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn meeting_count(&self) -> usize {
        self.meeting_to_room.len()
    }

    /// Rewrite the WAL with the minimal event set that recreates current state.
    ///
    /// The catalog lock and every room's read guard are held until the
    /// writer confirms the swap, so no append can slip in between the
    /// snapshot and the rename and be lost.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        let _catalog = self.catalog.lock().await;

        let mut states = self.room_states();
        let mut guards = Vec::with_capacity(states.len());
        for rs in states.drain(..) {
            guards.push(rs.read_owned().await);
        }
        guards.sort_by_key(|g| g.room.id);

        let mut events = vec![Event::IdsReserved {
            next_room_id: self.next_room_id.load(Ordering::SeqCst),
            next_meeting_id: self.next_meeting_id.load(Ordering::SeqCst),
        }];
        for guard in &guards {
            events.push(Event::room_created(&guard.room));
            events.extend(guard.meetings.iter().map(Event::booked));
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Backend("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Backend("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Backend(format!("WAL compaction failed: {e}")))
    }

    pub async fn wal_appends_since_compact(&self) -> Result<u64, StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .map_err(|_| StoreError::Backend("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Backend("WAL writer dropped response".into()))
    }

    /// Cut the store off from its writer task, as if the task had died.
    #[cfg(test)]
    pub(crate) fn detach_writer(&mut self) {
        let (tx, _) = mpsc::channel(1);
        self.wal_tx = tx;
    }
}

fn sort_meetings(meetings: &mut [Meeting]) {
    meetings.sort_by_key(|m| (m.start, m.id));
}

#[async_trait]
impl Store for WalStore {
    async fn insert_room(&self, room: NewRoom) -> Result<Room, StoreError> {
        let _catalog = self.catalog.lock().await;
        if self.rooms.len() >= MAX_ROOMS {
            return Err(StoreError::LimitExceeded("too many rooms"));
        }
        for rs in self.room_states() {
            let existing = rs.read().await;
            if existing.room.number == room.number && existing.room.company == room.company {
                return Err(StoreError::IntegrityViolation(Violation::DuplicateRoom {
                    number: room.number,
                    company: room.company,
                }));
            }
        }

        let room = Room {
            id: self.next_room_id.fetch_add(1, Ordering::SeqCst),
            name: room.name,
            number: room.number,
            company: room.company,
        };
        self.wal_append(&Event::room_created(&room)).await?;
        self.rooms
            .insert(room.id, Arc::new(RwLock::new(RoomState::new(room.clone()))));
        Ok(room)
    }

    async fn find_room(&self, id: RoomId) -> Result<Room, StoreError> {
        let rs = self.room_state(id).ok_or(StoreError::NotFound)?;
        let guard = rs.read().await;
        Ok(guard.room.clone())
    }

    async fn find_rooms(&self, filter: &RoomFilter) -> Result<Vec<Room>, StoreError> {
        let mut rooms = Vec::new();
        for rs in self.room_states() {
            let guard = rs.read().await;
            if filter.matches(&guard.room) {
                rooms.push(guard.room.clone());
            }
        }
        rooms.sort_by_key(|r| r.id);
        Ok(rooms)
    }

    async fn delete_room(&self, id: RoomId) -> Result<(), StoreError> {
        let _catalog = self.catalog.lock().await;
        let rs = self.room_state(id).ok_or(StoreError::NotFound)?;
        let guard = rs.write().await;

        self.wal_append(&Event::RoomDeleted { id }).await?;
        self.rooms.remove(&id);
        for m in &guard.meetings {
            self.meeting_to_room.remove(&m.id);
        }
        tracing::debug!("room {id} deleted with {} meetings", guard.meetings.len());
        Ok(())
    }

    async fn insert_meeting(&self, meeting: NewMeeting) -> Result<Meeting, StoreError> {
        let missing = || StoreError::IntegrityViolation(Violation::MissingRoom(meeting.room_id));
        let rs = self.room_state(meeting.room_id).ok_or_else(missing)?;
        let mut guard = rs.write().await;
        // The room may have been deleted while we waited for the lock.
        if !self.rooms.contains_key(&meeting.room_id) {
            return Err(missing());
        }
        if guard.meetings.len() >= MAX_MEETINGS_PER_ROOM {
            return Err(StoreError::LimitExceeded("too many meetings in room"));
        }
        if let Some(existing) = guard.touching(&meeting.span()).next() {
            return Err(StoreError::IntegrityViolation(Violation::OverlappingMeeting(
                existing.id,
            )));
        }

        let stored = Meeting {
            id: self.next_meeting_id.fetch_add(1, Ordering::SeqCst),
            room_id: meeting.room_id,
            title: meeting.title,
            attendees: meeting.attendees,
            created: now_ms(),
            start: meeting.start,
            end: meeting.end,
        };
        let event = Event::booked(&stored);
        self.wal_append(&event).await?;
        apply_to_room(&mut guard, &event, &self.meeting_to_room);
        Ok(stored)
    }

    async fn find_meeting(&self, id: MeetingId) -> Result<Meeting, StoreError> {
        let room_id = self
            .meeting_to_room
            .get(&id)
            .map(|e| *e.value())
            .ok_or(StoreError::NotFound)?;
        let rs = self.room_state(room_id).ok_or(StoreError::NotFound)?;
        let guard = rs.read().await;
        guard
            .meetings
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_meetings(&self, room_id: Option<RoomId>) -> Result<Vec<Meeting>, StoreError> {
        let states = match room_id {
            Some(id) => self.room_state(id).into_iter().collect(),
            None => self.room_states(),
        };
        let mut meetings = Vec::new();
        for rs in states {
            meetings.extend(rs.read().await.meetings.iter().cloned());
        }
        sort_meetings(&mut meetings);
        Ok(meetings)
    }

    async fn find_meetings_by_room_overlapping(
        &self,
        room_id: RoomId,
        window: Span,
    ) -> Result<Vec<Meeting>, StoreError> {
        let Some(rs) = self.room_state(room_id) else {
            return Ok(Vec::new());
        };
        let guard = rs.read().await;
        Ok(guard.touching(&window).cloned().collect())
    }

    async fn find_meetings_overlapping(&self, window: Span) -> Result<Vec<Meeting>, StoreError> {
        let mut meetings = Vec::new();
        for rs in self.room_states() {
            meetings.extend(rs.read().await.touching(&window).cloned());
        }
        sort_meetings(&mut meetings);
        Ok(meetings)
    }

    async fn delete_meeting(&self, id: MeetingId) -> Result<(), StoreError> {
        let room_id = self
            .meeting_to_room
            .get(&id)
            .map(|e| *e.value())
            .ok_or(StoreError::NotFound)?;
        let rs = self.room_state(room_id).ok_or(StoreError::NotFound)?;
        let mut guard = rs.write().await;
        if !guard.meetings.iter().any(|m| m.id == id) {
            return Err(StoreError::NotFound);
        }
        let event = Event::MeetingCancelled { id, room_id };
        self.wal_append(&event).await?;
        apply_to_room(&mut guard, &event, &self.meeting_to_room);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const H: Ms = 3_600_000;
    // 2024-03-01T00:00:00Z
    const DAY: Ms = 1_709_251_200_000;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("slotbook_test_store");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn new_room(number: i32, company: Company) -> NewRoom {
        NewRoom {
            name: Room::derive_name(number, company),
            number,
            company,
        }
    }

    fn new_meeting(room_id: RoomId, start: Ms) -> NewMeeting {
        NewMeeting {
            room_id,
            title: "planning".into(),
            attendees: vec!["ann".into(), "bob".into()],
            start,
            end: start + H,
        }
    }

    #[tokio::test]
    async fn insert_and_find_room() {
        let store = WalStore::open(&test_wal_path("find_room.wal")).unwrap();
        let room = store.insert_room(new_room(101, Company::Coke)).await.unwrap();
        assert_eq!(room.id, 1);
        assert_eq!(room.name, "C101");
        assert_eq!(store.find_room(room.id).await.unwrap(), room);
        assert!(matches!(store.find_room(42).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn duplicate_room_rejected() {
        let store = WalStore::open(&test_wal_path("dup_room.wal")).unwrap();
        store.insert_room(new_room(101, Company::Coke)).await.unwrap();
        // Same number, other company is fine.
        store.insert_room(new_room(101, Company::Pepsi)).await.unwrap();
        let err = store.insert_room(new_room(101, Company::Coke)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::IntegrityViolation(Violation::DuplicateRoom { number: 101, company: Company::Coke })
        ));
    }

    #[tokio::test]
    async fn find_rooms_filters() {
        let store = WalStore::open(&test_wal_path("filter_rooms.wal")).unwrap();
        store.insert_room(new_room(1, Company::Coke)).await.unwrap();
        store.insert_room(new_room(2, Company::Pepsi)).await.unwrap();
        store.insert_room(new_room(3, Company::Pepsi)).await.unwrap();

        let all = store.find_rooms(&RoomFilter::default()).await.unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3]);

        let pepsi = store
            .find_rooms(&RoomFilter { name: None, company: Some(Company::Pepsi) })
            .await
            .unwrap();
        assert_eq!(pepsi.len(), 2);

        let named = store
            .find_rooms(&RoomFilter { name: Some("P3".into()), company: None })
            .await
            .unwrap();
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].number, 3);
    }

    #[tokio::test]
    async fn meeting_for_missing_room_is_integrity_violation() {
        let store = WalStore::open(&test_wal_path("missing_room.wal")).unwrap();
        let err = store.insert_meeting(new_meeting(9, DAY)).await.unwrap_err();
        assert!(matches!(err, StoreError::IntegrityViolation(Violation::MissingRoom(9))));
    }

    #[tokio::test]
    async fn exclusion_constraint_rejects_touching_meeting() {
        let store = WalStore::open(&test_wal_path("exclusion.wal")).unwrap();
        let room = store.insert_room(new_room(1, Company::Coke)).await.unwrap();
        let first = store.insert_meeting(new_meeting(room.id, DAY + 9 * H)).await.unwrap();

        let err = store.insert_meeting(new_meeting(room.id, DAY + 10 * H)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::IntegrityViolation(Violation::OverlappingMeeting(id)) if id == first.id
        ));
        store.insert_meeting(new_meeting(room.id, DAY + 11 * H)).await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_inserts_for_same_slot_book_once() {
        let store = Arc::new(WalStore::open(&test_wal_path("race.wal")).unwrap());
        let room_id = store.insert_room(new_room(1, Company::Coke)).await.unwrap().id;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert_meeting(new_meeting(room_id, DAY + 9 * H)).await
            }));
        }
        let mut booked = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                booked += 1;
            }
        }
        assert_eq!(booked, 1);
        assert_eq!(store.find_meetings(Some(room_id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn overlapping_queries_are_inclusive() {
        let store = WalStore::open(&test_wal_path("overlap_queries.wal")).unwrap();
        let a = store.insert_room(new_room(1, Company::Coke)).await.unwrap();
        let b = store.insert_room(new_room(2, Company::Coke)).await.unwrap();
        // Ends exactly at the day's midnight.
        store.insert_meeting(new_meeting(a.id, DAY - H)).await.unwrap();
        store.insert_meeting(new_meeting(a.id, DAY + 3 * H)).await.unwrap();
        store.insert_meeting(new_meeting(b.id, DAY + 5 * H)).await.unwrap();
        store.insert_meeting(new_meeting(b.id, DAY + 30 * H)).await.unwrap();

        let day = Span::new(DAY, DAY + DAY_MS);
        let hits = store.find_meetings_overlapping(day).await.unwrap();
        let starts: Vec<Ms> = hits.iter().map(|m| m.start).collect();
        assert_eq!(starts, vec![DAY - H, DAY + 3 * H, DAY + 5 * H]);

        let in_a = store
            .find_meetings_by_room_overlapping(a.id, Span::new(DAY + 4 * H, DAY + 5 * H))
            .await
            .unwrap();
        assert_eq!(in_a.len(), 1);
        assert_eq!(in_a[0].start, DAY + 3 * H);

        let unknown = store
            .find_meetings_by_room_overlapping(77, day)
            .await
            .unwrap();
        assert!(unknown.is_empty());
    }

    #[tokio::test]
    async fn delete_meeting_and_not_found() {
        let store = WalStore::open(&test_wal_path("delete_meeting.wal")).unwrap();
        let room = store.insert_room(new_room(1, Company::Coke)).await.unwrap();
        let m = store.insert_meeting(new_meeting(room.id, DAY)).await.unwrap();

        store.delete_meeting(m.id).await.unwrap();
        assert!(matches!(store.find_meeting(m.id).await, Err(StoreError::NotFound)));
        assert!(matches!(store.delete_meeting(m.id).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn delete_room_cascades_meetings() {
        let store = WalStore::open(&test_wal_path("cascade.wal")).unwrap();
        let room = store.insert_room(new_room(1, Company::Coke)).await.unwrap();
        let m = store.insert_meeting(new_meeting(room.id, DAY)).await.unwrap();

        store.delete_room(room.id).await.unwrap();
        assert!(matches!(store.find_meeting(m.id).await, Err(StoreError::NotFound)));
        assert!(store.find_meetings(None).await.unwrap().is_empty());
        assert_eq!(store.meeting_count(), 0);
        assert!(matches!(store.delete_room(room.id).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn replay_restores_state_and_sequences() {
        let path = test_wal_path("replay.wal");
        let (room, kept) = {
            let store = WalStore::open(&path).unwrap();
            let room = store.insert_room(new_room(1, Company::Pepsi)).await.unwrap();
            let gone = store.insert_room(new_room(2, Company::Pepsi)).await.unwrap();
            let kept = store.insert_meeting(new_meeting(room.id, DAY)).await.unwrap();
            let dropped = store.insert_meeting(new_meeting(room.id, DAY + 5 * H)).await.unwrap();
            store.insert_meeting(new_meeting(gone.id, DAY)).await.unwrap();
            store.delete_meeting(dropped.id).await.unwrap();
            store.delete_room(gone.id).await.unwrap();
            (room, kept)
        };

        let store = WalStore::open(&path).unwrap();
        assert_eq!(store.room_count(), 1);
        assert_eq!(store.find_room(room.id).await.unwrap(), room);
        assert_eq!(store.find_meetings(None).await.unwrap(), vec![kept]);

        let next = store.insert_meeting(new_meeting(room.id, DAY + 10 * H)).await.unwrap();
        assert_eq!(next.id, 4);
        let next_room = store.insert_room(new_room(3, Company::Coke)).await.unwrap();
        assert_eq!(next_room.id, 3);
    }

    #[tokio::test]
    async fn compaction_preserves_state_and_reserved_ids() {
        let path = test_wal_path("compaction.wal");
        {
            let store = WalStore::open(&path).unwrap();
            let room = store.insert_room(new_room(1, Company::Coke)).await.unwrap();
            for i in 0..10 {
                let m = store.insert_meeting(new_meeting(room.id, DAY + i * 2 * H)).await.unwrap();
                if i % 2 == 1 {
                    store.delete_meeting(m.id).await.unwrap();
                }
            }
            // The highest meeting id (10) was deleted; it must not come back.
            assert_eq!(store.wal_appends_since_compact().await.unwrap(), 16);
            store.compact_wal().await.unwrap();
            assert_eq!(store.wal_appends_since_compact().await.unwrap(), 0);
        }

        let store = WalStore::open(&path).unwrap();
        let meetings = store.find_meetings(None).await.unwrap();
        assert_eq!(meetings.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1, 3, 5, 7, 9]);
        let next = store.insert_meeting(new_meeting(1, DAY + 40 * H)).await.unwrap();
        assert_eq!(next.id, 11);
    }
}
