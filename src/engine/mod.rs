mod availability;
mod error;
mod mutations;
mod queries;
mod validate;

pub use error::EngineError;
pub use mutations::{BookingDraft, BookingPatch, RoomDraft};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedLedger = Arc<RwLock<RoomLedger>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
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

/// Background task that owns the WAL and batches appends for group commit:
/// block on the first append, drain whatever else is immediately queued,
/// flush + fsync once, then answer every waiting sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush the batch first, then the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &[(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even on append error so partially buffered bytes don't leak
    // into the next batch (these callers were told their batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking engine: room catalog, per-room booking ledgers, and the WAL
/// that makes both durable. All HTTP handlers share one instance.
pub struct Engine {
    /// Live catalog records. Removal does not touch `ledgers`.
    pub(super) catalog: DashMap<u32, Room>,
    /// Booking ledgers keyed by room id, one lock per room. Retained after
    /// room deletion so orphaned bookings stay resolvable.
    pub(super) ledgers: DashMap<u32, SharedLedger>,
    /// Native id → room id.
    pub(super) booking_rooms: DashMap<Ulid, u32>,
    /// Human-readable code → room id.
    pub(super) code_rooms: DashMap<String, u32>,
    next_room_id: AtomicU32,
    next_booking_seq: AtomicU64,
    /// Status given to new bookings (guest self-service: Confirmed;
    /// staff-approval flows: Pending).
    pub(super) default_status: BookingStatus,
    /// Mutations hold this shared, compaction exclusive. An acked append can
    /// therefore never land between the state snapshot and the rewritten log
    /// file, where it would vanish on the next replay. Always taken before
    /// any ledger lock.
    pub(super) compaction_gate: RwLock<()>,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, default_status: BookingStatus) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            catalog: DashMap::new(),
            ledgers: DashMap::new(),
            booking_rooms: DashMap::new(),
            code_rooms: DashMap::new(),
            next_room_id: AtomicU32::new(1),
            next_booking_seq: AtomicU64::new(1),
            default_status,
            compaction_gate: RwLock::new(()),
            wal_tx,
        };

        // Replay — sole owner at this point, so try_write never contends.
        // Never block_on here: replay may run inside an async context.
        for event in &events {
            match event {
                Event::RoomCreated { room } | Event::RoomUpdated { room } => {
                    engine.bump_room_counter(room.id);
                    engine.catalog.insert(room.id, room.clone());
                    engine.ledgers.entry(room.id).or_default();
                }
                Event::RoomDeleted { id } => {
                    engine.catalog.remove(id);
                }
                Event::Watermark {
                    next_room_id,
                    next_booking_seq,
                } => {
                    engine.next_room_id.fetch_max(*next_room_id, Ordering::SeqCst);
                    engine
                        .next_booking_seq
                        .fetch_max(*next_booking_seq, Ordering::SeqCst);
                }
                other => {
                    if let Some(room_id) = booking_event_room(other) {
                        let ledger = engine.ledgers.entry(room_id).or_default().clone();
                        let mut guard =
                            ledger.try_write().expect("replay: uncontended write");
                        engine.apply_booking_event(&mut guard, other);
                    }
                }
            }
        }

        Ok(engine)
    }

    fn bump_room_counter(&self, seen_id: u32) {
        self.next_room_id.fetch_max(seen_id + 1, Ordering::SeqCst);
    }

    /// Room ids are never reused: the counter only moves forward, even when
    /// the highest-numbered room is deleted.
    pub(super) fn allocate_room_id(&self) -> u32 {
        self.next_room_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(super) fn allocate_booking_code(&self) -> String {
        let seq = self.next_booking_seq.fetch_add(1, Ordering::SeqCst);
        format!("BK-{seq:06}")
    }

    /// Write event to the WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Ledger for a room, created on first touch.
    pub(super) fn ledger(&self, room_id: u32) -> SharedLedger {
        self.ledgers.entry(room_id).or_default().clone()
    }

    /// Resolve a caller-supplied booking id to its room via whichever index
    /// matches — native ULID or denormalized code.
    pub(super) fn resolve_booking_room(&self, r: &BookingRef) -> Result<u32, EngineError> {
        let room_id = match r {
            BookingRef::Native(id) => self.booking_rooms.get(id).map(|e| *e.value()),
            BookingRef::Code(code) => self.code_rooms.get(code).map(|e| *e.value()),
        };
        room_id.ok_or_else(|| EngineError::BookingNotFound(r.to_string()))
    }

    /// Apply a booking event to a ledger the caller has locked, keeping the
    /// id indexes in step.
    pub(super) fn apply_booking_event(&self, ledger: &mut RoomLedger, event: &Event) {
        match event {
            Event::BookingCreated { booking } => {
                self.booking_rooms.insert(booking.id, booking.room_id);
                self.code_rooms.insert(booking.code.clone(), booking.room_id);
                self.bump_booking_seq(&booking.code);
                ledger.insert(booking.clone());
            }
            Event::BookingAmended {
                id,
                status,
                first_name,
                last_name,
                email,
                phone,
                updated_at,
                ..
            } => {
                if let Some(b) = ledger.get_mut(*id) {
                    if let Some(s) = status {
                        b.status = *s;
                    }
                    if let Some(v) = first_name {
                        b.first_name = v.clone();
                    }
                    if let Some(v) = last_name {
                        b.last_name = v.clone();
                    }
                    if let Some(v) = email {
                        b.email = v.clone();
                    }
                    if let Some(v) = phone {
                        b.phone = v.clone();
                    }
                    b.updated_at = *updated_at;
                }
            }
            Event::BookingDeleted { id, .. } => {
                if let Some(removed) = ledger.remove(*id) {
                    self.booking_rooms.remove(&removed.id);
                    self.code_rooms.remove(&removed.code);
                }
            }
            Event::RoomCreated { .. }
            | Event::RoomUpdated { .. }
            | Event::RoomDeleted { .. }
            | Event::Watermark { .. } => {}
        }
    }

    fn bump_booking_seq(&self, code: &str) {
        if let Some(seq) = code.strip_prefix("BK-").and_then(|s| s.parse::<u64>().ok()) {
            self.next_booking_seq.fetch_max(seq + 1, Ordering::SeqCst);
        }
    }

    /// WAL-append then apply under the caller's ledger lock. The event is
    /// durable before it becomes visible.
    pub(super) async fn persist_to_ledger(
        &self,
        ledger: &mut RoomLedger,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_booking_event(ledger, event);
        Ok(())
    }

    /// Pending appends since the last compaction, as seen by the writer task.
    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    pub(super) async fn send_compact(&self, events: Vec<Event>) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }
}

/// Room id a booking event belongs to (room events are handled at the
/// catalog level, not per-ledger).
fn booking_event_room(event: &Event) -> Option<u32> {
    match event {
        Event::BookingCreated { booking } => Some(booking.room_id),
        Event::BookingAmended { room_id, .. } | Event::BookingDeleted { room_id, .. } => {
            Some(*room_id)
        }
        Event::RoomCreated { .. }
        | Event::RoomUpdated { .. }
        | Event::RoomDeleted { .. }
        | Event::Watermark { .. } => None,
    }
}
