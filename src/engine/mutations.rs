use std::sync::atomic::Ordering;

use chrono::{NaiveDate, Utc};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::validate::{check_no_conflict, email_shape_ok, validate_contact, validate_range};
use super::{Engine, EngineError};

/// Catalog input, already shape-checked by the HTTP layer for presence.
#[derive(Debug, Clone)]
pub struct RoomDraft {
    pub name: String,
    pub price_cents: i64,
    pub capacity: u32,
    pub amenities: Vec<String>,
    pub description: String,
    pub image_url: String,
}

#[derive(Debug, Clone)]
pub struct BookingDraft {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub room_id: u32,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
}

/// Partial update for PATCH: status transition and/or contact fields.
#[derive(Debug, Clone, Default)]
pub struct BookingPatch {
    pub status: Option<BookingStatus>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

fn validate_room_draft(draft: &RoomDraft) -> Result<(), EngineError> {
    if draft.name.trim().is_empty() {
        return Err(EngineError::Validation("room name is required"));
    }
    if draft.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("room name too long"));
    }
    if draft.price_cents <= 0 {
        return Err(EngineError::Validation("price must be positive"));
    }
    if draft.capacity == 0 {
        return Err(EngineError::Validation("capacity must be positive"));
    }
    if draft.amenities.len() > MAX_AMENITIES {
        return Err(EngineError::LimitExceeded("too many amenities"));
    }
    if draft.amenities.iter().any(|a| a.len() > MAX_NAME_LEN) {
        return Err(EngineError::LimitExceeded("amenity tag too long"));
    }
    if draft.description.len() > MAX_DESCRIPTION_LEN {
        return Err(EngineError::LimitExceeded("description too long"));
    }
    if draft.image_url.len() > MAX_URL_LEN {
        return Err(EngineError::LimitExceeded("image URL too long"));
    }
    Ok(())
}

impl Engine {
    // ── Room catalog CRUD ────────────────────────────────

    pub async fn create_room(&self, draft: RoomDraft) -> Result<Room, EngineError> {
        validate_room_draft(&draft)?;
        let _gate = self.compaction_gate.read().await;
        if self.catalog.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }

        let now = Utc::now();
        let room = Room {
            id: self.allocate_room_id(),
            name: draft.name,
            price_cents: draft.price_cents,
            capacity: draft.capacity,
            amenities: draft.amenities,
            description: draft.description,
            image_url: draft.image_url,
            created_at: now,
            updated_at: now,
        };

        let event = Event::RoomCreated { room: room.clone() };
        self.wal_append(&event).await?;
        self.catalog.insert(room.id, room.clone());
        self.ledgers.entry(room.id).or_default();
        Ok(room)
    }

    /// In-place update. Existing bookings keep their price/name snapshots;
    /// nothing here touches a ledger.
    pub async fn update_room(&self, id: u32, draft: RoomDraft) -> Result<Room, EngineError> {
        validate_room_draft(&draft)?;
        let _gate = self.compaction_gate.read().await;
        let existing = self
            .catalog
            .get(&id)
            .map(|r| r.clone())
            .ok_or(EngineError::RoomNotFound(id))?;

        let room = Room {
            id,
            name: draft.name,
            price_cents: draft.price_cents,
            capacity: draft.capacity,
            amenities: draft.amenities,
            description: draft.description,
            image_url: draft.image_url,
            created_at: existing.created_at,
            updated_at: Utc::now(),
        };

        let event = Event::RoomUpdated { room: room.clone() };
        self.wal_append(&event).await?;
        self.catalog.insert(id, room.clone());
        Ok(room)
    }

    /// Removes the catalog record only. The room's ledger survives, so its
    /// bookings become orphans that still resolve by id or code.
    pub async fn delete_room(&self, id: u32) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        if !self.catalog.contains_key(&id) {
            return Err(EngineError::RoomNotFound(id));
        }
        let event = Event::RoomDeleted { id };
        self.wal_append(&event).await?;
        self.catalog.remove(&id);
        Ok(())
    }

    // ── Booking lifecycle ────────────────────────────────

    /// Create a booking. The conflict check runs under the room ledger's
    /// write lock, which is held through the insert — two concurrent
    /// requests for the same room cannot both pass the check.
    pub async fn create_booking(&self, draft: BookingDraft) -> Result<Booking, EngineError> {
        validate_contact(&draft.first_name, &draft.last_name, &draft.email, &draft.phone)?;
        if draft.guests == 0 {
            return Err(EngineError::Validation("at least one guest is required"));
        }
        let range = DateRange {
            check_in: draft.check_in,
            check_out: draft.check_out,
        };
        validate_range(&range)?;

        let _gate = self.compaction_gate.read().await;
        let room = self
            .catalog
            .get(&draft.room_id)
            .map(|r| r.clone())
            .ok_or(EngineError::RoomNotFound(draft.room_id))?;
        if draft.guests > room.capacity {
            return Err(EngineError::Validation("party exceeds room capacity"));
        }

        let ledger = self.ledger(room.id);
        let mut guard = ledger.write().await;

        // Room may have been deleted between the lookup above and taking
        // the lock; a booking against a vanished room must not commit.
        if !self.catalog.contains_key(&room.id) {
            return Err(EngineError::RoomNotFound(room.id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }

        if let Err(e) = check_no_conflict(&guard, &range, None) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let now = Utc::now();
        let nights = range.nights();
        let booking = Booking {
            id: Ulid::new(),
            code: self.allocate_booking_code(),
            first_name: draft.first_name,
            last_name: draft.last_name,
            email: draft.email,
            phone: draft.phone,
            room_id: room.id,
            room_name: room.name.clone(),
            price_cents: room.price_cents,
            check_in: range.check_in,
            check_out: range.check_out,
            guests: draft.guests,
            nights,
            total_cents: nights * room.price_cents,
            status: self.default_status,
            created_at: now,
            updated_at: now,
        };

        let event = Event::BookingCreated { booking: booking.clone() };
        self.persist_to_ledger(&mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        Ok(booking)
    }

    /// Status transition and/or contact update. Any transition out of
    /// Cancelled re-runs the conflict check — the slot may have been taken
    /// while the booking sat cancelled. Cancelling twice is a no-op success.
    pub async fn amend_booking(
        &self,
        r: &BookingRef,
        patch: BookingPatch,
    ) -> Result<Booking, EngineError> {
        if let Some(ref v) = patch.first_name
            && v.trim().is_empty() {
                return Err(EngineError::Validation("first name is required"));
            }
        if let Some(ref v) = patch.last_name
            && v.trim().is_empty() {
                return Err(EngineError::Validation("last name is required"));
            }
        if let Some(ref v) = patch.email
            && !email_shape_ok(v) {
                return Err(EngineError::Validation("invalid email format"));
            }
        if let Some(ref v) = patch.phone
            && v.trim().is_empty() {
                return Err(EngineError::Validation("phone is required"));
            }

        let _gate = self.compaction_gate.read().await;
        let room_id = self.resolve_booking_room(r)?;
        let ledger = self.ledger(room_id);
        let mut guard = ledger.write().await;

        let current = find_in_ledger(&guard, r)
            .ok_or_else(|| EngineError::BookingNotFound(r.to_string()))?
            .clone();

        if let Some(new_status) = patch.status
            && current.status == BookingStatus::Cancelled
            && new_status.is_active()
        {
            check_no_conflict(&guard, &current.range(), Some(current.id))?;
        }

        let event = Event::BookingAmended {
            id: current.id,
            room_id,
            status: patch.status,
            first_name: patch.first_name,
            last_name: patch.last_name,
            email: patch.email,
            phone: patch.phone,
            updated_at: Utc::now(),
        };
        self.persist_to_ledger(&mut guard, &event).await?;

        guard
            .get(current.id)
            .cloned()
            .ok_or_else(|| EngineError::BookingNotFound(r.to_string()))
    }

    /// Permanent removal; the room catalog is untouched.
    pub async fn delete_booking(&self, r: &BookingRef) -> Result<Booking, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let room_id = self.resolve_booking_room(r)?;
        let ledger = self.ledger(room_id);
        let mut guard = ledger.write().await;

        let removed = find_in_ledger(&guard, r)
            .ok_or_else(|| EngineError::BookingNotFound(r.to_string()))?
            .clone();

        let event = Event::BookingDeleted { id: removed.id, room_id };
        self.persist_to_ledger(&mut guard, &event).await?;
        Ok(removed)
    }

    // ── Maintenance ──────────────────────────────────────

    /// Rewrite the WAL with only the events needed to recreate the current
    /// state: the counter watermarks, one create per live room, one per
    /// surviving booking. Takes the gate exclusively so no append commits
    /// while the snapshot is collected.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.write().await;

        let mut events = vec![Event::Watermark {
            next_room_id: self.next_room_id.load(Ordering::SeqCst),
            next_booking_seq: self.next_booking_seq.load(Ordering::SeqCst),
        }];

        let mut rooms: Vec<Room> = self.catalog.iter().map(|e| e.value().clone()).collect();
        rooms.sort_by_key(|r| r.id);
        for room in rooms {
            events.push(Event::RoomCreated { room });
        }

        let ledger_ids: Vec<u32> = self.ledgers.iter().map(|e| *e.key()).collect();
        for room_id in ledger_ids {
            let ledger = self.ledger(room_id);
            let guard = ledger.read().await;
            for booking in &guard.bookings {
                events.push(Event::BookingCreated { booking: booking.clone() });
            }
        }

        self.send_compact(events).await
    }
}

/// Find a booking inside a locked ledger by either id form.
pub(super) fn find_in_ledger<'a>(ledger: &'a RoomLedger, r: &BookingRef) -> Option<&'a Booking> {
    match r {
        BookingRef::Native(id) => ledger.get(*id),
        BookingRef::Code(code) => ledger.bookings.iter().find(|b| &b.code == code),
    }
}
