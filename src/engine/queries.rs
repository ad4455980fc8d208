use crate::model::*;

use super::mutations::find_in_ledger;
use super::{Engine, EngineError};

impl Engine {
    /// Full catalog in id order.
    pub fn list_rooms(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.catalog.iter().map(|e| e.value().clone()).collect();
        rooms.sort_by_key(|r| r.id);
        rooms
    }

    pub fn get_room(&self, id: u32) -> Result<Room, EngineError> {
        self.catalog
            .get(&id)
            .map(|r| r.clone())
            .ok_or(EngineError::RoomNotFound(id))
    }

    /// All bookings across every ledger (orphans included), newest first,
    /// optionally restricted to one guest email.
    pub async fn list_bookings(&self, email: Option<&str>) -> Vec<Booking> {
        let ledger_ids: Vec<u32> = self.ledgers.iter().map(|e| *e.key()).collect();
        let mut out = Vec::new();
        for room_id in ledger_ids {
            let ledger = self.ledger(room_id);
            let guard = ledger.read().await;
            for booking in &guard.bookings {
                if email.is_none_or(|e| booking.email == e) {
                    out.push(booking.clone());
                }
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// Dual-form lookup: native ULID or human-readable code.
    pub async fn get_booking(&self, r: &BookingRef) -> Result<Booking, EngineError> {
        let room_id = self.resolve_booking_room(r)?;
        let ledger = self.ledger(room_id);
        let guard = ledger.read().await;
        find_in_ledger(&guard, r)
            .cloned()
            .ok_or_else(|| EngineError::BookingNotFound(r.to_string()))
    }
}
