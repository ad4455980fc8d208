use crate::model::{DateRange, Room};

use super::validate::validate_range;
use super::{Engine, EngineError};

impl Engine {
    /// The availability resolver: which rooms can host `min_capacity` guests
    /// over `range`?
    ///
    /// Capacity filters first; the date filter then drops every room whose
    /// ledger holds an active booking overlapping the half-open range. With
    /// no range this is catalog browse mode. Results come back in catalog
    /// order (ascending room id — ids are assigned in insertion order).
    /// Read-only.
    pub async fn available_rooms(
        &self,
        range: Option<DateRange>,
        min_capacity: Option<u32>,
    ) -> Result<Vec<Room>, EngineError> {
        if let Some(ref r) = range {
            validate_range(r)?;
        }

        let mut rooms: Vec<Room> = self
            .catalog
            .iter()
            .map(|e| e.value().clone())
            .filter(|room| min_capacity.is_none_or(|c| room.capacity >= c))
            .collect();
        rooms.sort_by_key(|r| r.id);

        let Some(range) = range else {
            return Ok(rooms);
        };

        let mut free = Vec::with_capacity(rooms.len());
        for room in rooms {
            let ledger = self.ledger(room.id);
            let guard = ledger.read().await;
            if guard.active_conflict(&range, None).is_none() {
                free.push(room);
            }
        }
        Ok(free)
    }
}
