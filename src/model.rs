use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Half-open stay `[check_in, check_out)` — checkout morning frees the room
/// for a same-day checkin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl DateRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        debug_assert!(check_in < check_out, "check_in must precede check_out");
        Self { check_in, check_out }
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    #[allow(dead_code)]
    pub fn contains_date(&self, d: NaiveDate) -> bool {
        self.check_in <= d && d < self.check_out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    /// Active bookings count toward conflict checks; cancelled ones do not.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(BookingStatus::Pending),
            "Confirmed" => Some(BookingStatus::Confirmed),
            "Cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "Pending",
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::Cancelled => "Cancelled",
        }
    }
}

/// Catalog record. Prices are minor currency units (cents) per night.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: u32,
    pub name: String,
    pub price_cents: i64,
    pub capacity: u32,
    pub amenities: Vec<String>,
    pub description: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A booking carries denormalized snapshots (`room_name`, `price_cents`,
/// `nights`, `total_cents`) taken at creation — later catalog edits never
/// rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    /// Human-readable code (`BK-000042`); resolves to the same record as `id`.
    pub code: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub room_id: u32,
    pub room_name: String,
    pub price_cents: i64,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    pub nights: i64,
    pub total_cents: i64,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn range(&self) -> DateRange {
        DateRange::new(self.check_in, self.check_out)
    }
}

/// A booking id as supplied by a caller — either form must resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingRef {
    Native(Ulid),
    Code(String),
}

impl BookingRef {
    /// Codes (`BK-…`) never parse as ULIDs, so trying the native form first
    /// is unambiguous.
    pub fn parse(s: &str) -> Self {
        match Ulid::from_string(s) {
            Ok(id) => BookingRef::Native(id),
            Err(_) => BookingRef::Code(s.to_string()),
        }
    }
}

impl std::fmt::Display for BookingRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingRef::Native(id) => write!(f, "{id}"),
            BookingRef::Code(code) => write!(f, "{code}"),
        }
    }
}

/// All bookings ever made against one room, sorted by `check_in`.
/// Outlives the catalog record: deleting a room orphans its bookings but
/// keeps them readable.
#[derive(Debug, Default)]
pub struct RoomLedger {
    pub bookings: Vec<Booking>,
}

impl RoomLedger {
    /// Insert maintaining sort order by check-in date.
    pub fn insert(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.check_in, |b| b.check_in)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings whose stay overlaps the query range, regardless of status.
    /// Binary search skips everything checking in at or after `check_out`.
    pub fn overlapping(&self, range: &DateRange) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.check_in < range.check_out);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.check_out > range.check_in)
    }

    /// First Pending/Confirmed booking overlapping `range`, ignoring
    /// `exclude` (used when re-confirming a cancelled booking).
    pub fn active_conflict(&self, range: &DateRange, exclude: Option<Ulid>) -> Option<Ulid> {
        self.overlapping(range)
            .find(|b| b.status.is_active() && Some(b.id) != exclude)
            .map(|b| b.id)
    }
}

/// Flat event set — this is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        room: Room,
    },
    RoomUpdated {
        room: Room,
    },
    RoomDeleted {
        id: u32,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingAmended {
        id: Ulid,
        room_id: u32,
        status: Option<BookingStatus>,
        first_name: Option<String>,
        last_name: Option<String>,
        email: Option<String>,
        phone: Option<String>,
        updated_at: DateTime<Utc>,
    },
    BookingDeleted {
        id: Ulid,
        room_id: u32,
    },
    /// Id-allocation watermarks, written at the head of every compacted log.
    /// Deleted rooms and bookings leave no other trace after compaction;
    /// without this the counters would rewind on replay and reuse their ids.
    Watermark {
        next_room_id: u32,
        next_booking_seq: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn stub_booking(id: Ulid, check_in: &str, check_out: &str, status: BookingStatus) -> Booking {
        let range = DateRange::new(d(check_in), d(check_out));
        Booking {
            id,
            code: format!("BK-{:06}", 1),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            phone: "+44 20 7946 0000".into(),
            room_id: 1,
            room_name: "Garden Suite".into(),
            price_cents: 12_000,
            check_in: range.check_in,
            check_out: range.check_out,
            guests: 2,
            nights: range.nights(),
            total_cents: range.nights() * 12_000,
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn range_nights_and_containment() {
        let r = DateRange::new(d("2025-06-10"), d("2025-06-12"));
        assert_eq!(r.nights(), 2);
        assert!(r.contains_date(d("2025-06-10")));
        assert!(r.contains_date(d("2025-06-11")));
        assert!(!r.contains_date(d("2025-06-12"))); // half-open
    }

    #[test]
    fn range_overlap_half_open() {
        let stay = DateRange::new(d("2025-06-10"), d("2025-06-12"));
        let same_day_turnover = DateRange::new(d("2025-06-12"), d("2025-06-14"));
        let overlapping = DateRange::new(d("2025-06-11"), d("2025-06-13"));
        assert!(!stay.overlaps(&same_day_turnover));
        assert!(stay.overlaps(&overlapping));
    }

    #[test]
    fn status_activity() {
        assert!(BookingStatus::Pending.is_active());
        assert!(BookingStatus::Confirmed.is_active());
        assert!(!BookingStatus::Cancelled.is_active());
    }

    #[test]
    fn status_parse_roundtrip() {
        for s in ["Pending", "Confirmed", "Cancelled"] {
            assert_eq!(BookingStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(BookingStatus::parse("confirmed").is_none());
    }

    #[test]
    fn booking_ref_parse() {
        let id = Ulid::new();
        assert_eq!(BookingRef::parse(&id.to_string()), BookingRef::Native(id));
        assert_eq!(
            BookingRef::parse("BK-000042"),
            BookingRef::Code("BK-000042".into())
        );
    }

    #[test]
    fn ledger_keeps_checkin_order() {
        let mut ledger = RoomLedger::default();
        ledger.insert(stub_booking(Ulid::new(), "2025-07-10", "2025-07-12", BookingStatus::Confirmed));
        ledger.insert(stub_booking(Ulid::new(), "2025-07-01", "2025-07-03", BookingStatus::Confirmed));
        ledger.insert(stub_booking(Ulid::new(), "2025-07-05", "2025-07-08", BookingStatus::Confirmed));
        let check_ins: Vec<_> = ledger.bookings.iter().map(|b| b.check_in).collect();
        assert_eq!(check_ins, vec![d("2025-07-01"), d("2025-07-05"), d("2025-07-10")]);
    }

    #[test]
    fn ledger_overlapping_skips_disjoint() {
        let mut ledger = RoomLedger::default();
        ledger.insert(stub_booking(Ulid::new(), "2025-07-01", "2025-07-04", BookingStatus::Confirmed));
        ledger.insert(stub_booking(Ulid::new(), "2025-07-10", "2025-07-12", BookingStatus::Confirmed));
        let query = DateRange::new(d("2025-07-04"), d("2025-07-10"));
        assert_eq!(ledger.overlapping(&query).count(), 0);
        let query = DateRange::new(d("2025-07-03"), d("2025-07-05"));
        assert_eq!(ledger.overlapping(&query).count(), 1);
    }

    #[test]
    fn ledger_conflict_ignores_cancelled() {
        let mut ledger = RoomLedger::default();
        ledger.insert(stub_booking(Ulid::new(), "2025-07-01", "2025-07-04", BookingStatus::Cancelled));
        let query = DateRange::new(d("2025-07-02"), d("2025-07-03"));
        assert!(ledger.active_conflict(&query, None).is_none());
    }

    #[test]
    fn ledger_conflict_excludes_self() {
        let id = Ulid::new();
        let mut ledger = RoomLedger::default();
        ledger.insert(stub_booking(id, "2025-07-01", "2025-07-04", BookingStatus::Confirmed));
        let range = DateRange::new(d("2025-07-01"), d("2025-07-04"));
        assert_eq!(ledger.active_conflict(&range, None), Some(id));
        assert!(ledger.active_conflict(&range, Some(id)).is_none());
    }

    #[test]
    fn ledger_remove_nonexistent() {
        let mut ledger = RoomLedger::default();
        ledger.insert(stub_booking(Ulid::new(), "2025-07-01", "2025-07-04", BookingStatus::Confirmed));
        assert!(ledger.remove(Ulid::new()).is_none());
        assert_eq!(ledger.bookings.len(), 1);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingCreated {
            booking: stub_booking(Ulid::new(), "2025-07-01", "2025-07-04", BookingStatus::Confirmed),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
