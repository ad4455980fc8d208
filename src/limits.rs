//! Hard caps protecting the in-memory store from pathological input.

use chrono::NaiveDate;

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_BOOKINGS_PER_ROOM: usize = 50_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_FIELD_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 4_096;
pub const MAX_URL_LEN: usize = 2_048;
pub const MAX_AMENITIES: usize = 64;

/// Longest bookable stay, in nights.
pub const MAX_STAY_NIGHTS: i64 = 365;

/// Bookable calendar window; anything outside is a typo, not a reservation.
pub fn min_valid_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).expect("constant date")
}

pub fn max_valid_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2100, 12, 31).expect("constant date")
}
