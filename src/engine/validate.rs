use crate::limits::*;
use crate::model::{DateRange, RoomLedger};
use ulid::Ulid;

use super::EngineError;

/// A stay must be at least one night, within the bookable calendar window,
/// and not absurdly long.
pub(super) fn validate_range(range: &DateRange) -> Result<(), EngineError> {
    if range.check_out <= range.check_in {
        return Err(EngineError::Validation("check-out must be after check-in"));
    }
    if range.check_in < min_valid_date() || range.check_out > max_valid_date() {
        return Err(EngineError::Validation("dates out of bookable window"));
    }
    if range.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

/// Minimal email shape check: non-empty local part, one `@`, a dot in the
/// domain, no whitespace. Deliverability is someone else's problem.
pub(super) fn email_shape_ok(email: &str) -> bool {
    if email.len() > MAX_FIELD_LEN || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

fn require_field(value: &str, err: &'static str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::Validation(err));
    }
    if value.len() > MAX_FIELD_LEN {
        return Err(EngineError::LimitExceeded("guest field too long"));
    }
    Ok(())
}

pub(super) fn validate_contact(
    first_name: &str,
    last_name: &str,
    email: &str,
    phone: &str,
) -> Result<(), EngineError> {
    require_field(first_name, "first name is required")?;
    require_field(last_name, "last name is required")?;
    require_field(email, "email is required")?;
    require_field(phone, "phone is required")?;
    if !email_shape_ok(email) {
        return Err(EngineError::Validation("invalid email format"));
    }
    Ok(())
}

/// Conflict check per the half-open overlap rule: fails if any Pending or
/// Confirmed booking on this ledger overlaps `range`. `exclude` skips the
/// booking being re-confirmed.
pub(super) fn check_no_conflict(
    ledger: &RoomLedger,
    range: &DateRange,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match ledger.active_conflict(range, exclude) {
        Some(id) => Err(EngineError::Conflict(id)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn zero_night_range_rejected() {
        let r = DateRange {
            check_in: d("2025-06-10"),
            check_out: d("2025-06-10"),
        };
        assert!(matches!(
            validate_range(&r),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn inverted_range_rejected() {
        let r = DateRange {
            check_in: d("2025-06-12"),
            check_out: d("2025-06-10"),
        };
        assert!(validate_range(&r).is_err());
    }

    #[test]
    fn single_night_accepted() {
        let r = DateRange::new(d("2025-06-10"), d("2025-06-11"));
        assert!(validate_range(&r).is_ok());
    }

    #[test]
    fn year_long_stay_rejected() {
        let r = DateRange::new(d("2025-01-01"), d("2026-06-01"));
        assert!(matches!(
            validate_range(&r),
            Err(EngineError::LimitExceeded(_))
        ));
    }

    #[test]
    fn ancient_dates_rejected() {
        let r = DateRange::new(d("1999-12-30"), d("1999-12-31"));
        assert!(validate_range(&r).is_err());
    }

    #[test]
    fn email_shapes() {
        assert!(email_shape_ok("guest@example.com"));
        assert!(email_shape_ok("a.b+c@mail.co.uk"));
        assert!(!email_shape_ok("no-at-sign.example.com"));
        assert!(!email_shape_ok("@example.com"));
        assert!(!email_shape_ok("guest@nodot"));
        assert!(!email_shape_ok("guest@.com"));
        assert!(!email_shape_ok("sp ace@example.com"));
    }

    #[test]
    fn contact_requires_all_fields() {
        assert!(validate_contact("Ada", "Lovelace", "ada@example.com", "555").is_ok());
        assert!(validate_contact("", "Lovelace", "ada@example.com", "555").is_err());
        assert!(validate_contact("Ada", "  ", "ada@example.com", "555").is_err());
        assert!(validate_contact("Ada", "Lovelace", "not-an-email", "555").is_err());
        assert!(validate_contact("Ada", "Lovelace", "ada@example.com", "").is_err());
    }
}
