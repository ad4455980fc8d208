use ulid::Ulid;

/// Engine failure taxonomy. The HTTP boundary maps each variant to a status
/// class; callers can tell a scheduling conflict from bad input.
#[derive(Debug)]
pub enum EngineError {
    /// Malformed or missing input — the caller's fault, never retried.
    Validation(&'static str),
    /// The requested range overlaps an active booking on that room.
    Conflict(Ulid),
    RoomNotFound(u32),
    BookingNotFound(String),
    LimitExceeded(&'static str),
    /// Persistence failure — transient, safe to retry with backoff.
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid input: {msg}"),
            EngineError::Conflict(id) => {
                write!(f, "dates conflict with existing booking: {id}")
            }
            EngineError::RoomNotFound(id) => write!(f, "room not found: {id}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
