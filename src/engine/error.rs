use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{format_date, MalformedRecord, Slot, SlotStatus};

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    NotPending(Ulid),
    UnknownHall(String),
    /// Requests may only be made for today or later.
    PastDate(NaiveDate),
    /// The slot was free in the caller's snapshot but is not any more.
    StaleConflict {
        hall: String,
        date: NaiveDate,
        slot: Slot,
        status: SlotStatus,
    },
    Forbidden(&'static str),
    Malformed(MalformedRecord),
    LimitExceeded(&'static str),
    /// Persistence failed; the operation did not happen and may be retried.
    StoreUnavailable(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::StaleConflict { .. } | EngineError::StoreUnavailable(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::NotPending(id) => write!(f, "request {id} is not pending"),
            EngineError::UnknownHall(hall) => write!(f, "unknown hall: {hall}"),
            EngineError::PastDate(date) => write!(f, "cannot request a past date: {}", format_date(*date)),
            EngineError::StaleConflict {
                hall,
                date,
                slot,
                status,
            } => {
                write!(
                    f,
                    "slot no longer available: {hall} {} {} is {status}",
                    format_date(*date),
                    slot.label()
                )
            }
            EngineError::Forbidden(what) => write!(f, "forbidden: {what} requires an administrator"),
            EngineError::Malformed(e) => write!(f, "malformed record: {e}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::StoreUnavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<MalformedRecord> for EngineError {
    fn from(e: MalformedRecord) -> Self {
        EngineError::Malformed(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(EngineError::StoreUnavailable("disk full".into()).is_retryable());
        assert!(!EngineError::Forbidden("approve").is_retryable());
        assert!(!EngineError::Malformed(MalformedRecord::MissingField("slot")).is_retryable());
        let e: EngineError = MalformedRecord::MissingField("hall").into();
        assert!(matches!(e, EngineError::Malformed(MalformedRecord::MissingField("hall"))));
    }
}
