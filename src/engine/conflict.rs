use chrono::NaiveDate;

use crate::halls;
use crate::limits::*;
use crate::model::*;

use super::availability::classify;
use super::EngineError;

pub(crate) fn validate_request(req: &NewRequest, today: NaiveDate) -> Result<(), EngineError> {
    if halls::lookup(&req.hall).is_none() {
        return Err(EngineError::UnknownHall(req.hall.clone()));
    }
    if req.date < today {
        return Err(EngineError::PastDate(req.date));
    }
    if req.event_name.len() > MAX_EVENT_NAME_LEN {
        return Err(EngineError::LimitExceeded("event name too long"));
    }
    let r = &req.requester;
    for field in [&r.name, &r.email, &r.department, &r.designation, &r.phone] {
        if field.len() > MAX_FIELD_LEN {
            return Err(EngineError::LimitExceeded("requester field too long"));
        }
    }
    Ok(())
}

/// Re-run classification and refuse anything that is no longer free.
pub(crate) fn ensure_available<R: super::availability::AsClaim>(
    records: &[R],
    key: &DayKey,
    slot: Slot,
) -> Result<(), EngineError> {
    match classify(records, &key.hall, key.date, slot) {
        SlotStatus::Available => Ok(()),
        status => {
            metrics::counter!(crate::observability::STALE_CONFLICTS_TOTAL).increment(1);
            Err(EngineError::StaleConflict {
                hall: key.hall.clone(),
                date: key.date,
                slot,
                status,
            })
        }
    }
}

/// Approval looks at the approved collection only: the candidate itself and
/// its fellow pending requests must not block it.
pub(crate) fn check_approvable(day: &DayState, record: &ReservationRecord) -> Result<(), EngineError> {
    let approved: Vec<&ReservationRecord> = day.approved().collect();
    ensure_available(&approved, &day.key, record.slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn key() -> DayKey {
        DayKey::new("emerald", NaiveDate::from_ymd_opt(2025, 3, 10).unwrap())
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn record(slot: Slot, status: RecordStatus) -> ReservationRecord {
        ReservationRecord {
            id: Ulid::new(),
            hall: "emerald".into(),
            date: key().date,
            slot,
            status,
            requester: Requester::default(),
            event_name: String::new(),
        }
    }

    fn request(hall: &str) -> NewRequest {
        NewRequest {
            hall: hall.into(),
            date: key().date,
            slot: Slot::Forenoon,
            event_name: "Seminar".into(),
            requester: Requester::default(),
        }
    }

    #[test]
    fn validate_rejects_unknown_hall() {
        assert!(validate_request(&request("emerald"), today()).is_ok());
        assert!(matches!(
            validate_request(&request("atlantis"), today()),
            Err(EngineError::UnknownHall(h)) if h == "atlantis"
        ));
    }

    #[test]
    fn validate_rejects_past_dates() {
        let req = request("emerald");
        assert!(validate_request(&req, key().date).is_ok());
        let next_day = key().date.succ_opt().unwrap();
        assert!(matches!(
            validate_request(&req, next_day),
            Err(EngineError::PastDate(d)) if d == key().date
        ));
    }

    #[test]
    fn validate_rejects_long_fields() {
        let mut req = request("emerald");
        req.event_name = "x".repeat(MAX_EVENT_NAME_LEN + 1);
        assert!(matches!(validate_request(&req, today()), Err(EngineError::LimitExceeded(_))));

        let mut req = request("emerald");
        req.requester.phone = "9".repeat(MAX_FIELD_LEN + 1);
        assert!(matches!(validate_request(&req, today()), Err(EngineError::LimitExceeded(_))));
    }

    #[test]
    fn approval_ignores_other_pending() {
        let candidate = record(Slot::Forenoon, RecordStatus::Pending);
        let mut day = DayState::new(key());
        day.records.push(candidate.clone());
        day.records.push(record(Slot::FullDay, RecordStatus::Pending));
        assert!(check_approvable(&day, &candidate).is_ok());
    }

    #[test]
    fn approval_refused_once_booked() {
        let candidate = record(Slot::Forenoon, RecordStatus::Pending);
        let mut day = DayState::new(key());
        day.records.push(record(Slot::Forenoon, RecordStatus::Approved));
        day.records.push(candidate.clone());
        match check_approvable(&day, &candidate) {
            Err(EngineError::StaleConflict { status, slot, .. }) => {
                assert_eq!(status, SlotStatus::Booked);
                assert_eq!(slot, Slot::Forenoon);
            }
            other => panic!("expected StaleConflict, got {other:?}"),
        }
    }

    #[test]
    fn approval_refused_by_indirect_overlap() {
        let candidate = record(Slot::FullDay, RecordStatus::Pending);
        let mut day = DayState::new(key());
        day.records.push(record(Slot::Afternoon, RecordStatus::Approved));
        day.records.push(candidate.clone());
        assert!(matches!(
            check_approvable(&day, &candidate),
            Err(EngineError::StaleConflict { status: SlotStatus::Unavailable, .. })
        ));
    }
}
