use chrono::NaiveDate;
use tracing::debug;

use crate::model::*;

// ── Claims ────────────────────────────────────────────────────────

/// The four fields classification looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim<'a> {
    pub hall: &'a str,
    pub date: NaiveDate,
    pub slot: Slot,
    pub status: RecordStatus,
}

/// Anything that can stand in a snapshot: typed records always yield a claim,
/// raw documents may be malformed.
pub trait AsClaim {
    fn claim(&self) -> Result<Claim<'_>, MalformedRecord>;
}

impl AsClaim for ReservationRecord {
    fn claim(&self) -> Result<Claim<'_>, MalformedRecord> {
        Ok(Claim {
            hall: &self.hall,
            date: self.date,
            slot: self.slot,
            status: self.status,
        })
    }
}

impl AsClaim for StoredDocument {
    fn claim(&self) -> Result<Claim<'_>, MalformedRecord> {
        let (hall, date, slot) = self.placement()?;
        let status = self.stored_status()?.ok_or(MalformedRecord::MissingField("status"))?;
        Ok(Claim {
            hall,
            date,
            slot,
            status,
        })
    }
}

impl AsClaim for Claim<'_> {
    fn claim(&self) -> Result<Claim<'_>, MalformedRecord> {
        Ok(*self)
    }
}

impl<T: AsClaim + ?Sized> AsClaim for &T {
    fn claim(&self) -> Result<Claim<'_>, MalformedRecord> {
        (**self).claim()
    }
}

/// Well-formed claims only. Malformed entries are logged and skipped so they
/// can never show up as a conflict.
fn valid_claims<R: AsClaim>(records: &[R]) -> impl Iterator<Item = Claim<'_>> {
    records.iter().filter_map(|r| match r.claim() {
        Ok(c) => Some(c),
        Err(e) => {
            debug!("ignoring malformed record: {e}");
            None
        }
    })
}

// ── Resolver ──────────────────────────────────────────────────────

/// Classify a candidate slot against a hall/date snapshot.
///
/// Same-kind records decide `Booked`/`Pending` (approved wins). Overlapping
/// records of another kind only make the slot `Unavailable`. Records for a
/// different hall or date never count.
pub fn classify<R: AsClaim>(records: &[R], hall: &str, date: NaiveDate, slot: Slot) -> SlotStatus {
    let mut direct_approved = false;
    let mut direct_pending = false;
    let mut indirect = false;

    for claim in valid_claims(records) {
        if claim.hall != hall || claim.date != date || !claim.slot.overlaps(slot) {
            continue;
        }
        if claim.slot == slot {
            match claim.status {
                RecordStatus::Approved => direct_approved = true,
                RecordStatus::Pending => direct_pending = true,
            }
        } else {
            indirect = true;
        }
    }

    if direct_approved {
        SlotStatus::Booked
    } else if direct_pending {
        SlotStatus::Pending
    } else if indirect {
        SlotStatus::Unavailable
    } else {
        SlotStatus::Available
    }
}

pub fn can_submit<R: AsClaim>(records: &[R], hall: &str, date: NaiveDate, slot: Slot) -> bool {
    classify(records, hall, date, slot) == SlotStatus::Available
}

/// Both half-days held by approved records. Pending requests never make a
/// hall fully booked. The snapshot is assumed pre-filtered to one hall/date.
pub fn is_hall_fully_booked<R: AsClaim>(records: &[R]) -> bool {
    let covered = |half: Slot| {
        valid_claims(records).any(|c| c.status == RecordStatus::Approved && c.slot.overlaps(half))
    };
    covered(Slot::Forenoon) && covered(Slot::Afternoon)
}

pub fn day_overview<R: AsClaim>(records: &[R], hall: &str, date: NaiveDate) -> DayAvailability {
    let status = |slot| (slot, classify(records, hall, date, slot));
    let scoped: Vec<Claim<'_>> = valid_claims(records)
        .filter(|c| c.hall == hall && c.date == date)
        .collect();
    DayAvailability {
        hall: hall.to_string(),
        date,
        slots: [
            status(Slot::FullDay),
            status(Slot::Forenoon),
            status(Slot::Afternoon),
        ],
        fully_booked: is_hall_fully_booked(&scoped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    const HALL: &str = "emerald";

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn record(slot: Slot, status: RecordStatus) -> ReservationRecord {
        ReservationRecord {
            id: Ulid::new(),
            hall: HALL.into(),
            date: day(),
            slot,
            status,
            requester: Requester::default(),
            event_name: String::new(),
        }
    }

    fn approved(slot: Slot) -> ReservationRecord {
        record(slot, RecordStatus::Approved)
    }

    fn pending(slot: Slot) -> ReservationRecord {
        record(slot, RecordStatus::Pending)
    }

    fn status(records: &[ReservationRecord], slot: Slot) -> SlotStatus {
        classify(records, HALL, day(), slot)
    }

    // ── classify ─────────────────────────────────────────

    #[test]
    fn empty_day_is_available() {
        let none: Vec<ReservationRecord> = vec![];
        for slot in Slot::ALL {
            assert_eq!(status(&none, slot), SlotStatus::Available);
            assert!(can_submit(&none, HALL, day(), slot));
        }
    }

    #[test]
    fn approved_forenoon_scenario() {
        let records = vec![approved(Slot::Forenoon)];
        assert_eq!(status(&records, Slot::Forenoon), SlotStatus::Booked);
        assert_eq!(status(&records, Slot::Afternoon), SlotStatus::Available);
        assert_eq!(status(&records, Slot::FullDay), SlotStatus::Unavailable);
    }

    #[test]
    fn pending_afternoon_scenario() {
        let records = vec![pending(Slot::Afternoon)];
        assert_eq!(status(&records, Slot::Afternoon), SlotStatus::Pending);
        assert!(!can_submit(&records, HALL, day(), Slot::Afternoon));
        assert!(can_submit(&records, HALL, day(), Slot::Forenoon));
        assert!(!can_submit(&records, HALL, day(), Slot::FullDay));
    }

    #[test]
    fn approved_full_day_blocks_halves() {
        let records = vec![approved(Slot::FullDay)];
        assert_eq!(status(&records, Slot::FullDay), SlotStatus::Booked);
        assert_eq!(status(&records, Slot::Forenoon), SlotStatus::Unavailable);
        assert_eq!(status(&records, Slot::Afternoon), SlotStatus::Unavailable);
    }

    #[test]
    fn halves_are_independent() {
        let fn_only = vec![approved(Slot::Forenoon)];
        let an_only = vec![approved(Slot::Afternoon)];
        assert_eq!(status(&fn_only, Slot::Afternoon), SlotStatus::Available);
        assert_eq!(status(&an_only, Slot::Forenoon), SlotStatus::Available);
    }

    #[test]
    fn booked_beats_pending() {
        let records = vec![pending(Slot::Forenoon), approved(Slot::Forenoon)];
        assert_eq!(status(&records, Slot::Forenoon), SlotStatus::Booked);
        let reversed = vec![approved(Slot::Forenoon), pending(Slot::Forenoon)];
        assert_eq!(status(&reversed, Slot::Forenoon), SlotStatus::Booked);
    }

    #[test]
    fn direct_beats_indirect() {
        let records = vec![approved(Slot::FullDay), pending(Slot::Forenoon)];
        assert_eq!(status(&records, Slot::Forenoon), SlotStatus::Pending);
        assert_eq!(status(&records, Slot::Afternoon), SlotStatus::Unavailable);
    }

    #[test]
    fn pending_halves_block_full_day() {
        let records = vec![pending(Slot::Forenoon), pending(Slot::Afternoon)];
        assert_eq!(status(&records, Slot::FullDay), SlotStatus::Unavailable);
    }

    #[test]
    fn other_hall_or_date_ignored() {
        let mut other_hall = approved(Slot::FullDay);
        other_hall.hall = "ruby".into();
        let mut other_day = approved(Slot::FullDay);
        other_day.date = day().succ_opt().unwrap();
        let records = vec![other_hall, other_day];
        for slot in Slot::ALL {
            assert_eq!(status(&records, slot), SlotStatus::Available);
        }
    }

    #[test]
    fn classify_is_idempotent() {
        let records = vec![pending(Slot::FullDay), approved(Slot::Afternoon)];
        for slot in Slot::ALL {
            let first = status(&records, slot);
            for _ in 0..3 {
                assert_eq!(status(&records, slot), first);
            }
        }
    }

    #[test]
    fn can_submit_matches_classify() {
        let snapshots = vec![
            vec![],
            vec![pending(Slot::Forenoon)],
            vec![approved(Slot::Afternoon)],
            vec![pending(Slot::FullDay)],
            vec![approved(Slot::Forenoon), pending(Slot::Afternoon)],
        ];
        for records in &snapshots {
            for slot in Slot::ALL {
                let available = status(records, slot) == SlotStatus::Available;
                assert_eq!(can_submit(records, HALL, day(), slot), available);
            }
        }
    }

    // ── malformed input ──────────────────────────────────

    fn doc(slot: Option<&str>, date: Option<&str>, status: Option<&str>) -> StoredDocument {
        StoredDocument {
            hall: Some(HALL.into()),
            date: date.map(String::from),
            slot: slot.map(String::from),
            status: status.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn malformed_documents_never_conflict() {
        let docs = vec![
            doc(None, Some("2025-03-10"), Some("approved")),
            doc(Some("FD (9:00 AM - 4:00 PM)"), Some("March 10"), Some("approved")),
            doc(Some("Full Day"), Some("2025-03-10"), Some("approved")),
            doc(Some("FD"), Some("2025-03-10"), Some("maybe")),
            doc(Some("FD"), None, Some("pending")),
            doc(Some("FD"), Some("2025-03-10"), None),
        ];
        for slot in Slot::ALL {
            assert_eq!(classify(&docs, HALL, day(), slot), SlotStatus::Available);
        }
        assert!(!is_hall_fully_booked(&docs));
    }

    #[test]
    fn well_formed_documents_classify() {
        let docs = vec![
            doc(Some("AN (1:00 PM - 4:00 PM)"), Some("2025-03-10"), Some("pending")),
            doc(None, Some("2025-03-10"), Some("approved")),
        ];
        assert_eq!(classify(&docs, HALL, day(), Slot::Afternoon), SlotStatus::Pending);
        assert_eq!(classify(&docs, HALL, day(), Slot::Forenoon), SlotStatus::Available);
    }

    // ── is_hall_fully_booked ─────────────────────────────

    #[test]
    fn fully_booked_by_full_day() {
        assert!(is_hall_fully_booked(&[approved(Slot::FullDay)]));
    }

    #[test]
    fn fully_booked_by_both_halves() {
        assert!(is_hall_fully_booked(&[approved(Slot::Forenoon), approved(Slot::Afternoon)]));
        assert!(!is_hall_fully_booked(&[approved(Slot::Forenoon)]));
    }

    #[test]
    fn pending_never_fully_books() {
        assert!(!is_hall_fully_booked(&[pending(Slot::FullDay)]));
        assert!(!is_hall_fully_booked(&[approved(Slot::Forenoon), pending(Slot::Afternoon)]));
        let empty: [ReservationRecord; 0] = [];
        assert!(!is_hall_fully_booked(&empty));
    }

    // ── day_overview ─────────────────────────────────────

    #[test]
    fn overview_reports_every_slot() {
        let records = vec![approved(Slot::Forenoon), pending(Slot::Afternoon)];
        let overview = day_overview(&records, HALL, day());
        assert_eq!(overview.status_of(Slot::FullDay), SlotStatus::Unavailable);
        assert_eq!(overview.status_of(Slot::Forenoon), SlotStatus::Booked);
        assert_eq!(overview.status_of(Slot::Afternoon), SlotStatus::Pending);
        assert!(!overview.fully_booked);
    }

    #[test]
    fn overview_ignores_foreign_records_for_fully_booked() {
        let mut elsewhere = approved(Slot::FullDay);
        elsewhere.hall = "ruby".into();
        let overview = day_overview(&[elsewhere], HALL, day());
        assert!(!overview.fully_booked);
        assert_eq!(overview.status_of(Slot::FullDay), SlotStatus::Available);
    }
}
