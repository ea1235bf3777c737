use chrono::NaiveDate;

use crate::halls;
use crate::model::*;

use super::availability::{classify, day_overview, is_hall_fully_booked};
use super::{Engine, EngineError, SharedDayState};

impl Engine {
    /// Every record, pending and approved, for one hall on one date.
    pub async fn day_records(&self, hall: &str, date: NaiveDate) -> Vec<ReservationRecord> {
        match self.get_day(&DayKey::new(hall, date)) {
            Some(day) => day.read().await.records.clone(),
            None => Vec::new(),
        }
    }

    pub async fn classify_slot(&self, hall: &str, date: NaiveDate, slot: Slot) -> Result<SlotStatus, EngineError> {
        known_hall(hall)?;
        let records = self.day_records(hall, date).await;
        Ok(classify(&records, hall, date, slot))
    }

    pub async fn day_availability(&self, hall: &str, date: NaiveDate) -> Result<DayAvailability, EngineError> {
        known_hall(hall)?;
        let records = self.day_records(hall, date).await;
        Ok(day_overview(&records, hall, date))
    }

    /// The whole registry for a date, each hall flagged when its forenoon and
    /// afternoon are both taken by approved bookings.
    pub async fn halls_on(&self, date: NaiveDate) -> Vec<HallAvailability> {
        let mut out = Vec::with_capacity(halls::all().len());
        for hall in halls::all() {
            let records = self.day_records(hall.id, date).await;
            out.push(HallAvailability {
                hall_id: hall.id,
                name: hall.name,
                location: hall.location,
                capacity: hall.capacity,
                fully_booked: is_hall_fully_booked(&records),
            });
        }
        out
    }

    /// Requests awaiting an administrator, oldest first.
    pub async fn pending_requests(&self) -> Vec<ReservationRecord> {
        let mut out = self.collect(|r| r.is_pending()).await;
        out.sort_by_key(|r| r.id);
        out
    }

    /// Everything one requester has on file, pending and approved.
    pub async fn records_for_requester(&self, email: &str) -> Vec<ReservationRecord> {
        let email = email.trim();
        let mut out = self
            .collect(|r| r.requester.email.eq_ignore_ascii_case(email))
            .await;
        out.sort_by(|a, b| (a.date, a.slot, a.id).cmp(&(b.date, b.slot, b.id)));
        out
    }

    /// Approved bookings on or after `from`, by date then slot.
    pub async fn upcoming_bookings(&self, from: NaiveDate, hall: Option<&str>) -> Vec<ReservationRecord> {
        let mut out = self
            .collect(|r| r.is_approved() && r.date >= from && hall.is_none_or(|h| r.hall == h))
            .await;
        out.sort_by(|a, b| (a.date, a.slot, &a.hall).cmp(&(b.date, b.slot, &b.hall)));
        out
    }

    async fn collect(&self, keep: impl Fn(&ReservationRecord) -> bool) -> Vec<ReservationRecord> {
        let days: Vec<SharedDayState> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for day in days {
            let guard = day.read().await;
            out.extend(guard.records.iter().filter(|r| keep(r)).cloned());
        }
        out
    }
}

fn known_hall(hall: &str) -> Result<(), EngineError> {
    match halls::lookup(hall) {
        Some(_) => Ok(()),
        None => Err(EngineError::UnknownHall(hall.to_string())),
    }
}
