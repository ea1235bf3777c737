use std::collections::HashMap;

use chrono::NaiveDate;
use tokio::sync::broadcast::{self, error::RecvError};
use ulid::Ulid;

use crate::engine::{can_submit, classify, EngineError, ReservationStore};
use crate::model::*;
use crate::session::SessionContext;

/// Push channel for one hall, as handed out by [`BookingClient::subscribe`].
pub struct HallSubscription {
    hall: String,
    rx: broadcast::Receiver<Event>,
}

impl HallSubscription {
    pub fn hall(&self) -> &str {
        &self.hall
    }
}

/// One user's view of the store.
///
/// Statuses shown to the user come from a local snapshot per (hall, date).
/// The snapshot is advisory: `request` refetches the day and re-checks before
/// writing, and approval re-checks again inside the store.
pub struct BookingClient<S> {
    ctx: SessionContext,
    store: S,
    cache: HashMap<DayKey, Vec<ReservationRecord>>,
}

impl<S: ReservationStore> BookingClient<S> {
    pub fn new(ctx: SessionContext, store: S) -> Self {
        Self {
            ctx,
            store,
            cache: HashMap::new(),
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.ctx
    }

    /// Replace the cached snapshot of a day with the store's current one.
    pub async fn refresh(&mut self, hall: &str, date: NaiveDate) -> Result<&[ReservationRecord], EngineError> {
        let records = self.store.fetch_day(hall, date).await?;
        let cached = self.cache.entry(DayKey::new(hall, date)).or_default();
        *cached = records;
        Ok(cached.as_slice())
    }

    /// Status from the cached snapshot. A day never fetched reads as empty.
    pub fn status(&self, hall: &str, date: NaiveDate, slot: Slot) -> SlotStatus {
        let records = self
            .cache
            .get(&DayKey::new(hall, date))
            .map(Vec::as_slice)
            .unwrap_or_default();
        classify(records, hall, date, slot)
    }

    pub fn cached(&self, hall: &str, date: NaiveDate) -> Option<&[ReservationRecord]> {
        self.cache.get(&DayKey::new(hall, date)).map(Vec::as_slice)
    }

    /// Submit a request after re-checking the slot against a fresh snapshot.
    pub async fn request(&mut self, req: NewRequest) -> Result<ReservationRecord, EngineError> {
        let records = self.refresh(&req.hall, req.date).await?;
        if !can_submit(records, &req.hall, req.date, req.slot) {
            return Err(EngineError::StaleConflict {
                status: classify(records, &req.hall, req.date, req.slot),
                hall: req.hall,
                date: req.date,
                slot: req.slot,
            });
        }
        let record = self.store.submit(&self.ctx, req).await?;
        self.upsert(record.clone());
        Ok(record)
    }

    pub async fn approve(&mut self, id: Ulid) -> Result<ReservationRecord, EngineError> {
        let record = self.store.approve(&self.ctx, id).await?;
        self.upsert(record.clone());
        Ok(record)
    }

    pub async fn reject(&mut self, id: Ulid) -> Result<ReservationRecord, EngineError> {
        let record = self.store.reject(&self.ctx, id).await?;
        if let Some(records) = self.cache.get_mut(&record.key()) {
            records.retain(|r| r.id != id);
        }
        Ok(record)
    }

    pub fn subscribe(&self, hall: &str) -> HallSubscription {
        HallSubscription {
            hall: hall.to_string(),
            rx: self.store.subscribe(hall),
        }
    }

    /// Fold a pushed event into the cache. Days that were never fetched are
    /// left alone.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::RequestSubmitted { record } | Event::RecordRestored { record } => {
                if self.cache.contains_key(&record.key()) {
                    self.upsert(record.clone());
                }
            }
            Event::RequestApproved { id, hall, date } => {
                if let Some(r) = self
                    .cache
                    .get_mut(&DayKey::new(hall, *date))
                    .and_then(|records| records.iter_mut().find(|r| r.id == *id))
                {
                    r.status = RecordStatus::Approved;
                }
            }
            Event::RequestRejected { id, hall, date } => {
                if let Some(records) = self.cache.get_mut(&DayKey::new(hall, *date)) {
                    records.retain(|r| r.id != *id);
                }
            }
        }
    }

    /// Wait for the next push on `sub` and fold it in. A lagged receiver has
    /// missed events, so every cached day of that hall is refetched instead.
    /// Returns `Ok(false)` once the channel is closed.
    pub async fn follow(&mut self, sub: &mut HallSubscription) -> Result<bool, EngineError> {
        match sub.rx.recv().await {
            Ok(event) => {
                self.apply(&event);
                Ok(true)
            }
            Err(RecvError::Lagged(missed)) => {
                let hall = sub.hall();
                tracing::debug!(hall, missed, "subscription lagged, refetching");
                let stale: Vec<NaiveDate> = self
                    .cache
                    .keys()
                    .filter(|k| k.hall == hall)
                    .map(|k| k.date)
                    .collect();
                for date in stale {
                    self.refresh(hall, date).await?;
                }
                Ok(true)
            }
            Err(RecvError::Closed) => Ok(false),
        }
    }

    fn upsert(&mut self, record: ReservationRecord) {
        let records = self.cache.entry(record.key()).or_default();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }
}
