use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::*;
use crate::session::SessionContext;

use super::{Engine, EngineError};

/// What a booking client needs from the store: fetch-all-for a day, the
/// submission sink, the two administrator decisions and a push channel.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn fetch_day(&self, hall: &str, date: NaiveDate) -> Result<Vec<ReservationRecord>, EngineError>;

    async fn submit(&self, ctx: &SessionContext, req: NewRequest) -> Result<ReservationRecord, EngineError>;

    async fn approve(&self, ctx: &SessionContext, id: Ulid) -> Result<ReservationRecord, EngineError>;

    async fn reject(&self, ctx: &SessionContext, id: Ulid) -> Result<ReservationRecord, EngineError>;

    fn subscribe(&self, hall: &str) -> broadcast::Receiver<Event>;
}

#[async_trait]
impl ReservationStore for Engine {
    async fn fetch_day(&self, hall: &str, date: NaiveDate) -> Result<Vec<ReservationRecord>, EngineError> {
        Ok(self.day_records(hall, date).await)
    }

    async fn submit(&self, ctx: &SessionContext, req: NewRequest) -> Result<ReservationRecord, EngineError> {
        self.submit_request(ctx, req).await
    }

    async fn approve(&self, ctx: &SessionContext, id: Ulid) -> Result<ReservationRecord, EngineError> {
        self.approve_request(ctx, id).await
    }

    async fn reject(&self, ctx: &SessionContext, id: Ulid) -> Result<ReservationRecord, EngineError> {
        self.reject_request(ctx, id).await
    }

    fn subscribe(&self, hall: &str) -> broadcast::Receiver<Event> {
        self.notify.subscribe(hall)
    }
}

#[async_trait]
impl<S: ReservationStore + ?Sized> ReservationStore for Arc<S> {
    async fn fetch_day(&self, hall: &str, date: NaiveDate) -> Result<Vec<ReservationRecord>, EngineError> {
        (**self).fetch_day(hall, date).await
    }

    async fn submit(&self, ctx: &SessionContext, req: NewRequest) -> Result<ReservationRecord, EngineError> {
        (**self).submit(ctx, req).await
    }

    async fn approve(&self, ctx: &SessionContext, id: Ulid) -> Result<ReservationRecord, EngineError> {
        (**self).approve(ctx, id).await
    }

    async fn reject(&self, ctx: &SessionContext, id: Ulid) -> Result<ReservationRecord, EngineError> {
        (**self).reject(ctx, id).await
    }

    fn subscribe(&self, hall: &str) -> broadcast::Receiver<Event> {
        (**self).subscribe(hall)
    }
}
