use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{APPROVALS_TOTAL, MALFORMED_RECORDS_TOTAL, REJECTIONS_TOTAL, REQUESTS_SUBMITTED_TOTAL};
use crate::session::SessionContext;

use super::conflict::{check_approvable, validate_request};
use super::{Engine, EngineError, WalCommand};

/// Outcome of a legacy import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub restored: usize,
    pub skipped: usize,
}

impl Engine {
    /// Append a pending request. Provisional: overlap is judged by the
    /// submitting client and again at approval, never here.
    pub async fn submit_request(
        &self,
        ctx: &SessionContext,
        req: NewRequest,
    ) -> Result<ReservationRecord, EngineError> {
        validate_request(&req, chrono::Local::now().date_naive())?;
        let _gate = self.compaction.read().await;

        let key = DayKey::new(&req.hall, req.date);
        let day = self.day_or_create(&key);
        let mut guard = day.write().await;
        if guard.records.len() >= MAX_RECORDS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many requests for this hall and date"));
        }

        let mut requester = req.requester;
        if requester.email.is_empty() {
            requester.email = ctx.email.clone();
        }
        let record = ReservationRecord {
            id: Ulid::new(),
            hall: req.hall,
            date: req.date,
            slot: req.slot,
            status: RecordStatus::Pending,
            requester,
            event_name: req.event_name,
        };
        let event = Event::RequestSubmitted { record: record.clone() };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(REQUESTS_SUBMITTED_TOTAL).increment(1);
        tracing::info!(id = %record.id, day = %key, slot = %record.slot, by = %ctx.email, "request submitted");
        Ok(record)
    }

    /// Move a pending request into the approved set, after re-classifying
    /// its slot against what is approved right now.
    pub async fn approve_request(&self, ctx: &SessionContext, id: Ulid) -> Result<ReservationRecord, EngineError> {
        ctx.require_admin("approve")?;
        let _gate = self.compaction.read().await;
        let mut guard = self.resolve_record_write(&id).await?;

        let record = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        if !record.is_pending() {
            return Err(EngineError::NotPending(id));
        }
        if let Err(e) = check_approvable(&guard, &record) {
            tracing::warn!(%id, day = %guard.key, slot = %record.slot, by = %ctx.email, "approval refused: {e}");
            return Err(e);
        }

        let event = Event::RequestApproved {
            id,
            hall: record.hall.clone(),
            date: record.date,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(APPROVALS_TOTAL).increment(1);
        tracing::info!(%id, day = %guard.key, slot = %record.slot, by = %ctx.email, "request approved");
        Ok(ReservationRecord {
            status: RecordStatus::Approved,
            ..record
        })
    }

    /// Delete a pending request. Nothing is kept for rejected requests.
    pub async fn reject_request(&self, ctx: &SessionContext, id: Ulid) -> Result<ReservationRecord, EngineError> {
        ctx.require_admin("reject")?;
        let _gate = self.compaction.read().await;
        let mut guard = self.resolve_record_write(&id).await?;

        let record = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        if !record.is_pending() {
            return Err(EngineError::NotPending(id));
        }
        let event = Event::RequestRejected {
            id,
            hall: record.hall.clone(),
            date: record.date,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(REJECTIONS_TOTAL).increment(1);
        tracing::info!(%id, day = %guard.key, slot = %record.slot, by = %ctx.email, "request rejected");
        Ok(record)
    }

    /// Restore records from legacy documents, each paired with the status its
    /// collection implies. Overlaps are restored as found.
    pub async fn import_documents(
        &self,
        docs: Vec<(StoredDocument, RecordStatus)>,
    ) -> Result<ImportReport, EngineError> {
        if docs.len() > MAX_IMPORT_DOCUMENTS {
            return Err(EngineError::LimitExceeded("too many documents in import"));
        }
        let _gate = self.compaction.read().await;
        let mut report = ImportReport::default();

        for (doc, status) in docs {
            let doc_id = doc.id.clone();
            match self.restore_document(doc, status).await {
                Ok(()) => report.restored += 1,
                Err(EngineError::Malformed(e)) => {
                    metrics::counter!(MALFORMED_RECORDS_TOTAL).increment(1);
                    tracing::warn!(id = ?doc_id, "skipping malformed document: {e}");
                    report.skipped += 1;
                }
                Err(EngineError::LimitExceeded(why)) => {
                    tracing::warn!(id = ?doc_id, "skipping document: {why}");
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(restored = report.restored, skipped = report.skipped, "import finished");
        Ok(report)
    }

    /// Restore one legacy document. Caller holds the compaction gate.
    async fn restore_document(&self, doc: StoredDocument, status: RecordStatus) -> Result<(), EngineError> {
        let mut record = doc.to_record(status)?;
        // Ids are unique per tenant; a reused id on another day gets a fresh one.
        if self.day_of_record(&record.id).is_some_and(|k| k != record.key()) {
            record.id = Ulid::new();
        }
        let day = self.day_or_create(&record.key());
        let mut guard = day.write().await;
        if guard.get(record.id).is_none() && guard.records.len() >= MAX_RECORDS_PER_DAY {
            return Err(EngineError::LimitExceeded("day is full"));
        }
        self.persist_and_apply(&mut guard, &Event::RecordRestored { record }).await
    }

    /// Rewrite the WAL as one `RecordRestored` per live record.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.compaction.write().await;

        let days: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut events = Vec::new();
        for day in days {
            let guard = day.read().await;
            events.extend(
                guard
                    .records
                    .iter()
                    .map(|record| Event::RecordRestored { record: record.clone() }),
            );
        }
        let live = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::StoreUnavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StoreUnavailable("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?;

        tracing::debug!(records = live, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
