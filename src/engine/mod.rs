mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use availability::{can_submit, classify, day_overview, is_hall_fully_booked, AsClaim, Claim};
pub use error::EngineError;
pub use mutations::ImportReport;
pub use store::ReservationStore;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability::{WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};
use crate::wal::Wal;

pub type SharedDayState = Arc<RwLock<DayState>>;

type Pending = (Event, oneshot::Sender<io::Result<()>>);

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL. Appends that queue up while a flush is pending share one
/// fsync; any other command first flushes the batch ahead of it.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_control(&mut wal, cmd);
            continue;
        };
        let mut batch: Vec<Pending> = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }
        commit_batch(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_control(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<Pending>) {
    metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();

    let mut result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so stale bytes never reach the next batch.
    let flushed = wal.flush_sync();
    if result.is_ok() {
        result = flushed;
    }
    metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

    for (_, tx) in batch {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => commit_batch(wal, vec![(event, response)]),
    }
}

/// Apply an event to the day it belongs to. Caller holds the day's lock.
fn apply_to_day(day: &mut DayState, event: &Event, index: &DashMap<Ulid, DayKey>) {
    match event {
        Event::RequestSubmitted { record } | Event::RecordRestored { record } => {
            index.insert(record.id, record.key());
            day.upsert(record.clone());
        }
        Event::RequestApproved { id, .. } => {
            day.approve(*id);
        }
        Event::RequestRejected { id, .. } => {
            day.remove(*id);
            index.remove(id);
        }
    }
}

/// The reservation store for one tenant: every day's records in memory,
/// every change in the WAL before it becomes visible.
pub struct Engine {
    pub state: DashMap<DayKey, SharedDayState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: record id → the day holding it
    pub(super) record_to_day: DashMap<Ulid, DayKey>,
    /// Mutations hold it shared; compaction holds it exclusively so no
    /// append lands in the log being replaced.
    pub(super) compaction: RwLock<()>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let record_to_day = DashMap::new();
        let mut days: HashMap<DayKey, DayState> = HashMap::new();
        for event in &events {
            let key = event.day_key();
            let day = days.entry(key.clone()).or_insert_with(|| DayState::new(key));
            apply_to_day(day, event, &record_to_day);
        }

        let state = DashMap::new();
        for (key, day) in days {
            if !day.is_empty() {
                state.insert(key, Arc::new(RwLock::new(day)));
            }
        }

        tracing::debug!(
            path = %wal_path.display(),
            events = events.len(),
            days = state.len(),
            "engine replayed"
        );

        Ok(Self {
            state,
            wal_tx,
            notify,
            record_to_day,
            compaction: RwLock::new(()),
        })
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::StoreUnavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StoreUnavailable("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))
    }

    pub fn get_day(&self, key: &DayKey) -> Option<SharedDayState> {
        self.state.get(key).map(|e| e.value().clone())
    }

    /// The day's state, created empty on first use.
    pub(super) fn day_or_create(&self, key: &DayKey) -> SharedDayState {
        self.state
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(DayState::new(key.clone()))))
            .value()
            .clone()
    }

    pub fn day_of_record(&self, id: &Ulid) -> Option<DayKey> {
        self.record_to_day.get(id).map(|e| e.value().clone())
    }

    /// WAL-append, then apply, then notify. Nothing is visible if the append fails.
    pub(super) async fn persist_and_apply(&self, day: &mut DayState, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_day(day, event, &self.record_to_day);
        self.notify.send(event);
        Ok(())
    }

    /// Lookup record → day, then take the day's write lock.
    pub(super) async fn resolve_record_write(
        &self,
        id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<DayState>, EngineError> {
        let key = self.day_of_record(id).ok_or(EngineError::NotFound(*id))?;
        let day = self.get_day(&key).ok_or(EngineError::NotFound(*id))?;
        let guard = day.write_owned().await;
        // The record may have been rejected while we waited for the lock.
        if guard.get(*id).is_none() {
            return Err(EngineError::NotFound(*id));
        }
        Ok(guard)
    }
}
