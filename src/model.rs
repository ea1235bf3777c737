use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minutes since local midnight. The only wall-clock type.
pub type Minute = u16;

/// Storage format for dates, both on the wire and in exported documents.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Half-open wall-clock interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Minute,
    pub end: Minute,
}

impl Span {
    pub const fn new(start: Minute, end: Minute) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// One of the three fixed daily windows a hall can be booked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Slot {
    FullDay,
    Forenoon,
    Afternoon,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::FullDay, Slot::Forenoon, Slot::Afternoon];

    pub fn code(&self) -> &'static str {
        match self {
            Slot::FullDay => "FD",
            Slot::Forenoon => "FN",
            Slot::Afternoon => "AN",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Slot::FullDay => "Full Day",
            Slot::Forenoon => "Forenoon",
            Slot::Afternoon => "Afternoon",
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Slot::FullDay => Span::new(9 * 60, 16 * 60),
            Slot::Forenoon => Span::new(9 * 60, 13 * 60),
            Slot::Afternoon => Span::new(13 * 60, 16 * 60),
        }
    }

    /// FD overlaps everything; FN and AN only touch at 13:00.
    pub fn overlaps(&self, other: Slot) -> bool {
        self.span().overlaps(&other.span())
    }

    /// The form documents carry, e.g. `FN (9:00 AM - 1:00 PM)`.
    pub fn stored_form(&self) -> String {
        let span = self.span();
        format!("{} ({} - {})", self.code(), clock_12h(span.start), clock_12h(span.end))
    }

    /// Parse a stored slot string by its leading code. Accepts the bare code.
    pub fn parse_stored(s: &str) -> Option<Slot> {
        let code = s.trim().split(' ').next()?;
        match code {
            "FD" => Some(Slot::FullDay),
            "FN" => Some(Slot::Forenoon),
            "AN" => Some(Slot::Afternoon),
            _ => None,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Slot {
    type Err = MalformedRecord;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Slot::parse_stored(s).ok_or_else(|| MalformedRecord::BadSlot(s.to_string()))
    }
}

fn clock_12h(minute: Minute) -> String {
    let (h, m) = (minute / 60, minute % 60);
    let suffix = if h < 12 { "AM" } else { "PM" };
    let h12 = match h % 12 {
        0 => 12,
        other => other,
    };
    format!("{h12}:{m:02} {suffix}")
}

/// Lifecycle of a stored record. Rejected requests are deleted, not kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordStatus {
    Pending,
    Approved,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Approved => "approved",
        }
    }

    pub fn parse(s: &str) -> Option<RecordStatus> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(RecordStatus::Pending),
            "approved" => Some(RecordStatus::Approved),
            _ => None,
        }
    }
}

/// The resolver's verdict on a (hall, date, slot) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotStatus {
    /// Nothing overlaps; a request may be submitted.
    Available,
    /// A request for this exact slot awaits an administrator.
    Pending,
    /// An approved reservation holds this exact slot.
    Booked,
    /// Blocked indirectly by an overlapping slot of a different kind.
    Unavailable,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Available => "available",
            SlotStatus::Pending => "pending",
            SlotStatus::Booked => "booked",
            SlotStatus::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub name: String,
    pub email: String,
    pub department: String,
    pub designation: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub id: Ulid,
    pub hall: String,
    pub date: NaiveDate,
    pub slot: Slot,
    pub status: RecordStatus,
    pub requester: Requester,
    pub event_name: String,
}

impl ReservationRecord {
    pub fn key(&self) -> DayKey {
        DayKey::new(&self.hall, self.date)
    }

    pub fn is_pending(&self) -> bool {
        self.status == RecordStatus::Pending
    }

    pub fn is_approved(&self) -> bool {
        self.status == RecordStatus::Approved
    }
}

/// A faculty submission before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequest {
    pub hall: String,
    pub date: NaiveDate,
    pub slot: Slot,
    pub event_name: String,
    pub requester: Requester,
}

/// Conflict scope: every record lives under exactly one (hall, date).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DayKey {
    pub hall: String,
    pub date: NaiveDate,
}

impl DayKey {
    pub fn new(hall: &str, date: NaiveDate) -> Self {
        Self {
            hall: hall.to_string(),
            date,
        }
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.hall, format_date(self.date))
    }
}

/// Every record (pending and approved) for one hall on one date.
#[derive(Debug, Clone)]
pub struct DayState {
    pub key: DayKey,
    /// In submission order.
    pub records: Vec<ReservationRecord>,
}

impl DayState {
    pub fn new(key: DayKey) -> Self {
        Self {
            key,
            records: Vec::new(),
        }
    }

    /// Insert, replacing any record with the same id.
    pub fn upsert(&mut self, record: ReservationRecord) {
        match self.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    pub fn remove(&mut self, id: Ulid) -> Option<ReservationRecord> {
        let pos = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&ReservationRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn approve(&mut self, id: Ulid) -> Option<&ReservationRecord> {
        let record = self.records.iter_mut().find(|r| r.id == id)?;
        record.status = RecordStatus::Approved;
        Some(record)
    }

    pub fn pending(&self) -> impl Iterator<Item = &ReservationRecord> {
        self.records.iter().filter(|r| r.is_pending())
    }

    pub fn approved(&self) -> impl Iterator<Item = &ReservationRecord> {
        self.records.iter().filter(|r| r.is_approved())
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ── Raw documents ────────────────────────────────────────────────

/// A record as a document store holds it: every field optional, all strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub hall: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub slot: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl StoredDocument {
    /// Hall, date and slot: the fields every document must carry.
    pub(crate) fn placement(&self) -> Result<(&str, NaiveDate, Slot), MalformedRecord> {
        let hall = self.hall.as_deref().map(str::trim).filter(|h| !h.is_empty());
        let hall = hall.ok_or(MalformedRecord::MissingField("hall"))?;
        let date = self.date.as_deref().ok_or(MalformedRecord::MissingField("date"))?;
        let date = parse_date(date).ok_or_else(|| MalformedRecord::BadDate(date.to_string()))?;
        let slot = self
            .slot
            .as_deref()
            .ok_or(MalformedRecord::MissingField("slot"))?
            .parse()?;
        Ok((hall, date, slot))
    }

    /// The status written on the document, if any.
    pub(crate) fn stored_status(&self) -> Result<Option<RecordStatus>, MalformedRecord> {
        self.status
            .as_deref()
            .map(|s| RecordStatus::parse(s).ok_or_else(|| MalformedRecord::BadStatus(s.to_string())))
            .transpose()
    }

    /// Convert to a typed record. `default_status` applies when the document
    /// carries none (collections imply status).
    pub fn to_record(&self, default_status: RecordStatus) -> Result<ReservationRecord, MalformedRecord> {
        let (hall, date, slot) = self.placement()?;
        let status = self.stored_status()?.unwrap_or(default_status);
        let id = match self.id.as_deref() {
            Some(s) => Ulid::from_string(s).unwrap_or_else(|_| Ulid::new()),
            None => Ulid::new(),
        };
        let text = |f: &Option<String>| f.clone().unwrap_or_default();
        Ok(ReservationRecord {
            id,
            hall: hall.to_string(),
            date,
            slot,
            status,
            requester: Requester {
                name: text(&self.name),
                email: text(&self.email),
                department: text(&self.department),
                designation: text(&self.designation),
                phone: text(&self.phone),
            },
            event_name: text(&self.event_name),
        })
    }
}

/// Why a stored document could not take part in classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedRecord {
    MissingField(&'static str),
    BadDate(String),
    BadSlot(String),
    BadStatus(String),
}

impl fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedRecord::MissingField(field) => write!(f, "missing field: {field}"),
            MalformedRecord::BadDate(d) => write!(f, "unparseable date: {d:?}"),
            MalformedRecord::BadSlot(s) => write!(f, "unknown slot: {s:?}"),
            MalformedRecord::BadStatus(s) => write!(f, "unknown status: {s:?}"),
        }
    }
}

impl std::error::Error for MalformedRecord {}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RequestSubmitted {
        record: ReservationRecord,
    },
    RequestApproved {
        id: Ulid,
        hall: String,
        date: NaiveDate,
    },
    RequestRejected {
        id: Ulid,
        hall: String,
        date: NaiveDate,
    },
    /// Reinstates a record verbatim (legacy import, compaction).
    RecordRestored {
        record: ReservationRecord,
    },
}

impl Event {
    pub fn day_key(&self) -> DayKey {
        match self {
            Event::RequestSubmitted { record } | Event::RecordRestored { record } => record.key(),
            Event::RequestApproved { hall, date, .. } | Event::RequestRejected { hall, date, .. } => {
                DayKey::new(hall, *date)
            }
        }
    }

    pub fn hall(&self) -> &str {
        match self {
            Event::RequestSubmitted { record } | Event::RecordRestored { record } => &record.hall,
            Event::RequestApproved { hall, .. } | Event::RequestRejected { hall, .. } => hall,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayAvailability {
    pub hall: String,
    pub date: NaiveDate,
    pub slots: [(Slot, SlotStatus); 3],
    pub fully_booked: bool,
}

impl DayAvailability {
    pub fn status_of(&self, slot: Slot) -> SlotStatus {
        self.slots
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, status)| *status)
            .unwrap_or(SlotStatus::Available)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HallAvailability {
    pub hall_id: &'static str,
    pub name: &'static str,
    pub location: &'static str,
    pub capacity: u32,
    pub fully_booked: bool,
}
