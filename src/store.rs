use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ulid::Ulid;

use crate::index::ReservationIndex;
use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A required field was missing or empty.
    Validation(&'static str),
    /// The (instrument, date, slot) triple already has a row.
    Conflict {
        instrument: String,
        date: NaiveDate,
        slot: String,
    },
    NotFound(Ulid),
    /// The row belongs to someone else.
    Forbidden(Ulid),
    /// Network or server failure.
    Transport(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Validation(field) => write!(f, "missing required field: {field}"),
            StoreError::Conflict {
                instrument,
                date,
                slot,
            } => write!(f, "slot already reserved: {instrument} {date} {slot}"),
            StoreError::NotFound(id) => write!(f, "reservation not found: {id}"),
            StoreError::Forbidden(id) => {
                write!(f, "reservation {id} belongs to another user")
            }
            StoreError::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// The remote side of the reconciliation engine.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Full snapshot of every reservation.
    async fn list_reservations(&self) -> Result<ReservationIndex, StoreError>;

    /// Create-if-absent. Fails with `Conflict` if the slot is taken.
    async fn create_reservation(&self, req: NewReservation) -> Result<Reservation, StoreError>;

    /// Delete-if-owner.
    async fn delete_reservation(&self, id: Ulid, reserver_user_id: &str) -> Result<(), StoreError>;

    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Reservation>, StoreError>;

    /// Remove every row for `date`, returning how many were removed.
    async fn delete_by_date(&self, date: NaiveDate) -> Result<usize, StoreError>;
}

fn validate(req: &NewReservation) -> Result<(), StoreError> {
    let fields = [
        ("instrumentName", &req.instrument_name),
        ("slot", &req.slot),
        ("reserverName", &req.reserver_name),
        ("reserverUserId", &req.reserver_user_id),
    ];
    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(StoreError::Validation(name));
        }
    }
    Ok(())
}

/// In-process store with the same contract as the server: one row per slot,
/// owner-only deletes.
#[derive(Default)]
pub struct MemoryStore {
    rows: DashMap<Ulid, Reservation>,
    /// Unique constraint on (instrument, date, slot).
    slots: DashMap<SlotKey, Ulid>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: &Ulid) -> Option<Reservation> {
        self.rows.get(id).map(|r| r.value().clone())
    }

    fn insert(&self, req: NewReservation) -> Result<Reservation, StoreError> {
        validate(&req)?;
        let key = SlotKey::new(req.instrument_name.clone(), req.date, req.slot.clone());
        match self.slots.entry(key) {
            Entry::Occupied(e) => {
                let key = e.key();
                Err(StoreError::Conflict {
                    instrument: key.instrument.clone(),
                    date: key.date,
                    slot: key.slot.clone(),
                })
            }
            Entry::Vacant(e) => {
                let now = Utc::now();
                let row = Reservation {
                    id: Ulid::new(),
                    instrument_name: req.instrument_name,
                    slot: req.slot,
                    date: req.date,
                    reserver_name: req.reserver_name,
                    reserver_user_id: req.reserver_user_id,
                    created_at: now,
                    updated_at: now,
                };
                self.rows.insert(row.id, row.clone());
                e.insert(row.id);
                Ok(row)
            }
        }
    }

    fn remove(&self, id: &Ulid) -> Option<Reservation> {
        let (_, row) = self.rows.remove(id)?;
        self.slots.remove_if(&row.key(), |_, owner| owner == id);
        Some(row)
    }

    /// Rows newest first.
    fn sorted_rows(&self, filter: impl Fn(&Reservation) -> bool) -> Vec<Reservation> {
        let mut rows: Vec<Reservation> = self
            .rows
            .iter()
            .filter(|r| filter(r.value()))
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn list_reservations(&self) -> Result<ReservationIndex, StoreError> {
        let rows = self.sorted_rows(|_| true);
        Ok(ReservationIndex::from_records(&rows))
    }

    async fn create_reservation(&self, req: NewReservation) -> Result<Reservation, StoreError> {
        self.insert(req)
    }

    async fn delete_reservation(&self, id: Ulid, reserver_user_id: &str) -> Result<(), StoreError> {
        if reserver_user_id.trim().is_empty() {
            return Err(StoreError::Validation("reserverUserId"));
        }
        let owner = self
            .rows
            .get(&id)
            .map(|r| r.reserver_user_id.clone())
            .ok_or(StoreError::NotFound(id))?;
        if owner != reserver_user_id {
            return Err(StoreError::Forbidden(id));
        }
        self.remove(&id).map(|_| ()).ok_or(StoreError::NotFound(id))
    }

    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.sorted_rows(|r| r.date == date))
    }

    async fn delete_by_date(&self, date: NaiveDate) -> Result<usize, StoreError> {
        let ids: Vec<Ulid> = self
            .rows
            .iter()
            .filter(|r| r.date == date)
            .map(|r| *r.key())
            .collect();
        Ok(ids.iter().filter(|id| self.remove(id).is_some()).count())
    }
}
