//! Store double shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Semaphore;
use ulid::Ulid;

use crate::index::ReservationIndex;
use crate::model::*;
use crate::store::{MemoryStore, ReservationStore, StoreError};

/// Fail every list call from now on.
pub const ALWAYS: usize = usize::MAX;

/// `MemoryStore` whose writes can be held at a gate and whose calls can be made to fail.
pub struct ScriptedStore {
    pub inner: MemoryStore,
    gate: Semaphore,
    write_failures: Mutex<VecDeque<StoreError>>,
    list_failures: AtomicUsize,
    lists: AtomicUsize,
}

impl ScriptedStore {
    fn with_permits(permits: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            gate: Semaphore::new(permits),
            write_failures: Mutex::new(VecDeque::new()),
            list_failures: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
        })
    }

    /// Writes go straight through.
    pub fn open() -> Arc<Self> {
        Self::with_permits(Semaphore::MAX_PERMITS)
    }

    /// Every write blocks until `release` lets it through.
    pub fn gated() -> Arc<Self> {
        Self::with_permits(0)
    }

    pub fn release(&self, writes: usize) {
        self.gate.add_permits(writes);
    }

    pub fn fail_next_write(&self, err: StoreError) {
        self.write_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_lists(&self, times: usize) {
        self.list_failures.store(times, Ordering::SeqCst);
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    async fn pass_gate(&self) -> Result<(), StoreError> {
        self.gate.acquire().await.unwrap().forget();
        match self.write_failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ReservationStore for ScriptedStore {
    async fn list_reservations(&self) -> Result<ReservationIndex, StoreError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .list_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                ALWAYS => Some(ALWAYS),
                n => Some(n - 1),
            })
            .is_ok();
        if failing {
            return Err(StoreError::Transport("list unavailable".into()));
        }
        self.inner.list_reservations().await
    }

    async fn create_reservation(&self, req: NewReservation) -> Result<Reservation, StoreError> {
        self.pass_gate().await?;
        self.inner.create_reservation(req).await
    }

    async fn delete_reservation(&self, id: Ulid, reserver_user_id: &str) -> Result<(), StoreError> {
        self.pass_gate().await?;
        self.inner.delete_reservation(id, reserver_user_id).await
    }

    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Reservation>, StoreError> {
        self.inner.list_by_date(date).await
    }

    async fn delete_by_date(&self, date: NaiveDate) -> Result<usize, StoreError> {
        self.inner.delete_by_date(date).await
    }
}

pub fn instrument(name: &str) -> Instrument {
    Instrument {
        name: name.into(),
        os: None,
        group: None,
        ip: None,
    }
}

pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
}

pub fn alice() -> Reserver {
    Reserver::new("u-alice", "alice")
}

pub fn bob() -> Reserver {
    Reserver::new("u-bob", "bob")
}

pub fn booking(instrument: &str, date: NaiveDate, slot: &str, who: &Reserver) -> NewReservation {
    NewReservation {
        instrument_name: instrument.into(),
        slot: slot.into(),
        date,
        reserver_name: who.display_name.clone(),
        reserver_user_id: who.user_id.clone(),
    }
}
