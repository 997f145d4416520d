use std::collections::{HashMap, HashSet};

use ulid::Ulid;

use crate::catalog;
use crate::index::ReservationIndex;
use crate::model::*;
use crate::store::StoreError;
use crate::tracker::MutationTracker;

use super::ReconcileError;

/// The remote call a toggle resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp {
    Create(NewReservation),
    Delete { id: Ulid, reserver_user_id: String },
}

impl RemoteOp {
    pub fn label(&self) -> &'static str {
        match self {
            RemoteOp::Create(_) => "create",
            RemoteOp::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toggle {
    /// Key already has a mutation in flight. Nothing changed.
    AlreadyPending,
    Started(RemoteOp),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteResult {
    Created(Reservation),
    Deleted,
    Failed(StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOrigin {
    Tick,
    Mutation,
    Manual,
}

impl RefreshOrigin {
    pub fn label(&self) -> &'static str {
        match self {
            RefreshOrigin::Tick => "tick",
            RefreshOrigin::Mutation => "mutation",
            RefreshOrigin::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Replaced,
    /// Tick result dropped because a mutation is pending.
    Suppressed,
    /// A newer snapshot was already applied, or one is on its way.
    Stale,
}

#[derive(Debug, Clone)]
pub(super) struct InFlight {
    /// Entry before the toggle, restored on failure.
    pub prior: Option<ReservationInfo>,
    /// What the index shows while pending. `None` for a delete.
    pub overlay: Option<ReservationInfo>,
}

/// Everything the reconciliation engine owns. All transitions are plain `&mut self`
/// methods with no I/O; the dispatcher performs the remote calls.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub(super) index: ReservationIndex,
    pub(super) tracker: MutationTracker,
    pub(super) in_flight: HashMap<SlotKey, InFlight>,
    instruments: HashSet<String>,
    issued_seq: u64,
    applied_seq: u64,
    /// Snapshots requested before this sequence number predate a settled mutation.
    floor_seq: u64,
}

impl SessionState {
    pub fn new<I, S>(instruments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            instruments: instruments.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn index(&self) -> &ReservationIndex {
        &self.index
    }

    pub fn tracker(&self) -> &MutationTracker {
        &self.tracker
    }

    pub fn knows(&self, key: &SlotKey) -> bool {
        self.instruments.contains(&key.instrument) && catalog::is_valid_slot(key.date, &key.slot)
    }

    /// Decide create vs delete from the current index and enter the pending state.
    ///
    /// On `Err` or `AlreadyPending` neither the index nor the tracker is touched.
    pub fn start_toggle(&mut self, key: &SlotKey, actor: &Reserver) -> Result<Toggle, ReconcileError> {
        if self.tracker.is_pending(key) {
            return Ok(Toggle::AlreadyPending);
        }
        if !self.knows(key) {
            return Err(ReconcileError::UnknownSlot(key.clone()));
        }

        let prior = self.index.get(key).cloned();
        let (op, overlay) = match &prior {
            None => (
                RemoteOp::Create(NewReservation::for_key(key, actor)),
                Some(ReservationInfo::pending(actor)),
            ),
            Some(info) => {
                let id = info
                    .record_id
                    .confirmed()
                    .ok_or_else(|| ReconcileError::MissingRecordId(key.clone()))?;
                let op = RemoteOp::Delete {
                    id,
                    reserver_user_id: actor.user_id.clone(),
                };
                (op, None)
            }
        };

        self.tracker.begin(key);
        match &overlay {
            Some(info) => {
                self.index.patch_create(key, info.clone());
            }
            None => {
                self.index.patch_delete(key);
            }
        }
        self.in_flight.insert(key.clone(), InFlight { prior, overlay });
        Ok(Toggle::Started(op))
    }

    /// Leave the pending state. Returns false if the key was not pending.
    ///
    /// A successful create is patched with the confirmed row so the slot stays
    /// deletable even if the follow-up refresh fails. A failure restores the
    /// pre-toggle entry.
    pub fn settle(&mut self, key: &SlotKey, result: &RemoteResult) -> bool {
        let ended = self.tracker.end(key);
        let Some(flight) = self.in_flight.remove(key) else {
            return ended;
        };
        match result {
            RemoteResult::Created(row) => {
                self.index.patch_create(key, row.info());
            }
            RemoteResult::Deleted => {}
            RemoteResult::Failed(_) => self.index.restore(key, flight.prior),
        }
        self.floor_seq = self.issued_seq + 1;
        ended
    }

    pub fn next_refresh_seq(&mut self) -> u64 {
        self.issued_seq += 1;
        self.issued_seq
    }

    pub fn tick_allowed(&self) -> bool {
        !self.tracker.has_any()
    }

    /// Replace the index wholesale with a server snapshot, then lay the overlays of
    /// still-pending keys back on top.
    pub fn apply_snapshot(&mut self, seq: u64, origin: RefreshOrigin, snapshot: ReservationIndex) -> Applied {
        if seq <= self.applied_seq || seq < self.floor_seq {
            return Applied::Stale;
        }
        if origin == RefreshOrigin::Tick && self.tracker.has_any() {
            return Applied::Suppressed;
        }
        self.applied_seq = seq;
        self.index.replace(snapshot);
        for (key, flight) in &self.in_flight {
            match &flight.overlay {
                Some(info) => {
                    self.index.patch_create(key, info.clone());
                }
                None => {
                    self.index.patch_delete(key);
                }
            }
        }
        Applied::Replaced
    }

    /// Whether the pending mutation on `key` is a create. `None` if not pending.
    pub fn pending_create(&self, key: &SlotKey) -> Option<bool> {
        self.in_flight.get(key).map(|f| f.overlay.is_some())
    }
}
