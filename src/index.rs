use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::model::*;

/// (date, slot label) within one instrument.
pub type SlotRef = (NaiveDate, String);

/// instrument → (date, slot) → reservation. Absence means the slot is free.
///
/// The authoritative copy comes from `replace`; `patch_*` only exist for optimistic
/// display and are thrown away by the next `replace`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationIndex {
    by_instrument: HashMap<String, BTreeMap<SlotRef, ReservationInfo>>,
}

impl ReservationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from the store's rows. A later row for the same slot wins.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Reservation>) -> Self {
        let mut index = Self::new();
        for r in records {
            index.patch_create(&r.key(), r.info());
        }
        index
    }

    pub fn replace(&mut self, snapshot: ReservationIndex) {
        *self = snapshot;
    }

    pub fn get(&self, key: &SlotKey) -> Option<&ReservationInfo> {
        self.by_instrument
            .get(&key.instrument)?
            .get(&(key.date, key.slot.clone()))
    }

    pub fn is_reserved(&self, key: &SlotKey) -> bool {
        self.get(key).is_some()
    }

    /// Insert or overwrite the entry for `key`. Returns the previous entry.
    pub fn patch_create(&mut self, key: &SlotKey, info: ReservationInfo) -> Option<ReservationInfo> {
        self.by_instrument
            .entry(key.instrument.clone())
            .or_default()
            .insert((key.date, key.slot.clone()), info)
    }

    /// Remove the entry for `key`, dropping the instrument map once it empties.
    pub fn patch_delete(&mut self, key: &SlotKey) -> Option<ReservationInfo> {
        let slots = self.by_instrument.get_mut(&key.instrument)?;
        let removed = slots.remove(&(key.date, key.slot.clone()));
        if slots.is_empty() {
            self.by_instrument.remove(&key.instrument);
        }
        removed
    }

    /// Put `key` back to `prior` (reserved or free).
    pub fn restore(&mut self, key: &SlotKey, prior: Option<ReservationInfo>) {
        match prior {
            Some(info) => {
                self.patch_create(key, info);
            }
            None => {
                self.patch_delete(key);
            }
        }
    }

    pub fn reservations_for(&self, instrument: &str) -> impl Iterator<Item = (&SlotRef, &ReservationInfo)> {
        self.by_instrument.get(instrument).into_iter().flatten()
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.by_instrument.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_instrument.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_instrument.is_empty()
    }
}
