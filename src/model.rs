use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// A bookable lab instrument. `name` is the unique key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// The acting user. Identity resolution happens outside this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reserver {
    pub user_id: String,
    pub display_name: String,
}

impl Reserver {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Identity of one bookable slot instance: instrument, date and slot label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub instrument: String,
    pub date: NaiveDate,
    pub slot: String,
}

impl SlotKey {
    pub fn new(instrument: impl Into<String>, date: NaiveDate, slot: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            date,
            slot: slot.into(),
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.instrument, self.date, self.slot)
    }
}

/// Server-assigned record id, or `Pending` while an optimistic create is in flight.
///
/// A delete can only be issued against `Confirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordId {
    Confirmed(Ulid),
    Pending,
}

impl RecordId {
    pub fn confirmed(&self) -> Option<Ulid> {
        match self {
            RecordId::Confirmed(id) => Some(*id),
            RecordId::Pending => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, RecordId::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationInfo {
    pub reserver_name: String,
    pub reserver_id: String,
    pub record_id: RecordId,
}

impl ReservationInfo {
    /// Placeholder entry shown between an optimistic create and server confirmation.
    pub fn pending(reserver: &Reserver) -> Self {
        Self {
            reserver_name: reserver.display_name.clone(),
            reserver_id: reserver.user_id.clone(),
            record_id: RecordId::Pending,
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.reserver_id == user_id
    }
}

/// Persisted row shape, serialized with the store's camelCase field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: Ulid,
    pub instrument_name: String,
    pub slot: String,
    pub date: NaiveDate,
    pub reserver_name: String,
    pub reserver_user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.instrument_name.clone(), self.date, self.slot.clone())
    }

    pub fn info(&self) -> ReservationInfo {
        ReservationInfo {
            reserver_name: self.reserver_name.clone(),
            reserver_id: self.reserver_user_id.clone(),
            record_id: RecordId::Confirmed(self.id),
        }
    }
}

/// Create request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReservation {
    pub instrument_name: String,
    pub slot: String,
    pub date: NaiveDate,
    pub reserver_name: String,
    pub reserver_user_id: String,
}

impl NewReservation {
    pub fn for_key(key: &SlotKey, reserver: &Reserver) -> Self {
        Self {
            instrument_name: key.instrument.clone(),
            slot: key.slot.clone(),
            date: key.date,
            reserver_name: reserver.display_name.clone(),
            reserver_user_id: reserver.user_id.clone(),
        }
    }
}
