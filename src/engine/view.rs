use chrono::NaiveDate;

use crate::catalog::{self, Slot};
use crate::model::SlotKey;

use super::SessionState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Reserved { by: String, mine: bool },
    /// Optimistically reserved, awaiting the server.
    PendingCreate,
    /// Optimistically freed, awaiting the server.
    PendingDelete,
}

impl SlotState {
    pub fn is_pending(&self) -> bool {
        matches!(self, SlotState::PendingCreate | SlotState::PendingDelete)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotView {
    pub slot: Slot,
    pub state: SlotState,
}

/// One instrument's slots on `date`, in catalog order.
pub fn board(state: &SessionState, instrument: &str, date: NaiveDate, me: &str) -> Vec<SlotView> {
    catalog::slots_for_date(date)
        .into_iter()
        .map(|slot| {
            let key = SlotKey::new(instrument, date, slot.label.clone());
            let state = match state.pending_create(&key) {
                Some(true) => SlotState::PendingCreate,
                Some(false) => SlotState::PendingDelete,
                None => match state.index().get(&key) {
                    Some(info) => SlotState::Reserved {
                        by: info.reserver_name.clone(),
                        mine: info.is_owned_by(me),
                    },
                    None => SlotState::Free,
                },
            };
            SlotView { slot, state }
        })
        .collect()
}
