use crate::model::SlotKey;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// Instrument not in the catalog, or slot label not bookable on that date.
    UnknownSlot(SlotKey),
    /// Delete requested but the index holds no server id for the slot.
    MissingRecordId(SlotKey),
    /// The remote call failed. Local state has already been rolled back.
    Remote(StoreError),
    EngineClosed,
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileError::UnknownSlot(key) => write!(f, "unknown slot: {key}"),
            ReconcileError::MissingRecordId(key) => {
                write!(f, "no confirmed reservation id for {key}; refresh and retry")
            }
            ReconcileError::Remote(e) => write!(f, "{e}"),
            ReconcileError::EngineClosed => write!(f, "reservation engine has shut down"),
        }
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReconcileError::Remote(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for ReconcileError {
    fn from(e: StoreError) -> Self {
        ReconcileError::Remote(e)
    }
}
