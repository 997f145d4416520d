use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::SlotKey;

const CHANNEL_CAPACITY: usize = 256;

/// What a presentation layer needs to redraw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A toggle entered its pending state.
    Pending { key: SlotKey, create: bool },
    /// A toggle finished; `ok` is false when it was rolled back.
    Settled { key: SlotKey, ok: bool },
    /// The index was replaced from a server snapshot.
    Refreshed,
}

/// Broadcast hub for session events, one channel per instrument.
#[derive(Default)]
pub struct NotifyHub {
    channels: DashMap<String, broadcast::Sender<SessionEvent>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events for an instrument. Creates the channel if needed.
    pub fn subscribe(&self, instrument: &str) -> broadcast::Receiver<SessionEvent> {
        let sender = self
            .channels
            .entry(instrument.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send to one instrument's listeners. No-op if nobody is listening.
    pub fn send(&self, instrument: &str, event: &SessionEvent) {
        if let Some(sender) = self.channels.get(instrument) {
            let _ = sender.send(event.clone());
        }
    }

    /// Send to every instrument's listeners.
    pub fn send_all(&self, event: &SessionEvent) {
        for sender in self.channels.iter() {
            let _ = sender.send(event.clone());
        }
    }

    pub fn remove(&self, instrument: &str) {
        self.channels.remove(instrument);
    }
}
