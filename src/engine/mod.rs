mod error;
mod state;
mod view;
#[cfg(test)]
mod tests;

pub use error::ReconcileError;
pub use state::{Applied, RefreshOrigin, RemoteOp, RemoteResult, SessionState, Toggle};
pub use view::{SlotState, SlotView, board};

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::index::ReservationIndex;
use crate::model::*;
use crate::notify::{NotifyHub, SessionEvent};
use crate::observability::*;
use crate::store::{ReservationStore, StoreError};
use crate::tracker::MutationTracker;

const COMMAND_QUEUE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The slot is now ours; carries the server-confirmed entry.
    Reserved(ReservationInfo),
    Released,
    /// A mutation on this key was already in flight; nothing was done.
    AlreadyPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Refreshed,
    /// Skipped or discarded because a mutation was pending.
    Suppressed,
}

/// Point-in-time copy of the session state.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub index: ReservationIndex,
    pub pending: MutationTracker,
}

// ── Dispatcher messages ──────────────────────────────────

type ToggleReply = oneshot::Sender<Result<ToggleOutcome, ReconcileError>>;

/// Who is waiting on a refresh, and what to tell them.
enum Reply {
    None,
    Tick(oneshot::Sender<Result<TickOutcome, ReconcileError>>),
    Manual(oneshot::Sender<Result<(), ReconcileError>>),
    /// The toggle's own result, delivered once its follow-up refresh lands.
    Toggle {
        outcome: Result<ToggleOutcome, ReconcileError>,
        response: ToggleReply,
    },
}

enum Command {
    Toggle {
        key: SlotKey,
        response: ToggleReply,
    },
    RemoteSettled {
        key: SlotKey,
        op: &'static str,
        result: RemoteResult,
        response: ToggleReply,
    },
    Refresh {
        origin: RefreshOrigin,
        reply: Reply,
    },
    RefreshLoaded {
        seq: u64,
        origin: RefreshOrigin,
        result: Result<ReservationIndex, StoreError>,
        reply: Reply,
    },
    View {
        response: oneshot::Sender<SessionView>,
    },
    Board {
        instrument: String,
        date: NaiveDate,
        response: oneshot::Sender<Vec<SlotView>>,
    },
}

/// Single owner of the session state. Every message is handled to completion
/// without suspending; remote calls run on spawned tasks and report back as messages.
struct Dispatcher {
    state: SessionState,
    store: Arc<dyn ReservationStore>,
    actor: Reserver,
    notify: Arc<NotifyHub>,
    tx: mpsc::WeakSender<Command>,
}

impl Dispatcher {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        self.spawn_refresh(RefreshOrigin::Manual, Reply::None);
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd);
        }
        debug!("reservation engine stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Toggle { key, response } => self.on_toggle(key, response),
            Command::RemoteSettled {
                key,
                op,
                result,
                response,
            } => self.on_settled(key, op, result, response),
            Command::Refresh { origin, reply } => self.on_refresh(origin, reply),
            Command::RefreshLoaded {
                seq,
                origin,
                result,
                reply,
            } => self.on_loaded(seq, origin, result, reply),
            Command::View { response } => {
                let _ = response.send(SessionView {
                    index: self.state.index().clone(),
                    pending: self.state.tracker().clone(),
                });
            }
            Command::Board {
                instrument,
                date,
                response,
            } => {
                let _ = response.send(board(&self.state, &instrument, date, &self.actor.user_id));
            }
        }
    }

    fn on_toggle(&mut self, key: SlotKey, response: ToggleReply) {
        let op = match self.state.start_toggle(&key, &self.actor) {
            Ok(Toggle::Started(op)) => op,
            Ok(Toggle::AlreadyPending) => {
                debug!("toggle on {key} ignored: already pending");
                metrics::counter!(TOGGLES_TOTAL, "op" => "none", "outcome" => "already_pending").increment(1);
                let _ = response.send(Ok(ToggleOutcome::AlreadyPending));
                return;
            }
            Err(e) => {
                warn!("toggle on {key} rejected: {e}");
                metrics::counter!(TOGGLES_TOTAL, "op" => "none", "outcome" => "rejected").increment(1);
                let _ = response.send(Err(e));
                return;
            }
        };

        let label = op.label();
        debug!("optimistic {label} on {key}");
        metrics::gauge!(PENDING_MUTATIONS).set(self.state.tracker().len() as f64);
        self.notify.send(
            &key.instrument,
            &SessionEvent::Pending {
                key: key.clone(),
                create: matches!(op, RemoteOp::Create(_)),
            },
        );

        let Some(tx) = self.tx.upgrade() else {
            let result = RemoteResult::Failed(StoreError::Transport("engine shutting down".into()));
            self.on_settled(key, label, result, response);
            return;
        };
        let store = self.store.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let call = tokio::spawn(async move {
                match op {
                    RemoteOp::Create(req) => match store.create_reservation(req).await {
                        Ok(row) => RemoteResult::Created(row),
                        Err(e) => RemoteResult::Failed(e),
                    },
                    RemoteOp::Delete {
                        id,
                        reserver_user_id,
                    } => match store.delete_reservation(id, &reserver_user_id).await {
                        Ok(()) => RemoteResult::Deleted,
                        Err(e) => RemoteResult::Failed(e),
                    },
                }
            });
            let result = call
                .await
                .unwrap_or_else(|e| RemoteResult::Failed(StoreError::Transport(e.to_string())));
            metrics::histogram!(REMOTE_DURATION_SECONDS, "op" => label)
                .record(started.elapsed().as_secs_f64());
            let _ = tx
                .send(Command::RemoteSettled {
                    key,
                    op: label,
                    result,
                    response,
                })
                .await;
        });
    }

    fn on_settled(&mut self, key: SlotKey, op: &'static str, result: RemoteResult, response: ToggleReply) {
        if !self.state.settle(&key, &result) {
            warn!("settled {key} but it was not pending");
        }
        metrics::gauge!(PENDING_MUTATIONS).set(self.state.tracker().len() as f64);

        let outcome = match result {
            RemoteResult::Created(row) => {
                info!("reserved {key} as {}", row.id);
                Ok(ToggleOutcome::Reserved(row.info()))
            }
            RemoteResult::Deleted => {
                info!("released {key}");
                Ok(ToggleOutcome::Released)
            }
            RemoteResult::Failed(e) => {
                warn!("{op} on {key} failed, rolled back: {e}");
                metrics::counter!(ROLLBACKS_TOTAL, "op" => op).increment(1);
                Err(ReconcileError::Remote(e))
            }
        };
        metrics::counter!(TOGGLES_TOTAL, "op" => op, "outcome" => status_label(&outcome)).increment(1);
        self.notify.send(
            &key.instrument,
            &SessionEvent::Settled {
                key: key.clone(),
                ok: outcome.is_ok(),
            },
        );

        self.spawn_refresh(RefreshOrigin::Mutation, Reply::Toggle { outcome, response });
    }

    fn on_refresh(&mut self, origin: RefreshOrigin, reply: Reply) {
        if origin == RefreshOrigin::Tick && !self.state.tick_allowed() {
            debug!("refresh tick suppressed: {} mutation(s) pending", self.state.tracker().len());
            metrics::counter!(REFRESH_SUPPRESSED_TOTAL).increment(1);
            finish(reply, Ok(Applied::Suppressed));
            return;
        }
        self.spawn_refresh(origin, reply);
    }

    fn spawn_refresh(&mut self, origin: RefreshOrigin, reply: Reply) {
        let seq = self.state.next_refresh_seq();
        let Some(tx) = self.tx.upgrade() else {
            finish(reply, Err(ReconcileError::EngineClosed));
            return;
        };
        let store = self.store.clone();
        tokio::spawn(async move {
            let result = store.list_reservations().await;
            let _ = tx
                .send(Command::RefreshLoaded {
                    seq,
                    origin,
                    result,
                    reply,
                })
                .await;
        });
    }

    fn on_loaded(
        &mut self,
        seq: u64,
        origin: RefreshOrigin,
        result: Result<ReservationIndex, StoreError>,
        reply: Reply,
    ) {
        metrics::counter!(REFRESHES_TOTAL, "origin" => origin.label(), "status" => status_label(&result))
            .increment(1);
        let applied = match result {
            Ok(snapshot) => {
                let applied = self.state.apply_snapshot(seq, origin, snapshot);
                match applied {
                    Applied::Replaced => {
                        debug!(
                            "index replaced from {} refresh #{seq}: {} reservation(s)",
                            origin.label(),
                            self.state.index().len()
                        );
                        self.notify.send_all(&SessionEvent::Refreshed);
                    }
                    Applied::Suppressed => {
                        debug!("tick refresh #{seq} discarded: mutation pending");
                        metrics::counter!(REFRESH_SUPPRESSED_TOTAL).increment(1);
                    }
                    Applied::Stale => debug!("refresh #{seq} superseded"),
                }
                Ok(applied)
            }
            Err(e) => {
                warn!("{} refresh failed: {e}", origin.label());
                Err(ReconcileError::Remote(e))
            }
        };
        finish(reply, applied);
    }
}

fn finish(reply: Reply, refresh: Result<Applied, ReconcileError>) {
    match reply {
        Reply::None => {}
        Reply::Tick(tx) => {
            let _ = tx.send(refresh.map(|applied| match applied {
                Applied::Replaced => TickOutcome::Refreshed,
                Applied::Suppressed | Applied::Stale => TickOutcome::Suppressed,
            }));
        }
        Reply::Manual(tx) => {
            let _ = tx.send(refresh.map(|_| ()));
        }
        // A failed follow-up refresh leaves the settled local patch in place;
        // the toggle's own result stands.
        Reply::Toggle { outcome, response } => {
            let _ = response.send(outcome);
        }
    }
}

// ── Handle ───────────────────────────────────────────────

/// Cheap, cloneable handle to one user's reconciliation session.
#[derive(Clone)]
pub struct Engine {
    tx: mpsc::Sender<Command>,
    notify: Arc<NotifyHub>,
    actor: Reserver,
}

impl Engine {
    /// Start the dispatcher task and kick off the initial load.
    pub fn spawn(
        store: Arc<dyn ReservationStore>,
        actor: Reserver,
        instruments: &[Instrument],
        notify: Arc<NotifyHub>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let dispatcher = Dispatcher {
            state: SessionState::new(instruments.iter().map(|i| i.name.clone())),
            store,
            actor: actor.clone(),
            notify: notify.clone(),
            tx: tx.downgrade(),
        };
        tokio::spawn(dispatcher.run(rx));
        Self { tx, notify, actor }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, ReconcileError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| ReconcileError::EngineClosed)?;
        rx.await.map_err(|_| ReconcileError::EngineClosed)
    }

    /// Reserve the slot if free, release it if reserved.
    ///
    /// Resolves after the remote call and its follow-up refresh. Dropping the future
    /// does not cancel the mutation.
    pub async fn toggle(&self, instrument: &str, slot: &str, date: NaiveDate) -> Result<ToggleOutcome, ReconcileError> {
        let key = SlotKey::new(instrument, date, slot);
        self.request(|response| Command::Toggle { key, response }).await?
    }

    /// Unconditional authoritative refresh.
    pub async fn refresh(&self) -> Result<(), ReconcileError> {
        self.request(|tx| Command::Refresh {
            origin: RefreshOrigin::Manual,
            reply: Reply::Manual(tx),
        })
        .await?
    }

    /// Scheduler refresh; suppressed while any mutation is pending.
    pub async fn tick(&self) -> Result<TickOutcome, ReconcileError> {
        self.request(|tx| Command::Refresh {
            origin: RefreshOrigin::Tick,
            reply: Reply::Tick(tx),
        })
        .await?
    }

    pub async fn view(&self) -> Result<SessionView, ReconcileError> {
        self.request(|response| Command::View { response }).await
    }

    pub async fn board(&self, instrument: &str, date: NaiveDate) -> Result<Vec<SlotView>, ReconcileError> {
        self.request(|response| Command::Board {
            instrument: instrument.to_string(),
            date,
            response,
        })
        .await
    }

    pub fn subscribe(&self, instrument: &str) -> broadcast::Receiver<SessionEvent> {
        self.notify.subscribe(instrument)
    }

    pub fn actor(&self) -> &Reserver {
        &self.actor
    }
}
