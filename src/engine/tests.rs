use super::*;
use crate::testing::*;

const S8: &str = "8:00 AM - 8:30 AM";
const S830: &str = "8:30 AM - 9:00 AM";

fn spawn_engine(store: Arc<ScriptedStore>, actor: Reserver) -> Engine {
    Engine::spawn(
        store,
        actor,
        &[instrument("X"), instrument("Y")],
        Arc::new(NotifyHub::new()),
    )
}

/// Engine with its initial load finished.
async fn ready(store: &Arc<ScriptedStore>, actor: Reserver) -> Engine {
    let engine = spawn_engine(store.clone(), actor);
    engine.refresh().await.unwrap();
    engine
}

async fn wait_for(engine: &Engine, pred: impl Fn(&SessionView) -> bool) -> SessionView {
    for _ in 0..10_000 {
        let view = engine.view().await.unwrap();
        if pred(&view) {
            return view;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

fn key(instrument: &str, slot: &str) -> SlotKey {
    SlotKey::new(instrument, monday(), slot)
}

// ── Round trips ──────────────────────────────────────────

#[tokio::test]
async fn toggle_reserves_then_releases() {
    let store = ScriptedStore::open();
    let engine = ready(&store, alice()).await;

    let outcome = engine.toggle("X", S8, monday()).await.unwrap();
    let ToggleOutcome::Reserved(info) = outcome.clone() else {
        panic!("expected Reserved, got {outcome:?}");
    };
    assert_eq!(info.reserver_name, "alice");
    assert!(info.record_id.confirmed().is_some());

    let view = engine.view().await.unwrap();
    assert_eq!(view.index.get(&key("X", S8)), Some(&info));
    assert!(!view.pending.has_any());
    assert_eq!(store.inner.len(), 1);

    let outcome = engine.toggle("X", S8, monday()).await.unwrap();
    assert_eq!(outcome, ToggleOutcome::Released);
    let view = engine.view().await.unwrap();
    assert!(!view.index.is_reserved(&key("X", S8)));
    assert!(store.inner.is_empty());
}

#[tokio::test]
async fn initial_load_happens_without_explicit_refresh() {
    let store = ScriptedStore::open();
    store.inner.create_reservation(booking("X", monday(), S8, &bob())).await.unwrap();
    let engine = spawn_engine(store.clone(), alice());
    let view = wait_for(&engine, |v| !v.index.is_empty()).await;
    assert_eq!(view.index.get(&key("X", S8)).unwrap().reserver_name, "bob");
}

// ── Admission control ────────────────────────────────────

#[tokio::test]
async fn second_toggle_while_pending_is_rejected() {
    let store = ScriptedStore::gated();
    let engine = ready(&store, alice()).await;

    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.toggle("X", S8, monday()).await }
    });
    let before = wait_for(&engine, |v| v.pending.is_pending(&key("X", S8))).await;

    let second = engine.toggle("X", S8, monday()).await.unwrap();
    assert_eq!(second, ToggleOutcome::AlreadyPending);

    let after = engine.view().await.unwrap();
    assert_eq!(after.index, before.index);
    assert_eq!(after.pending.len(), 1);

    store.release(1);
    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, ToggleOutcome::Reserved(_)));
    assert_eq!(store.inner.len(), 1);
    assert!(!engine.view().await.unwrap().pending.has_any());
}

#[tokio::test]
async fn different_keys_run_concurrently() {
    let store = ScriptedStore::gated();
    let engine = ready(&store, alice()).await;

    let a = tokio::spawn({
        let engine = engine.clone();
        async move { engine.toggle("X", S8, monday()).await }
    });
    let b = tokio::spawn({
        let engine = engine.clone();
        async move { engine.toggle("Y", S830, monday()).await }
    });
    let view = wait_for(&engine, |v| v.pending.len() == 2).await;
    assert_eq!(view.index.get(&key("X", S8)).unwrap().record_id, RecordId::Pending);
    assert_eq!(view.index.get(&key("Y", S830)).unwrap().record_id, RecordId::Pending);

    store.release(2);
    let (a, b) = futures::join!(a, b);
    assert!(matches!(a.unwrap(), Ok(ToggleOutcome::Reserved(_))));
    assert!(matches!(b.unwrap(), Ok(ToggleOutcome::Reserved(_))));
    assert_eq!(engine.view().await.unwrap().index.len(), 2);
}

#[tokio::test]
async fn unknown_slot_changes_nothing() {
    let store = ScriptedStore::open();
    let engine = ready(&store, alice()).await;

    let err = engine.toggle("Z", S8, monday()).await.unwrap_err();
    assert!(matches!(err, ReconcileError::UnknownSlot(_)));
    let err = engine.toggle("X", "5:00 PM - 5:30 PM", monday()).await.unwrap_err();
    assert!(matches!(err, ReconcileError::UnknownSlot(_)));
    assert!(engine.view().await.unwrap().index.is_empty());
    assert!(store.inner.is_empty());
}

// ── Failure paths ────────────────────────────────────────

#[tokio::test]
async fn failed_create_rolls_back() {
    let store = ScriptedStore::open();
    let engine = ready(&store, alice()).await;
    store.fail_next_write(StoreError::Transport("connection reset".into()));

    let err = engine.toggle("X", S8, monday()).await.unwrap_err();
    assert_eq!(err, ReconcileError::Remote(StoreError::Transport("connection reset".into())));

    let view = engine.view().await.unwrap();
    assert!(!view.index.is_reserved(&key("X", S8)));
    assert!(!view.pending.is_pending(&key("X", S8)));
    assert!(store.inner.is_empty());
}

#[tokio::test]
async fn deleting_someone_elses_reservation_is_forbidden() {
    let store = ScriptedStore::open();
    let row = store.inner.create_reservation(booking("X", monday(), S8, &bob())).await.unwrap();
    let engine = ready(&store, alice()).await;

    let err = engine.toggle("X", S8, monday()).await.unwrap_err();
    assert_eq!(err, ReconcileError::Remote(StoreError::Forbidden(row.id)));

    let view = engine.view().await.unwrap();
    assert_eq!(view.index.get(&key("X", S8)), Some(&row.info()));
    assert!(!view.pending.has_any());
}

#[tokio::test]
async fn failed_refresh_after_failure_still_restores_state() {
    let store = ScriptedStore::open();
    let row = store.inner.create_reservation(booking("X", monday(), S8, &alice())).await.unwrap();
    let engine = ready(&store, alice()).await;

    store.fail_next_write(StoreError::Transport("timeout".into()));
    store.fail_lists(ALWAYS);
    let err = engine.toggle("X", S8, monday()).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Remote(StoreError::Transport(_))));

    let view = engine.view().await.unwrap();
    assert_eq!(view.index.get(&key("X", S8)), Some(&row.info()));
    assert!(!view.pending.has_any());
}

#[tokio::test]
async fn refresh_error_is_surfaced() {
    let store = ScriptedStore::open();
    let engine = ready(&store, alice()).await;
    store.fail_lists(1);
    assert!(matches!(
        engine.refresh().await,
        Err(ReconcileError::Remote(StoreError::Transport(_)))
    ));
    engine.refresh().await.unwrap();
}

#[tokio::test]
async fn abandoned_toggle_still_settles() {
    let store = ScriptedStore::gated();
    let engine = ready(&store, alice()).await;

    let caller = tokio::spawn({
        let engine = engine.clone();
        async move { engine.toggle("X", S8, monday()).await }
    });
    wait_for(&engine, |v| v.pending.has_any()).await;
    caller.abort();

    store.release(1);
    let view = wait_for(&engine, |v| !v.pending.has_any()).await;
    assert!(view.index.is_reserved(&key("X", S8)));
    assert_eq!(store.inner.len(), 1);
}

// ── Background refresh gating ────────────────────────────

#[tokio::test]
async fn tick_does_not_replace_index_while_pending() {
    let store = ScriptedStore::gated();
    let engine = ready(&store, alice()).await;

    let toggle = tokio::spawn({
        let engine = engine.clone();
        async move { engine.toggle("X", S8, monday()).await }
    });
    let before = wait_for(&engine, |v| v.pending.has_any()).await;

    // Someone else books directly on the server meanwhile
    store.inner.create_reservation(booking("Y", monday(), S8, &bob())).await.unwrap();
    let lists = store.lists();

    assert_eq!(engine.tick().await.unwrap(), TickOutcome::Suppressed);
    assert_eq!(store.lists(), lists);
    assert_eq!(engine.view().await.unwrap().index, before.index);

    store.release(1);
    toggle.await.unwrap().unwrap();
    let view = engine.view().await.unwrap();
    assert!(view.index.is_reserved(&key("X", S8)));
    assert!(view.index.is_reserved(&key("Y", S8)));
}

#[tokio::test]
async fn tick_refreshes_when_idle() {
    let store = ScriptedStore::open();
    let engine = ready(&store, alice()).await;
    store.inner.create_reservation(booking("Y", monday(), S8, &bob())).await.unwrap();

    assert_eq!(engine.tick().await.unwrap(), TickOutcome::Refreshed);
    let view = engine.view().await.unwrap();
    assert_eq!(view.index.get(&key("Y", S8)).unwrap().reserver_name, "bob");
}

#[tokio::test]
async fn tick_failure_reported() {
    let store = ScriptedStore::open();
    let engine = ready(&store, alice()).await;
    store.fail_lists(1);
    assert!(engine.tick().await.is_err());
    assert_eq!(engine.tick().await.unwrap(), TickOutcome::Refreshed);
}

// ── Presentation ─────────────────────────────────────────

#[tokio::test]
async fn events_follow_toggle_lifecycle() {
    let store = ScriptedStore::open();
    let engine = ready(&store, alice()).await;
    let mut rx = engine.subscribe("X");

    engine.toggle("X", S8, monday()).await.unwrap();

    assert_eq!(
        rx.recv().await.unwrap(),
        SessionEvent::Pending { key: key("X", S8), create: true }
    );
    assert_eq!(
        rx.recv().await.unwrap(),
        SessionEvent::Settled { key: key("X", S8), ok: true }
    );
    assert_eq!(rx.recv().await.unwrap(), SessionEvent::Refreshed);
}

#[tokio::test]
async fn board_marks_own_reservations() {
    let store = ScriptedStore::open();
    store.inner.create_reservation(booking("X", monday(), S830, &bob())).await.unwrap();
    let engine = ready(&store, alice()).await;
    engine.toggle("X", S8, monday()).await.unwrap();

    let board = engine.board("X", monday()).await.unwrap();
    assert_eq!(board[0].state, SlotState::Reserved { by: "alice".into(), mine: true });
    assert_eq!(board[1].state, SlotState::Reserved { by: "bob".into(), mine: false });
    assert!(board[2..].iter().all(|s| s.state == SlotState::Free));
}
