use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::model::NewReservation;
use crate::observability::*;
use crate::store::{ReservationStore, StoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RolloverReport {
    pub cleared_today: usize,
    pub copied: usize,
    /// Rows for tomorrow that could not be copied because the slot was already taken today.
    pub skipped: usize,
    pub cleared_tomorrow: usize,
}

/// Slide the two-day window forward: drop today's rows, move tomorrow's rows to today
/// under fresh ids, drop tomorrow's rows.
///
/// Tomorrow is the next calendar day, not the next bookable day.
pub async fn rollover(store: &dyn ReservationStore, today: NaiveDate) -> Result<RolloverReport, StoreError> {
    let Some(tomorrow) = today.succ_opt() else {
        return Err(StoreError::Validation("date"));
    };
    info!("rollover: {today} <- {tomorrow}");

    let cleared_today = store.delete_by_date(today).await?;
    info!("rollover: cleared {cleared_today} reservation(s) for {today}");

    let rows = store.list_by_date(tomorrow).await?;
    let copies = rows.into_iter().map(|row| {
        store.create_reservation(NewReservation {
            instrument_name: row.instrument_name,
            slot: row.slot,
            date: today,
            reserver_name: row.reserver_name,
            reserver_user_id: row.reserver_user_id,
        })
    });

    let mut report = RolloverReport {
        cleared_today,
        ..RolloverReport::default()
    };
    let mut first_err = None;
    for result in join_all(copies).await {
        match result {
            Ok(_) => report.copied += 1,
            Err(StoreError::Conflict {
                instrument,
                date,
                slot,
            }) => {
                warn!("rollover: {instrument} {date} {slot} already taken, not copied");
                report.skipped += 1;
            }
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    // Keep tomorrow's rows if any copy failed, so nothing is lost.
    if let Some(e) = first_err {
        return Err(e);
    }
    info!("rollover: copied {} reservation(s) to {today}", report.copied);

    report.cleared_tomorrow = store.delete_by_date(tomorrow).await?;
    info!(
        "rollover: cleared {} reservation(s) for {tomorrow}",
        report.cleared_tomorrow
    );
    metrics::counter!(ROLLOVER_ROWS_COPIED_TOTAL).increment(report.copied as u64);
    Ok(report)
}

/// Time from `now` until the next `hour:00`.
pub fn until_next_run(now: NaiveDateTime, hour: u32) -> Duration {
    let at = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default();
    let mut next = now.date().and_time(at);
    if next <= now {
        next += chrono::Duration::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// Background task: run the rollover once a day at `hour` local time.
pub async fn run_rollover(store: Arc<dyn ReservationStore>, hour: u32, cancel: CancellationToken) {
    loop {
        let wait = until_next_run(Local::now().naive_local(), hour);
        info!("next rollover in {}s", wait.as_secs());
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        let today = Local::now().date_naive();
        let result = rollover(store.as_ref(), today).await;
        metrics::counter!(ROLLOVER_RUNS_TOTAL, "status" => status_label(&result)).increment(1);
        match result {
            Ok(report) => info!("rollover for {today} complete: {report:?}"),
            Err(e) => error!("rollover for {today} failed: {e}"),
        }
    }
}
