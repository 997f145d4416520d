use std::net::SocketAddr;

// ── Reconciliation ──────────────────────────────────────────────

/// Counter: toggles handled. Labels: op, outcome.
pub const TOGGLES_TOTAL: &str = "slotbook_toggles_total";

/// Counter: optimistic patches rolled back after a remote failure. Labels: op.
pub const ROLLBACKS_TOTAL: &str = "slotbook_rollbacks_total";

/// Gauge: keys currently awaiting server confirmation.
pub const PENDING_MUTATIONS: &str = "slotbook_pending_mutations";

/// Histogram: remote create/delete latency in seconds. Labels: op.
pub const REMOTE_DURATION_SECONDS: &str = "slotbook_remote_duration_seconds";

// ── Refresh ─────────────────────────────────────────────────────

/// Counter: authoritative fetches. Labels: origin, status.
pub const REFRESHES_TOTAL: &str = "slotbook_refreshes_total";

/// Counter: scheduler ticks skipped because a mutation was pending.
pub const REFRESH_SUPPRESSED_TOTAL: &str = "slotbook_refresh_suppressed_total";

/// Counter: scheduler retries after a failed fetch.
pub const REFRESH_RETRIES_TOTAL: &str = "slotbook_refresh_retries_total";

// ── Maintenance ─────────────────────────────────────────────────

/// Counter: rollover runs. Labels: status.
pub const ROLLOVER_RUNS_TOTAL: &str = "slotbook_rollover_runs_total";

/// Counter: rows copied forward by rollover.
pub const ROLLOVER_ROWS_COPIED_TOTAL: &str = "slotbook_rollover_rows_copied_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

pub fn status_label<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() { "ok" } else { "error" }
}
