//! Replica health checker.
//!
//! Every cycle probes each configured replica with `PING` and publishes the
//! ones that answered as the new healthy snapshot. Probe failures are logged
//! and only exclude that replica until the next cycle.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::connection::{Connect, ConnectionPool};
use crate::error::{Result, RwPoolError};
use crate::router::ReadWrite;

/// Background loop: sleep, check, repeat.
///
/// Exits when `stop` fires or its sender is dropped, or once the router
/// state is gone.
pub(crate) async fn run<K: Connect>(
    state: Weak<ReadWrite<K>>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    info!(interval_ms = interval.as_millis() as u64, "replica health checker started");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stop.changed() => break,
        }
        let Some(state) = state.upgrade() else {
            break;
        };
        check_cycle(&state).await;
    }
    info!("replica health checker stopped");
}

/// Probe every replica once and swap in the new snapshot.
///
/// Returns how many replicas are healthy. An empty snapshot is published
/// too; reads then go to the master until a replica recovers. Cycles are
/// serialized, so a slow cycle can't publish over a newer one.
pub(crate) async fn check_cycle<K: Connect>(state: &ReadWrite<K>) -> usize {
    let _cycle = state.cycle.lock().await;
    let start = Instant::now();
    let previous = state.snapshot();
    let mut healthy = Vec::with_capacity(state.replicas.len());

    for (idx, pool) in state.replicas.iter().enumerate() {
        let was_healthy = previous.iter().any(|p| p.same_pool(pool));
        match probe(pool, state.probe_timeout).await {
            Ok(()) => {
                if !was_healthy {
                    info!(replica = idx, addr = %pool.addr(), "replica passed health probe, back in rotation");
                }
                healthy.push(pool.clone());
            }
            Err(e) if was_healthy => {
                warn!(replica = idx, addr = %pool.addr(), error = %e, "replica failed health probe, excluded from reads");
            }
            Err(e) => {
                debug!(replica = idx, addr = %pool.addr(), error = %e, "replica still failing health probe");
            }
        }
    }

    let count = healthy.len();
    *state.healthy.write() = Arc::from(healthy);
    debug!(
        healthy = count,
        total = state.replicas.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "replica check cycle complete"
    );
    count
}

/// `PING` one replica, bounded by `limit`.
async fn probe<K: Connect>(pool: &ConnectionPool<K>, limit: Duration) -> Result<()> {
    match tokio::time::timeout(limit, pool.ping()).await {
        Ok(result) => result,
        Err(_) => Err(RwPoolError::Timeout(format!(
            "health probe to {} timed out after {limit:?}",
            pool.addr()
        ))),
    }
}

// ── Tests ──────────────────────────────────────────────────────────
