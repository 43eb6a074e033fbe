//! Simulated workload: ramp sessions up to a peak, then back down to zero,
//! with the reconciler resizing the in-memory inventory as load moves.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use scaleset_core::{ScaleSetConfig, SessionId};
use scaleset_load::{LoadError, LoadTracker};
use scaleset_provider::SimulatedProvider;
use scaleset_reconcile::{CapacityReconciler, PassOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    RampUp,
    RampDown,
}

pub async fn run(config: ScaleSetConfig, peak_sessions: u32, tick: Duration) -> anyhow::Result<()> {
    info!(
        peak_sessions,
        tick_ms = tick.as_millis() as u64,
        fault_domains = config.provider.fault_domains,
        initial_instances = config.initial_instances(),
        "simulation starting"
    );

    let provider = Arc::new(SimulatedProvider::from_config(&config));
    let tracker = Arc::new(LoadTracker::new(config.scaling.max_load_per_instance));
    let reconciler = Arc::new(
        CapacityReconciler::new(provider.clone(), tracker.clone(), config.scaling.clone())
            .with_provider_timeout(config.reconciler.provider_timeout()),
    );

    // Register the seeded inventory before the first session arrives.
    if let PassOutcome::Failed(e) = reconciler.reconcile().await {
        anyhow::bail!("initial reconciliation failed: {e}");
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = signal_tx.send(true);
        }
    });

    // ── Reconciler loop ────────────────────────────────────────

    let looping = reconciler.clone();
    let loop_shutdown = shutdown_rx.clone();
    let interval = config.reconciler.interval();
    let reconcile_handle = tokio::spawn(async move {
        looping.run(interval, loop_shutdown).await;
    });

    drive_workload(&tracker, &reconciler, peak_sessions, tick, shutdown_rx).await;

    let _ = shutdown_tx.send(true);
    let _ = reconcile_handle.await;

    // Settle the pool once the workload is gone.
    match reconciler.reconcile().await {
        PassOutcome::Completed(report) => {
            info!(report = %serde_json::to_string(&report)?, "final reconciliation pass");
        }
        PassOutcome::Failed(e) => warn!(error = %e, "final reconciliation pass failed"),
        PassOutcome::Skipped => {}
    }

    println!("{}", serde_json::to_string_pretty(&reconciler.snapshot())?);
    info!(
        instances = provider.instance_count().await,
        grow_calls = provider.grow_calls(),
        shrink_calls = provider.shrink_calls(),
        "simulation finished"
    );
    Ok(())
}

async fn drive_workload(
    tracker: &LoadTracker,
    reconciler: &CapacityReconciler,
    peak_sessions: u32,
    tick: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sessions: VecDeque<SessionId> = VecDeque::new();
    let mut phase = Phase::RampUp;
    let mut ticker = tokio::time::interval(tick);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                info!(open_sessions = sessions.len(), "workload interrupted");
                return;
            }
        }

        match phase {
            Phase::RampUp => match tracker.admit() {
                Ok(record) => {
                    sessions.push_back(record.session_id);
                    if sessions.len() as u32 >= peak_sessions {
                        info!(sessions = sessions.len(), "peak reached, ramping down");
                        phase = Phase::RampDown;
                    }
                }
                Err(LoadError::InsufficientCapacity { capacity }) => {
                    warn!(capacity, open_sessions = sessions.len(), "session rejected, waiting for capacity");
                }
                Err(e) => warn!(error = %e, "session admission failed"),
            },
            Phase::RampDown => {
                let Some(session_id) = sessions.pop_front() else {
                    info!("all sessions released");
                    return;
                };
                if let Err(e) = tracker.release(session_id) {
                    // Sessions on an instance that went away are already gone.
                    debug!(session = %session_id, error = %e, "release failed");
                }
            }
        }

        reconciler.notify();
        debug!(
            open_sessions = sessions.len(),
            loads = ?tracker.loads(),
            "workload step"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn workload_returns_to_zero_sessions() {
        let mut config = ScaleSetConfig::default();
        config.provider.initial_instances = Some(1);
        let provider = Arc::new(SimulatedProvider::from_config(&config));
        let tracker = Arc::new(LoadTracker::new(config.scaling.max_load_per_instance));
        let reconciler = Arc::new(CapacityReconciler::new(
            provider.clone(),
            tracker.clone(),
            config.scaling.clone(),
        ));
        reconciler.reconcile().await;

        let (_workload_tx, workload_rx) = watch::channel(false);
        let (loop_tx, loop_rx) = watch::channel(false);
        let looping = reconciler.clone();
        let handle = tokio::spawn(async move {
            looping.run(Duration::from_secs(30), loop_rx).await;
        });

        drive_workload(&tracker, &reconciler, 12, Duration::from_millis(100), workload_rx).await;
        assert_eq!(tracker.session_count(), 0);
        assert!(provider.grow_calls() >= 1);

        loop_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(matches!(reconciler.reconcile().await, PassOutcome::Completed(_)));
        assert_eq!(provider.instance_count().await, 1);
    }

    #[tokio::test]
    async fn shutdown_interrupts_workload() {
        let provider = Arc::new(SimulatedProvider::new(3, 5).with_instances(1));
        let tracker = Arc::new(LoadTracker::new(5));
        let reconciler =
            CapacityReconciler::new(provider, tracker.clone(), ScaleSetConfig::default().scaling);

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        drive_workload(&tracker, &reconciler, 1000, Duration::from_secs(3600), rx).await;
        assert!(tracker.session_count() <= 1);
    }
}
