//! End-to-end reconciliation scenarios against the simulated inventory.
//!
//! Each test wires a `SimulatedProvider`, a `LoadTracker` and a
//! `CapacityReconciler` the way the daemon does and drives them through
//! session events.

use std::sync::Arc;

use scaleset_core::config::ScalingConfig;
use scaleset_core::{InstanceState, PowerState};
use scaleset_load::{LoadError, LoadSource, LoadTracker};
use scaleset_provider::{InventoryProvider, SimulatedProvider};
use scaleset_reconcile::{CapacityReconciler, PassOutcome, PassReport};

struct Harness {
    provider: Arc<SimulatedProvider>,
    tracker: Arc<LoadTracker>,
    reconciler: CapacityReconciler,
}

impl Harness {
    fn new(provider: SimulatedProvider, scaling: ScalingConfig) -> Self {
        let provider = Arc::new(provider);
        let tracker = Arc::new(LoadTracker::new(scaling.max_load_per_instance));
        let reconciler = CapacityReconciler::new(provider.clone(), tracker.clone(), scaling);
        Self {
            provider,
            tracker,
            reconciler,
        }
    }

    async fn pass(&self) -> PassReport {
        match self.reconciler.reconcile().await {
            PassOutcome::Completed(report) => report,
            other => panic!("expected completed pass, got {other:?}"),
        }
    }

    fn state_of(&self, id: &str) -> Option<InstanceState> {
        self.reconciler
            .snapshot()
            .into_iter()
            .find(|r| r.id() == id)
            .map(|r| r.state)
    }

    async fn inventory_ids(&self) -> Vec<String> {
        self.provider
            .list_instances()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect()
    }
}

fn scaling(per_instance: u32, min_free: u32, min_active: u32) -> ScalingConfig {
    ScalingConfig {
        max_load_per_instance: per_instance,
        min_free_capacity: min_free,
        min_active_instances: min_active,
    }
}

#[tokio::test]
async fn fourth_session_provisions_second_instance() {
    let h = Harness::new(SimulatedProvider::new(3, 5).with_instances(1), scaling(5, 2, 1));
    let report = h.pass().await;
    assert_eq!(report.discovered, vec!["0".to_string()]);
    assert_eq!(report.target, 1);

    for _ in 0..4 {
        h.tracker.admit().unwrap();
    }
    let report = h.pass().await;
    assert_eq!(report.target, 2);
    assert_eq!(report.grow_requested, 1);
    assert_eq!(h.provider.grow_calls(), 1);
    assert_eq!(h.provider.instance_count().await, 2);

    // Next pass picks the new instance up; nothing else to do.
    let report = h.pass().await;
    assert_eq!(report.discovered, vec!["1".to_string()]);
    assert_eq!(report.active, 2);
    assert_eq!(h.provider.grow_calls(), 1);
    assert_eq!(h.tracker.is_accepting("1"), Some(true));

    // Best-fit: the fifth session still lands on the busy instance.
    assert_eq!(h.tracker.admit().unwrap().instance_id, "0");
}

#[tokio::test]
async fn idle_instance_is_closed_deleted_and_shrunk() {
    // Loads [5, 0]: one instance holds the load exactly when no free
    // slots are required.
    let h = Harness::new(SimulatedProvider::new(3, 5).with_instances(2), scaling(5, 0, 1));
    h.tracker.register_instance("0");
    h.tracker.register_instance("1");
    for _ in 0..5 {
        assert_eq!(h.tracker.admit().unwrap().instance_id, "0");
    }

    let report = h.pass().await;
    assert_eq!(report.target, 1);
    assert_eq!(report.closed, vec!["1".to_string()]);
    assert_eq!(report.retired, vec!["1".to_string()]);
    assert_eq!(h.provider.shrink_calls(), 1);
    assert_eq!(h.inventory_ids().await, vec!["0".to_string()]);
    assert_eq!(h.state_of("1"), None);
    assert_eq!(h.tracker.is_accepting("1"), None);
}

#[tokio::test]
async fn full_instance_and_idle_instance_with_free_slot_requirement() {
    // Same loads with two free slots required: one instance cannot
    // provide them, so both stay.
    let h = Harness::new(SimulatedProvider::new(3, 5).with_instances(2), scaling(5, 2, 1));
    h.tracker.register_instance("0");
    h.tracker.register_instance("1");
    for _ in 0..5 {
        h.tracker.admit().unwrap();
    }

    let report = h.pass().await;
    assert_eq!(report.target, 2);
    assert!(report.closed.is_empty());
    assert_eq!(h.provider.shrink_calls(), 0);
}

#[tokio::test]
async fn closed_instance_with_sessions_drains_before_retirement() {
    // Two fault domains: "0" and "2" share domain 0, "1" is alone in 1.
    let h = Harness::new(SimulatedProvider::new(2, 5).with_instances(3), scaling(5, 2, 1));
    for id in ["0", "1", "2"] {
        h.tracker.register_instance(id);
    }
    for _ in 0..5 {
        assert_eq!(h.tracker.admit().unwrap().instance_id, "0");
    }
    h.tracker.set_accepting("1", false).unwrap();
    let straggler = h.tracker.admit().unwrap();
    assert_eq!(straggler.instance_id, "2");
    h.tracker.set_accepting("1", true).unwrap();

    // Loads [5, 0, 1] → target 2. Domain 0 holds two running instances,
    // so its lighter one closes even though "1" is idle.
    let report = h.pass().await;
    assert_eq!(report.target, 2);
    assert_eq!(report.closed, vec!["2".to_string()]);
    assert!(report.retired.is_empty());
    assert_eq!(h.state_of("2"), Some(InstanceState::Closed));
    assert_eq!(h.tracker.is_accepting("2"), Some(false));
    assert_eq!(h.provider.shrink_calls(), 0);

    // Still holding a session: stays closed.
    let report = h.pass().await;
    assert!(report.is_noop(), "{report:?}");

    h.tracker.release(straggler.session_id).unwrap();
    let report = h.pass().await;
    assert_eq!(report.retired, vec!["2".to_string()]);
    assert_eq!(h.provider.shrink_calls(), 1);
    assert_eq!(h.inventory_ids().await, vec!["0".to_string(), "1".to_string()]);
}

#[tokio::test]
async fn closed_instance_reopens_before_provisioning() {
    let h = Harness::new(SimulatedProvider::new(2, 5).with_instances(3), scaling(5, 2, 1));
    for id in ["0", "1", "2"] {
        h.tracker.register_instance(id);
    }
    for _ in 0..5 {
        h.tracker.admit().unwrap();
    }
    h.tracker.set_accepting("1", false).unwrap();
    h.tracker.admit().unwrap();
    h.tracker.set_accepting("1", true).unwrap();

    let report = h.pass().await;
    assert_eq!(report.closed, vec!["2".to_string()]);

    // Fill "1" up to four sessions: loads [5, 4, 1] → target 3.
    for _ in 0..4 {
        assert_eq!(h.tracker.admit().unwrap().instance_id, "1");
    }
    let report = h.pass().await;
    assert_eq!(report.target, 3);
    assert_eq!(report.opened, vec!["2".to_string()]);
    assert_eq!(report.grow_requested, 0);
    assert_eq!(h.state_of("2"), Some(InstanceState::Running));
    assert_eq!(h.tracker.is_accepting("2"), Some(true));
    assert_eq!(h.provider.grow_calls(), 0);
}

#[tokio::test]
async fn converged_pool_makes_no_provider_calls() {
    let h = Harness::new(SimulatedProvider::new(3, 5).with_instances(4), scaling(5, 2, 1));
    h.pass().await;
    let (grows, shrinks) = (h.provider.grow_calls(), h.provider.shrink_calls());
    let before = h.reconciler.snapshot();

    let report = h.pass().await;
    assert!(report.is_noop(), "{report:?}");
    assert_eq!(h.reconciler.snapshot(), before);
    assert_eq!(h.provider.grow_calls(), grows);
    assert_eq!(h.provider.shrink_calls(), shrinks);
}

#[tokio::test]
async fn empty_inventory_grows_to_min_active() {
    let h = Harness::new(SimulatedProvider::new(3, 5), scaling(5, 0, 2));
    let report = h.pass().await;
    assert_eq!(report.target, 2);
    assert_eq!(report.grow_requested, 2);
    assert_eq!(h.provider.instance_count().await, 2);

    let report = h.pass().await;
    assert_eq!(report.discovered.len(), 2);
    assert_eq!(report.active, 2);
}

#[tokio::test]
async fn provider_outage_fails_pass_without_blocking_the_next() {
    let h = Harness::new(SimulatedProvider::new(3, 5).with_instances(1), scaling(5, 2, 1));
    h.provider.set_available(false);

    assert!(matches!(h.reconciler.reconcile().await, PassOutcome::Failed(_)));
    assert!(!h.reconciler.is_reconciling());
    assert!(h.reconciler.snapshot().is_empty());

    h.provider.set_available(true);
    let report = h.pass().await;
    assert_eq!(report.discovered, vec!["0".to_string()]);
}

#[tokio::test]
async fn stopped_instance_loses_its_sessions() {
    let h = Harness::new(SimulatedProvider::new(3, 5).with_instances(2), scaling(5, 2, 2));
    h.pass().await;
    let session = h.tracker.admit().unwrap();
    assert_eq!(session.instance_id, "0");

    h.provider
        .set_power_state("0", PowerState::Stopped)
        .await
        .unwrap();
    let report = h.pass().await;

    assert_eq!(report.removed, vec!["0".to_string()]);
    assert_eq!(h.state_of("0"), None);
    assert_eq!(
        h.tracker.release(session.session_id),
        Err(LoadError::UnknownSession(session.session_id))
    );
    // Floor of two running instances: a replacement is requested.
    assert_eq!(report.grow_requested, 1);
}

#[tokio::test]
async fn unknown_session_release_changes_nothing() {
    let h = Harness::new(SimulatedProvider::new(3, 5).with_instances(1), scaling(5, 2, 1));
    h.pass().await;
    h.tracker.admit().unwrap();
    let loads = h.tracker.loads();

    let bogus = uuid_like();
    assert_eq!(h.tracker.release(bogus), Err(LoadError::UnknownSession(bogus)));
    assert_eq!(h.tracker.loads(), loads);
    assert_eq!(h.tracker.sample_load("0"), 1);
}

/// A session id the tracker never handed out.
fn uuid_like() -> scaleset_core::SessionId {
    let tracker = LoadTracker::new(1);
    tracker.register_instance("scratch");
    let record = tracker.admit().unwrap();
    record.session_id
}
