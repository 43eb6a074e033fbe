//! Capacity reconciler — the control loop over instance lifecycle.
//!
//! The reconciler exclusively owns `InstanceRecord::state`. Load and the
//! accepting flag belong to the `LoadSource` and are only changed through
//! its operations.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use scaleset_core::config::ScalingConfig;
use scaleset_core::{InstanceDescriptor, InstanceId, InstanceRecord, InstanceState, PowerState};
use scaleset_load::{LoadError, LoadSource};
use scaleset_provider::{BoxFuture, InventoryProvider, ProviderResult};

use crate::capacity::compute_target_count;
use crate::error::{ReconcileError, ReconcileResult};
use crate::selection::{select_to_close, select_to_open};

const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(300);

/// What a completed pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Instance count the pass sized the pool to.
    pub target: u32,
    /// Running instances after opening and closing.
    pub active: u32,
    /// Newly tracked instances.
    pub discovered: Vec<InstanceId>,
    /// Starting instances the provider now reports running.
    pub promoted: Vec<InstanceId>,
    /// Instances the provider reported gone or powered down.
    pub removed: Vec<InstanceId>,
    pub closed: Vec<InstanceId>,
    pub opened: Vec<InstanceId>,
    /// Instances requested from the provider.
    pub grow_requested: u32,
    /// Closed, idle instances handed to the provider for deletion.
    pub retired: Vec<InstanceId>,
}

impl PassReport {
    /// True when the pass changed nothing.
    pub fn is_noop(&self) -> bool {
        self.discovered.is_empty()
            && self.promoted.is_empty()
            && self.removed.is_empty()
            && self.closed.is_empty()
            && self.opened.is_empty()
            && self.grow_requested == 0
            && self.retired.is_empty()
    }
}

/// Result of a call to [`CapacityReconciler::reconcile`].
#[derive(Debug)]
pub enum PassOutcome {
    /// Another pass was running; nothing was done.
    Skipped,
    Completed(PassReport),
    /// The pass ended early. State transitions applied before the failure
    /// are kept; the next pass re-evaluates from scratch.
    Failed(ReconcileError),
}

/// Provider mutation decided while holding the records lock.
enum ProviderAction {
    None,
    Grow(u32),
    Shrink(Vec<InstanceId>),
}

/// Clears the in-progress flag when dropped.
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Reconciles the instance pool against its session load.
pub struct CapacityReconciler {
    provider: Arc<dyn InventoryProvider>,
    load: Arc<dyn LoadSource>,
    scaling: ScalingConfig,
    provider_timeout: Duration,
    /// Tracked instances: instance_id → record.
    records: Mutex<BTreeMap<InstanceId, InstanceRecord>>,
    in_progress: AtomicBool,
    wake: Notify,
}

impl CapacityReconciler {
    /// Create a reconciler. Nothing is tracked until the first pass lists
    /// the provider's inventory.
    pub fn new(
        provider: Arc<dyn InventoryProvider>,
        load: Arc<dyn LoadSource>,
        scaling: ScalingConfig,
    ) -> Self {
        Self {
            provider,
            load,
            scaling,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            records: Mutex::new(BTreeMap::new()),
            in_progress: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    /// Bound every provider call to `timeout`.
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// Copy of every tracked record, ordered by instance id.
    pub fn snapshot(&self) -> Vec<InstanceRecord> {
        self.lock_records().values().cloned().collect()
    }

    /// Whether a pass is currently running.
    pub fn is_reconciling(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Ask the run loop for a pass without waiting for the next tick.
    pub fn notify(&self) {
        self.wake.notify_one();
    }

    /// Run one pass in the background.
    pub fn spawn_reconcile(self: &Arc<Self>) -> JoinHandle<PassOutcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.reconcile().await })
    }

    /// Run one reconciliation pass.
    ///
    /// Returns `Skipped` immediately if another pass holds the guard.
    /// Errors are logged and returned in the outcome. The guard is
    /// released in every case.
    pub async fn reconcile(&self) -> PassOutcome {
        let Some(_guard) = PassGuard::try_acquire(&self.in_progress) else {
            debug!("reconciliation already in progress, skipping");
            return PassOutcome::Skipped;
        };

        match self.run_pass().await {
            Ok(report) => {
                if report.is_noop() {
                    debug!(target = report.target, active = report.active, "pool converged");
                } else {
                    info!(
                        target = report.target,
                        active = report.active,
                        discovered = report.discovered.len(),
                        removed = report.removed.len(),
                        closed = report.closed.len(),
                        opened = report.opened.len(),
                        grow = report.grow_requested,
                        retired = report.retired.len(),
                        "reconciliation pass completed"
                    );
                }
                PassOutcome::Completed(report)
            }
            Err(e) => {
                warn!(error = %e, "reconciliation pass failed");
                PassOutcome::Failed(e)
            }
        }
    }

    /// Reconcile on every tick and every [`notify`](Self::notify) until
    /// `shutdown` flips.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "reconciler started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.wake.notified() => {}
                _ = shutdown.changed() => {
                    info!("reconciler shutting down");
                    break;
                }
            }
            self.reconcile().await;
        }
    }

    // ── Pass ────────────────────────────────────────────────────────

    async fn run_pass(&self) -> ReconcileResult<PassReport> {
        let listed = self
            .call_provider("list", self.provider.list_instances())
            .await?;

        let mut report = PassReport::default();

        // The records lock is never held across a provider call.
        let action = {
            let mut records = self.lock_records();
            self.refresh_inventory(&mut records, listed, &mut report);
            self.refresh_load(&mut records);
            self.apply_transitions(&mut records, &mut report)
        };

        match action {
            ProviderAction::None => {}
            ProviderAction::Grow(count) => {
                info!(count, "requesting additional instances");
                self.call_provider("grow", self.provider.grow_by(count))
                    .await?;
            }
            ProviderAction::Shrink(ids) => {
                info!(ids = ?ids, "requesting instance deletion");
                self.call_provider("shrink", self.provider.shrink_by(ids))
                    .await?;
            }
        }

        Ok(report)
    }

    /// Track new instances, promote started ones, drop gone ones.
    fn refresh_inventory(
        &self,
        records: &mut BTreeMap<InstanceId, InstanceRecord>,
        listed: Vec<InstanceDescriptor>,
        report: &mut PassReport,
    ) {
        let mut seen: HashMap<InstanceId, PowerState> = HashMap::with_capacity(listed.len());

        for descriptor in listed {
            seen.insert(descriptor.id.clone(), descriptor.power_state);

            if let Some(record) = records.get_mut(&descriptor.id) {
                record.descriptor.power_state = descriptor.power_state;
                if matches!(record.state, InstanceState::Starting | InstanceState::Unknown)
                    && descriptor.power_state == PowerState::Running
                {
                    transition(record, InstanceState::Running);
                    self.set_accepting(&descriptor.id, true);
                    report.promoted.push(descriptor.id);
                }
                continue;
            }

            if descriptor.power_state.is_out_of_rotation() {
                continue;
            }

            let record = InstanceRecord::new(descriptor);
            let id = record.id().to_string();
            self.load.register_instance(&id);
            if !record.is_active() {
                self.set_accepting(&id, false);
            }
            debug!(
                instance = %id,
                state = %record.state,
                fault_domain = ?record.fault_domain(),
                "tracking new instance"
            );
            records.insert(id.clone(), record);
            report.discovered.push(id);
        }

        let gone: Vec<InstanceId> = records
            .keys()
            .filter(|id| seen.get(*id).is_none_or(|ps| ps.is_out_of_rotation()))
            .cloned()
            .collect();

        for id in gone {
            if let Some(mut record) = records.remove(&id) {
                transition(&mut record, InstanceState::Removed);
                self.forget_instance(&id);
                report.removed.push(id);
            }
        }
    }

    fn refresh_load(&self, records: &mut BTreeMap<InstanceId, InstanceRecord>) {
        for (id, record) in records.iter_mut() {
            record.load = self.load.sample_load(id);
        }
    }

    /// Size the pool and decide the provider call, if any.
    fn apply_transitions(
        &self,
        records: &mut BTreeMap<InstanceId, InstanceRecord>,
        report: &mut PassReport,
    ) -> ProviderAction {
        let total_load: u32 = records.values().map(|r| r.load).sum();
        let target = compute_target_count(records.len() as u32, total_load, &self.scaling);
        let mut active = records.values().filter(|r| r.is_active()).count() as u32;
        report.target = target;

        debug!(
            instances = records.len(),
            total_load,
            target,
            active,
            "computed target instance count"
        );

        if active > target {
            let to_close = select_to_close(records.values(), (active - target) as usize);
            for id in to_close {
                if let Some(record) = records.get_mut(&id) {
                    transition(record, InstanceState::Closing);
                    self.set_accepting(&id, false);
                    transition(record, InstanceState::Closed);
                    active -= 1;
                    report.closed.push(id);
                }
            }
        } else if active < target {
            let selection = select_to_open(records.values(), (target - active) as usize);
            for id in selection.ids {
                if let Some(record) = records.get_mut(&id) {
                    transition(record, InstanceState::Opening);
                    self.set_accepting(&id, true);
                    transition(record, InstanceState::Running);
                    active += 1;
                    report.opened.push(id);
                }
            }
        }
        report.active = active;

        if active < target {
            // Instances still booting will cover part of the gap.
            let pending = records
                .values()
                .filter(|r| r.state == InstanceState::Starting)
                .count() as u32;
            let shortfall = (target - active).saturating_sub(pending);
            if shortfall > 0 {
                report.grow_requested = shortfall;
                return ProviderAction::Grow(shortfall);
            }
            return ProviderAction::None;
        }

        let idle_closed: Vec<InstanceId> = records
            .values()
            .filter(|r| r.state == InstanceState::Closed && r.load == 0)
            .map(|r| r.id().to_string())
            .collect();

        let mut retired = Vec::with_capacity(idle_closed.len());
        for id in idle_closed {
            match self.load.deregister_instance(&id) {
                Ok(()) | Err(LoadError::UnknownInstance(_)) => {}
                Err(e) => {
                    warn!(instance = %id, error = %e, "closed instance not retired");
                    continue;
                }
            }
            if let Some(mut record) = records.remove(&id) {
                transition(&mut record, InstanceState::Removed);
            }
            retired.push(id);
        }

        if retired.is_empty() {
            return ProviderAction::None;
        }
        report.retired = retired.clone();
        ProviderAction::Shrink(retired)
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn lock_records(&self) -> MutexGuard<'_, BTreeMap<InstanceId, InstanceRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_accepting(&self, id: &str, accepting: bool) {
        if let Err(e) = self.load.set_accepting(id, accepting) {
            warn!(instance = %id, accepting, error = %e, "failed to update instance eligibility");
        }
    }

    /// Stop tracking an instance the provider no longer runs.
    fn forget_instance(&self, id: &str) {
        match self.load.deregister_instance(id) {
            Ok(()) | Err(LoadError::UnknownInstance(_)) => {}
            Err(LoadError::InvariantViolation { load, .. }) => {
                let dropped = self.load.evict_instance(id);
                warn!(
                    instance = %id,
                    load,
                    dropped = dropped.len(),
                    "instance disappeared with sessions bound"
                );
            }
            Err(e) => warn!(instance = %id, error = %e, "failed to deregister instance"),
        }
    }

    async fn call_provider<T>(
        &self,
        operation: &'static str,
        call: BoxFuture<'_, ProviderResult<T>>,
    ) -> ReconcileResult<T> {
        match tokio::time::timeout(self.provider_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ReconcileError::ProviderTimeout {
                operation,
                timeout: self.provider_timeout,
            }),
        }
    }
}

fn transition(record: &mut InstanceRecord, next: InstanceState) {
    debug_assert!(
        record.state.can_transition_to(next),
        "illegal transition {} -> {} for {}",
        record.state,
        next,
        record.id()
    );
    debug!(instance = %record.id(), from = %record.state, to = %next, "instance state transition");
    record.state = next;
}
