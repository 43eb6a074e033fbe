//! In-memory inventory that simulates adding and deleting instances.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use scaleset_core::{InstanceDescriptor, InstanceId, PowerState, ScaleSetConfig};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{BoxFuture, InventoryProvider};

#[derive(Debug, Default)]
struct Inventory {
    instances: Vec<InstanceDescriptor>,
    next_id: u64,
    next_fault_domain: u32,
    next_update_domain: u32,
}

impl Inventory {
    fn add(&mut self, count: u32, fault_domains: u32, update_domains: u32) -> Vec<InstanceId> {
        let mut added = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let id = self.next_id.to_string();
            self.instances.push(InstanceDescriptor {
                id: id.clone(),
                name: Some(format!("vm-{id}")),
                power_state: PowerState::Running,
                fault_domain: Some(self.next_fault_domain),
                update_domain: Some(self.next_update_domain),
                private_ip: Some(format!("10.0.{}.{}", self.next_id / 250, self.next_id % 250 + 4)),
            });
            self.next_id += 1;
            self.next_fault_domain = (self.next_fault_domain + 1) % fault_domains;
            self.next_update_domain = (self.next_update_domain + 1) % update_domains;
            added.push(id);
        }
        added
    }
}

/// Simulated inventory provider.
///
/// New instances come up `Running` immediately (after the optional
/// provisioning delay), with fault and update domains assigned
/// round-robin.
#[derive(Debug)]
pub struct SimulatedProvider {
    inventory: Mutex<Inventory>,
    fault_domains: u32,
    update_domains: u32,
    provisioning_delay: Duration,
    /// When false every call fails with `Unavailable`.
    available: AtomicBool,
    grow_calls: AtomicU32,
    shrink_calls: AtomicU32,
}

impl SimulatedProvider {
    /// Create an empty inventory spreading over the given domain counts.
    pub fn new(fault_domains: u32, update_domains: u32) -> Self {
        Self {
            inventory: Mutex::new(Inventory::default()),
            fault_domains: fault_domains.max(1),
            update_domains: update_domains.max(1),
            provisioning_delay: Duration::ZERO,
            available: AtomicBool::new(true),
            grow_calls: AtomicU32::new(0),
            shrink_calls: AtomicU32::new(0),
        }
    }

    /// Build from configuration, seeded with the configured initial instances.
    pub fn from_config(config: &ScaleSetConfig) -> Self {
        Self::new(config.provider.fault_domains, config.provider.update_domains)
            .with_provisioning_delay(config.provider.provisioning_delay())
            .with_instances(config.initial_instances())
    }

    /// Seed the inventory with `count` running instances.
    pub fn with_instances(mut self, count: u32) -> Self {
        let (fd, ud) = (self.fault_domains, self.update_domains);
        self.inventory.get_mut().add(count, fd, ud);
        self
    }

    pub fn with_provisioning_delay(mut self, delay: Duration) -> Self {
        self.provisioning_delay = delay;
        self
    }

    /// Simulate an outage (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Change the reported power state of an instance.
    pub async fn set_power_state(&self, id: &str, power_state: PowerState) -> ProviderResult<()> {
        let mut inventory = self.inventory.lock().await;
        let instance = inventory
            .instances
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| ProviderError::InstanceNotFound(id.to_string()))?;
        instance.power_state = power_state;
        debug!(instance = %id, %power_state, "simulated power state change");
        Ok(())
    }

    /// Number of instances currently in the inventory.
    pub async fn instance_count(&self) -> usize {
        self.inventory.lock().await.instances.len()
    }

    /// Grow requests received so far, including failed ones.
    pub fn grow_calls(&self) -> u32 {
        self.grow_calls.load(Ordering::SeqCst)
    }

    /// Shrink requests received so far, including failed ones.
    pub fn shrink_calls(&self) -> u32 {
        self.shrink_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> ProviderResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::Unavailable("simulated outage".to_string()))
        }
    }
}

impl InventoryProvider for SimulatedProvider {
    fn list_instances(&self) -> BoxFuture<'_, ProviderResult<Vec<InstanceDescriptor>>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self.inventory.lock().await.instances.clone())
        })
    }

    fn grow_by(&self, count: u32) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async move {
            self.grow_calls.fetch_add(1, Ordering::SeqCst);
            self.check_available()?;
            if count == 0 {
                return Ok(());
            }

            if !self.provisioning_delay.is_zero() {
                tokio::time::sleep(self.provisioning_delay).await;
            }

            let added = self
                .inventory
                .lock()
                .await
                .add(count, self.fault_domains, self.update_domains);
            info!(count, ids = ?added, "simulated instances provisioned");
            Ok(())
        })
    }

    fn shrink_by(&self, ids: Vec<InstanceId>) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async move {
            self.shrink_calls.fetch_add(1, Ordering::SeqCst);
            self.check_available()?;

            let mut inventory = self.inventory.lock().await;
            let before = inventory.instances.len();
            inventory.instances.retain(|i| !ids.contains(&i.id));
            let removed = before - inventory.instances.len();
            info!(requested = ids.len(), removed, "simulated instances deleted");
            Ok(())
        })
    }
}
