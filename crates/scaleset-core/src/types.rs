//! Domain types shared by the load tracker, the inventory provider and
//! the capacity reconciler.
//!
//! The provider describes instances with `InstanceDescriptor`. The
//! reconciler wraps each one in an `InstanceRecord` that carries its own
//! lifecycle tag (`InstanceState`) and the last sampled load.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a physical instance, as reported by the provider.
pub type InstanceId = String;

/// Identifier of an admitted session.
pub type SessionId = Uuid;

/// Placement grouping key. `None` means the provider did not report one.
pub type DomainId = Option<u32>;

// ── Provider view ──────────────────────────────────────────────────

/// Run state of an instance as last reported by the provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    Running,
    Starting,
    Stopping,
    Stopped,
    Deallocating,
    Deallocated,
    #[default]
    Unknown,
}

impl PowerState {
    /// True when the instance is (being) taken out of rotation and must
    /// no longer be tracked.
    pub fn is_out_of_rotation(self) -> bool {
        matches!(
            self,
            PowerState::Stopping
                | PowerState::Stopped
                | PowerState::Deallocating
                | PowerState::Deallocated
        )
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PowerState::Running => "running",
            PowerState::Starting => "starting",
            PowerState::Stopping => "stopping",
            PowerState::Stopped => "stopped",
            PowerState::Deallocating => "deallocating",
            PowerState::Deallocated => "deallocated",
            PowerState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One instance as enumerated by the inventory provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceDescriptor {
    pub id: InstanceId,
    /// Human-readable name, if the provider has one.
    #[serde(default)]
    pub name: Option<String>,
    pub power_state: PowerState,
    #[serde(default)]
    pub fault_domain: Option<u32>,
    #[serde(default)]
    pub update_domain: Option<u32>,
    /// Address a routing layer would hand to clients.
    #[serde(default)]
    pub private_ip: Option<String>,
}

impl InstanceDescriptor {
    /// Descriptor with only an id and a power state.
    pub fn new(id: impl Into<InstanceId>, power_state: PowerState) -> Self {
        Self {
            id: id.into(),
            name: None,
            power_state,
            fault_domain: None,
            update_domain: None,
            private_ip: None,
        }
    }

    pub fn with_fault_domain(mut self, fault_domain: u32) -> Self {
        self.fault_domain = Some(fault_domain);
        self
    }

    pub fn with_update_domain(mut self, update_domain: u32) -> Self {
        self.update_domain = Some(update_domain);
        self
    }
}

// ── Reconciler view ────────────────────────────────────────────────

/// Lifecycle tag owned by the reconciler.
///
/// ```text
/// Starting → Running ⇄ { Closing → Closed → Opening → Running }
/// any non-terminal state → Removed
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Starting,
    /// Accepting new sessions.
    Running,
    /// Marked to stop accepting, awaiting the tracker.
    Closing,
    /// Not accepting; may still hold sessions admitted earlier.
    Closed,
    /// Marked to accept again, awaiting the tracker.
    Opening,
    Removed,
    Unknown,
}

impl InstanceState {
    /// Initial state for an instance first seen in the given power state.
    pub fn from_power_state(power_state: PowerState) -> Self {
        match power_state {
            PowerState::Running => InstanceState::Running,
            PowerState::Starting => InstanceState::Starting,
            PowerState::Unknown => InstanceState::Unknown,
            PowerState::Stopping
            | PowerState::Stopped
            | PowerState::Deallocating
            | PowerState::Deallocated => InstanceState::Removed,
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: InstanceState) -> bool {
        use InstanceState::*;
        match (self, next) {
            (Removed, _) => false,
            (_, Removed) => true,
            (Starting | Unknown, Running) => true,
            (Running, Closing) => true,
            (Closing, Closed) => true,
            (Closed, Opening) => true,
            (Opening, Running) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InstanceState::Starting => "starting",
            InstanceState::Running => "running",
            InstanceState::Closing => "closing",
            InstanceState::Closed => "closed",
            InstanceState::Opening => "opening",
            InstanceState::Removed => "removed",
            InstanceState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A tracked instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceRecord {
    pub descriptor: InstanceDescriptor,
    pub state: InstanceState,
    /// Last sampled session count.
    pub load: u32,
}

impl InstanceRecord {
    pub fn new(descriptor: InstanceDescriptor) -> Self {
        let state = InstanceState::from_power_state(descriptor.power_state);
        Self {
            descriptor,
            state,
            load: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn fault_domain(&self) -> DomainId {
        self.descriptor.fault_domain
    }

    pub fn update_domain(&self) -> DomainId {
        self.descriptor.update_domain
    }

    pub fn power_state(&self) -> PowerState {
        self.descriptor.power_state
    }

    pub fn is_active(&self) -> bool {
        self.state == InstanceState::Running
    }
}

// ── Sessions ───────────────────────────────────────────────────────

/// A session admitted by the load tracker, bound to one instance for
/// its whole lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub instance_id: InstanceId,
}
