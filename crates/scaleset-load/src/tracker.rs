//! Session-based load tracker.
//!
//! A fixed number of sessions (`capacity`) can be bound to each instance.
//! Admission is best-fit: the accepting instance with the highest load
//! below capacity receives the session.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};
use uuid::Uuid;

use scaleset_core::{InstanceId, SessionId, SessionRecord};

use crate::error::{LoadError, LoadResult};
use crate::source::LoadSource;

/// Load state of one instance.
#[derive(Debug)]
struct InstanceLoad {
    sessions: HashSet<SessionId>,
    accepting: bool,
}

impl InstanceLoad {
    fn new() -> Self {
        Self {
            sessions: HashSet::new(),
            accepting: true,
        }
    }

    fn load(&self) -> u32 {
        self.sessions.len() as u32
    }
}

#[derive(Debug, Default)]
struct TrackerInner {
    /// Ordered so that ties in admission resolve the same way every time.
    instances: BTreeMap<InstanceId, InstanceLoad>,
    sessions: HashMap<SessionId, InstanceId>,
}

/// Tracks sessions per instance and admits new ones.
///
/// All methods take `&self`; the tracker can be shared behind an `Arc`
/// between request handlers and the reconciler.
#[derive(Debug)]
pub struct LoadTracker {
    capacity: u32,
    inner: Mutex<TrackerInner>,
}

impl LoadTracker {
    /// Create a tracker allowing `capacity` sessions per instance.
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            inner: Mutex::new(TrackerInner::default()),
        }
    }

    /// Sessions allowed per instance.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        // Both maps are updated together before any guard is dropped.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a new session onto the fullest accepting instance with room.
    pub fn admit(&self) -> LoadResult<SessionRecord> {
        let mut inner = self.lock();

        let mut best: Option<(&InstanceId, u32)> = None;
        for (id, instance) in &inner.instances {
            let load = instance.load();
            if !instance.accepting || load >= self.capacity {
                continue;
            }
            if best.is_none_or(|(_, best_load)| load > best_load) {
                best = Some((id, load));
            }
        }

        let Some((instance_id, _)) = best else {
            debug!(capacity = self.capacity, "session rejected, no capacity");
            return Err(LoadError::InsufficientCapacity {
                capacity: self.capacity,
            });
        };
        let instance_id = instance_id.clone();

        let session_id = Uuid::new_v4();
        if let Some(instance) = inner.instances.get_mut(&instance_id) {
            instance.sessions.insert(session_id);
        }
        inner.sessions.insert(session_id, instance_id.clone());

        debug!(session = %session_id, instance = %instance_id, "session admitted");
        Ok(SessionRecord {
            session_id,
            instance_id,
        })
    }

    /// Release a session and free its slot.
    pub fn release(&self, session_id: SessionId) -> LoadResult<()> {
        let mut inner = self.lock();

        let instance_id = inner
            .sessions
            .remove(&session_id)
            .ok_or(LoadError::UnknownSession(session_id))?;

        if let Some(instance) = inner.instances.get_mut(&instance_id) {
            instance.sessions.remove(&session_id);
        }

        debug!(session = %session_id, instance = %instance_id, "session released");
        Ok(())
    }

    /// Instance a session is bound to.
    pub fn instance_of(&self, session_id: SessionId) -> Option<InstanceId> {
        self.lock().sessions.get(&session_id).cloned()
    }

    /// Whether the instance accepts new sessions. `None` if unknown.
    pub fn is_accepting(&self, instance_id: &str) -> Option<bool> {
        self.lock().instances.get(instance_id).map(|i| i.accepting)
    }

    /// Number of tracked instances.
    pub fn instance_count(&self) -> usize {
        self.lock().instances.len()
    }

    /// Number of live sessions across all instances.
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Consistent view of every instance's load.
    pub fn loads(&self) -> BTreeMap<InstanceId, u32> {
        self.lock()
            .instances
            .iter()
            .map(|(id, instance)| (id.clone(), instance.load()))
            .collect()
    }
}

impl LoadSource for LoadTracker {
    fn sample_load(&self, instance_id: &str) -> u32 {
        // Not known yet means no load yet.
        self.lock()
            .instances
            .get(instance_id)
            .map_or(0, InstanceLoad::load)
    }

    fn register_instance(&self, instance_id: &str) {
        let mut inner = self.lock();
        if inner.instances.contains_key(instance_id) {
            return;
        }
        inner
            .instances
            .insert(instance_id.to_string(), InstanceLoad::new());
        debug!(instance = %instance_id, "instance registered");
    }

    fn deregister_instance(&self, instance_id: &str) -> LoadResult<()> {
        let mut inner = self.lock();

        let load = inner
            .instances
            .get(instance_id)
            .ok_or_else(|| LoadError::UnknownInstance(instance_id.to_string()))?
            .load();
        if load > 0 {
            return Err(LoadError::InvariantViolation {
                instance: instance_id.to_string(),
                load,
            });
        }

        inner.instances.remove(instance_id);
        debug!(instance = %instance_id, "instance deregistered");
        Ok(())
    }

    fn evict_instance(&self, instance_id: &str) -> Vec<SessionId> {
        let mut inner = self.lock();

        let Some(instance) = inner.instances.remove(instance_id) else {
            return Vec::new();
        };
        let dropped: Vec<SessionId> = instance.sessions.into_iter().collect();
        for session_id in &dropped {
            inner.sessions.remove(session_id);
        }

        if !dropped.is_empty() {
            warn!(
                instance = %instance_id,
                sessions = dropped.len(),
                "instance evicted with sessions bound"
            );
        }
        dropped
    }

    fn set_accepting(&self, instance_id: &str, accepting: bool) -> LoadResult<()> {
        let mut inner = self.lock();
        let instance = inner
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| LoadError::UnknownInstance(instance_id.to_string()))?;
        instance.accepting = accepting;
        debug!(instance = %instance_id, accepting, "instance eligibility changed");
        Ok(())
    }
}
