//! The load interface consumed by the capacity reconciler.

use scaleset_core::SessionId;

use crate::error::LoadResult;

/// Source of per-instance load and owner of the accepting flag.
///
/// The reconciler never writes load or eligibility directly; it goes
/// through these operations so the tracker stays the single writer.
pub trait LoadSource: Send + Sync {
    /// Current load of an instance. Unknown instances report 0.
    fn sample_load(&self, instance_id: &str) -> u32;

    /// Start tracking an instance: accepting, zero load.
    fn register_instance(&self, instance_id: &str);

    /// Stop tracking an instance that has no sessions bound.
    ///
    /// Fails with `InvariantViolation` when sessions are still bound.
    fn deregister_instance(&self, instance_id: &str) -> LoadResult<()>;

    /// Stop tracking an instance that is already gone, dropping its
    /// bindings. Returns the sessions that were dropped.
    fn evict_instance(&self, instance_id: &str) -> Vec<SessionId>;

    /// Toggle eligibility for future admissions.
    fn set_accepting(&self, instance_id: &str, accepting: bool) -> LoadResult<()>;
}
