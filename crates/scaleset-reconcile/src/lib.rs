//! scaleset-reconcile — keeps the pool sized to its session load.
//!
//! One reconciliation pass:
//!
//! ```text
//! list instances      → track new ones, drop gone/stopped ones
//! sample load         → per-instance session counts from the tracker
//! target = min n' ≥ min_active such that n'·C − L ≥ min_free
//!
//! running > target    → close the excess (stop accepting sessions)
//! running < target    → reopen closed instances, then grow the provider
//! otherwise           → retire closed instances whose load reached zero
//! ```
//!
//! Closing and opening pick one instance at a time from the fault
//! domain that currently holds the most candidates, lowest load first,
//! so the remaining capacity stays spread across domains.
//!
//! Passes never overlap. A pass that finds another one running returns
//! immediately; the in-progress flag is held until the provider call of
//! the running pass has finished, successfully or not.

pub mod capacity;
pub mod error;
pub mod reconciler;
pub mod selection;

pub use capacity::compute_target_count;
pub use error::{ReconcileError, ReconcileResult};
pub use reconciler::{CapacityReconciler, PassOutcome, PassReport};
pub use selection::{OpenSelection, select_to_close, select_to_open};
