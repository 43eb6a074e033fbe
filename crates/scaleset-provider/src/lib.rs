//! scaleset-provider — the inventory the reconciler drives.
//!
//! The provider is the source of truth for which instances exist and
//! their power state. The reconciler only ever lists instances, asks for
//! `count` more, or asks for specific ids to be removed.
//!
//! `SimulatedProvider` keeps the inventory in memory. It hands out
//! sequential ids and spreads new instances round-robin over fault and
//! update domains, which is enough to drive the reconciler end to end
//! without a cloud account.

pub mod error;
pub mod provider;
pub mod simulated;

pub use error::{ProviderError, ProviderResult};
pub use provider::{BoxFuture, InventoryProvider};
pub use simulated::SimulatedProvider;
