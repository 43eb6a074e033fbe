//! Inventory provider interface.

use std::future::Future;
use std::pin::Pin;

use scaleset_core::{InstanceDescriptor, InstanceId};

use crate::error::ProviderResult;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source of truth for the instances in the pool.
///
/// Grow and shrink resolve once the provider has conclusively finished,
/// successfully or not. New instances are not guaranteed to show up in
/// the very next `list_instances`.
pub trait InventoryProvider: Send + Sync {
    /// Enumerate every instance with its current power state.
    fn list_instances(&self) -> BoxFuture<'_, ProviderResult<Vec<InstanceDescriptor>>>;

    /// Add `count` instances.
    fn grow_by(&self, count: u32) -> BoxFuture<'_, ProviderResult<()>>;

    /// Remove the given instances.
    fn shrink_by(&self, ids: Vec<InstanceId>) -> BoxFuture<'_, ProviderResult<()>>;
}
