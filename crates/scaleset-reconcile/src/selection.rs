//! Fault-domain aware selection of instances to close or open.
//!
//! Both directions use the same greedy step: count the remaining
//! candidates per fault domain, restrict to the domain(s) with the
//! highest count, take the one with the lowest load. Counts are
//! recomputed after every pick.

use std::collections::BTreeMap;

use scaleset_core::{DomainId, InstanceId, InstanceRecord, InstanceState};

/// Result of choosing closed instances to reopen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenSelection {
    /// Instances to reopen, in pick order.
    pub ids: Vec<InstanceId>,
    /// How many of the requested instances could not be found among the
    /// closed ones and have to be provisioned.
    pub shortfall: u32,
}

/// Choose `count` running instances to stop accepting sessions.
pub fn select_to_close<'a, I>(records: I, count: usize) -> Vec<InstanceId>
where
    I: IntoIterator<Item = &'a InstanceRecord>,
{
    let pool = records
        .into_iter()
        .filter(|r| r.state == InstanceState::Running)
        .collect();
    pick_balanced(pool, count)
}

/// Choose up to `count` closed instances to accept sessions again.
pub fn select_to_open<'a, I>(records: I, count: usize) -> OpenSelection
where
    I: IntoIterator<Item = &'a InstanceRecord>,
{
    let pool = records
        .into_iter()
        .filter(|r| r.state == InstanceState::Closed)
        .collect();
    let ids = pick_balanced(pool, count);
    let shortfall = (count - ids.len()) as u32;
    OpenSelection { ids, shortfall }
}

fn pick_balanced(mut pool: Vec<&InstanceRecord>, count: usize) -> Vec<InstanceId> {
    let mut picked = Vec::with_capacity(count.min(pool.len()));

    while picked.len() < count && !pool.is_empty() {
        let mut per_domain: BTreeMap<DomainId, usize> = BTreeMap::new();
        for record in &pool {
            *per_domain.entry(record.fault_domain()).or_insert(0) += 1;
        }
        let busiest = per_domain.values().copied().max().unwrap_or(0);

        let Some(idx) = pool
            .iter()
            .enumerate()
            .filter(|(_, r)| per_domain.get(&r.fault_domain()) == Some(&busiest))
            .min_by(|(_, a), (_, b)| a.load.cmp(&b.load).then_with(|| a.id().cmp(b.id())))
            .map(|(idx, _)| idx)
        else {
            break;
        };

        picked.push(pool.swap_remove(idx).id().to_string());
    }

    picked
}
