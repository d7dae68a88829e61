//! Pluggable cluster-selection policies.

use crate::cluster::Cluster;
use crate::pool::ResourcePool;
use crate::types::Requirements;

/// A stateless policy that picks a `(primary, secondary)` cluster pair for
/// a job's requirements. Implementations must not mutate the pool.
pub trait SelectionStrategy: Send + Sync {
    fn select(
        &self,
        pool: &ResourcePool,
        requirements: &Requirements,
    ) -> (Option<Cluster>, Option<Cluster>);
}

/// Walks the pool in insertion order, returns the first fitting cluster.
/// `secondary` is always absent.
pub struct FirstFit;

impl SelectionStrategy for FirstFit {
    fn select(
        &self,
        pool: &ResourcePool,
        requirements: &Requirements,
    ) -> (Option<Cluster>, Option<Cluster>) {
        let fitting = pool.fitting_clusters(requirements);
        (fitting.into_iter().next(), None)
    }
}

/// Returns the two fitting clusters with the fewest live VMs, ascending.
/// Ties break by pool iteration order (the first one seen wins a tie).
pub struct BalancedFit;

impl SelectionStrategy for BalancedFit {
    fn select(
        &self,
        pool: &ResourcePool,
        requirements: &Requirements,
    ) -> (Option<Cluster>, Option<Cluster>) {
        let fitting = pool.fitting_clusters(requirements);
        balanced_pick(fitting)
    }
}

/// Seed the two slots with the first two candidates, then scan the
/// remainder maintaining `num_vms(primary) <= num_vms(secondary)` in a
/// single linear pass.
fn balanced_pick(fitting: Vec<Cluster>) -> (Option<Cluster>, Option<Cluster>) {
    let mut iter = fitting.into_iter();
    let first = match iter.next() {
        Some(c) => c,
        None => return (None, None),
    };
    let second = match iter.next() {
        Some(c) => c,
        None => return (Some(first), None),
    };

    let (mut primary, mut secondary) = if first.num_vms() <= second.num_vms() {
        (first, second)
    } else {
        (second, first)
    };

    for candidate in iter {
        if candidate.num_vms() < primary.num_vms() {
            secondary = std::mem::replace(&mut primary, candidate);
        } else if candidate.num_vms() < secondary.num_vms() {
            secondary = candidate;
        }
    }

    (Some(primary), Some(secondary))
}

/// Resolves a strategy by its configured name.
pub fn strategy_by_name(name: &str) -> Option<Box<dyn SelectionStrategy>> {
    match name {
        "first-fit" => Some(Box::new(FirstFit)),
        "balanced-fit" => Some(Box::new(BalancedFit)),
        _ => None,
    }
}
