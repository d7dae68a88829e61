//! Selector façade: holds a configured strategy name, resolves it lazily.
//!
//! Replaces the source's dynamic file-path module loading (see DESIGN.md)
//! with a statically compiled, name-keyed registry.

use parking_lot::RwLock;

use crate::cluster::Cluster;
use crate::pool::ResourcePool;
use crate::selection::{strategy_by_name, SelectionStrategy};
use crate::types::Requirements;

pub struct Selector {
    strategy_name: String,
    strategy: RwLock<Option<Box<dyn SelectionStrategy>>>,
}

impl Selector {
    pub fn new(strategy_name: impl Into<String>) -> Self {
        Self {
            strategy_name: strategy_name.into(),
            strategy: RwLock::new(None),
        }
    }

    /// Selects a cluster pair for `requirements`, instantiating the
    /// configured strategy on first use.
    ///
    /// Returns `None` if the configured strategy name is not registered —
    /// this is a configuration error the caller should have validated at
    /// startup, but the façade fails soft rather than panicking mid-pass.
    pub fn select(
        &self,
        pool: &ResourcePool,
        requirements: &Requirements,
    ) -> Option<(Option<Cluster>, Option<Cluster>)> {
        {
            let guard = self.strategy.read();
            if let Some(strategy) = guard.as_ref() {
                return Some(strategy.select(pool, requirements));
            }
        }

        let mut guard = self.strategy.write();
        if guard.is_none() {
            *guard = Some(strategy_by_name(&self.strategy_name)?);
        }
        Some(guard.as_ref().unwrap().select(pool, requirements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Cluster;

    fn pool_with_one_fitting() -> ResourcePool {
        let pool = ResourcePool::new();
        let cluster = Cluster::new(
            "a",
            "Nimbus",
            "host",
            vec!["x86".into()],
            vec!["pub".into()],
            vec![1024],
            1,
            4,
            20,
        );
        pool.reconfigure(vec![cluster], |_, _| {});
        pool
    }

    fn req() -> Requirements {
        Requirements {
            network: "pub".into(),
            cpu_arch: "x86".into(),
            memory: 512,
            cpu_cores: 1,
            storage: 5,
            ..Default::default()
        }
    }

    #[test]
    fn lazily_resolves_configured_strategy() {
        let selector = Selector::new("first-fit");
        let pool = pool_with_one_fitting();
        let (primary, _) = selector.select(&pool, &req()).unwrap();
        assert_eq!(primary.unwrap().name, "a");
    }

    #[test]
    fn unknown_strategy_name_fails_soft() {
        let selector = Selector::new("not-a-real-strategy");
        let pool = pool_with_one_fitting();
        assert!(selector.select(&pool, &req()).is_none());
    }
}
