use std::sync::{Arc, Mutex, PoisonError};

use anyhow::ensure;
use loadtide_config::{Arguments, Node};
use loadtide_types::Pool;

/// A pool with a fixed supply and fixed usage figures.
///
/// Demand is recorded but never changes the supply, which makes the pool
/// useful as a stand-in for sites that cannot be scaled.
#[derive(Debug)]
pub struct StaticPool {
    supply: f64,
    utilisation: f64,
    consumption: f64,
    demand: Mutex<f64>,
}

impl StaticPool {
    pub fn new(supply: f64, utilisation: f64, consumption: f64) -> anyhow::Result<Self> {
        ensure!(supply >= 0.0, "supply must not be negative, got {supply}");
        for (name, fraction) in [("utilisation", utilisation), ("consumption", consumption)] {
            ensure!((0.0..=1.0).contains(&fraction), "{name} must be within [0, 1], got {fraction}");
        }
        Ok(Self {
            supply,
            utilisation,
            consumption,
            demand: Mutex::new(supply),
        })
    }

    /// Factory binding `(supply, utilisation=1.0, consumption=1.0)`.
    pub fn construct(mut arguments: Arguments) -> anyhow::Result<Node> {
        let supply: f64 = arguments.required(0, "supply")?;
        let utilisation = arguments.optional(1, "utilisation")?.unwrap_or(1.0);
        let consumption = arguments.optional(2, "consumption")?.unwrap_or(1.0);
        arguments.finish()?;
        let pool: Arc<dyn Pool> = Arc::new(Self::new(supply, utilisation, consumption)?);
        Ok(Node::object(pool))
    }
}

impl Pool for StaticPool {
    fn supply(&self) -> f64 {
        self.supply
    }

    fn demand(&self) -> f64 {
        *self.demand.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_demand(&self, value: f64) {
        *self.demand.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }

    fn utilisation(&self) -> f64 {
        self.utilisation
    }

    fn consumption(&self) -> f64 {
        self.consumption
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadtide_config::Mapping;

    #[test]
    fn demand_starts_at_supply_and_is_recorded() {
        let pool = StaticPool::new(12.0, 0.5, 0.75).expect("pool");
        assert_eq!(pool.demand(), 12.0);

        pool.set_demand(3.0);

        assert_eq!(pool.demand(), 3.0);
        assert_eq!(pool.supply(), 12.0);
    }

    #[test]
    fn factory_applies_defaults_and_validates() {
        let node = StaticPool::construct(Arguments::new(vec![Node::from(4_i64)], Mapping::new())).expect("construct");
        let pool = node.as_object::<Arc<dyn Pool>>().expect("a pool");
        assert_eq!((pool.supply(), pool.utilisation(), pool.consumption()), (4.0, 1.0, 1.0));

        let mut named = Mapping::new();
        named.insert("utilisation".to_string(), Node::from(1.5));
        let error = StaticPool::construct(Arguments::new(vec![Node::from(4_i64)], named)).expect_err("out of range");
        assert!(error.to_string().contains("utilisation must be within [0, 1]"), "unexpected: {error}");
    }
}
