use std::collections::BTreeMap;

use lendsim_common::errors::ConfigError;

use crate::pool::{LendingPool, LendingPoolConfig};
use crate::records::EventInfo;

/// Owns named lending pools and steps each of them once per tick.
#[derive(Clone, Debug, Default)]
pub struct Protocol {
    pools: BTreeMap<String, LendingPool>,
}

impl Protocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_lending_pool(
        &mut self,
        config: LendingPoolConfig,
        fee_model: lendsim_common::fee::FeeModel,
        now: i64,
    ) -> Result<(), ConfigError> {
        if self.pools.contains_key(&config.name) {
            return Err(ConfigError::ExistingName(config.name.clone()));
        }
        if config.genesis_period < 0 || config.running_period <= 0 {
            return Err(ConfigError::InvalidPeriod);
        }
        if !(config.max_ltv > 0.0 && config.max_ltv <= 1.0) {
            return Err(ConfigError::InvalidMaxLtv);
        }
        if config.max_liquidity <= 0.0 {
            return Err(ConfigError::InvalidMaxLiquidity);
        }
        let name = config.name.clone();
        self.pools.insert(name, LendingPool::new(config, fee_model, now));
        Ok(())
    }

    pub fn get_lending_pool(&self, name: &str) -> Option<&LendingPool> {
        self.pools.get(name)
    }

    pub fn get_lending_pool_mut(&mut self, name: &str) -> Option<&mut LendingPool> {
        self.pools.get_mut(name)
    }

    pub fn get_lending_pools(&self) -> impl Iterator<Item = &LendingPool> {
        self.pools.values()
    }

    pub fn first_pool_name(&self) -> Option<&str> {
        self.pools.keys().next().map(String::as_str)
    }

    pub fn step(&mut self, now: i64, price: f64) -> Vec<EventInfo> {
        self.pools.values_mut().flat_map(|pool| pool.take_step(now, price)).collect()
    }
}

#[cfg(test)]
mod tests {
    use lendsim_common::fee::{AaveFeeModel, AaveParameters};

    use super::*;

    fn fee_model() -> lendsim_common::fee::FeeModel {
        lendsim_common::fee::FeeModel::Aave(AaveFeeModel::new(AaveParameters {
            optimal_utilization: 0.8,
            base_rate: 0.01,
            rate_slope_1: 0.04,
            rate_slope_2: 0.75,
        }))
    }

    fn config(name: &str) -> LendingPoolConfig {
        LendingPoolConfig {
            name: name.to_string(),
            max_ltv: 0.9,
            max_liquidity: 1_000.0,
            genesis_period: 10,
            running_period: 180,
            min_loan_amount: 1.0,
            min_loan_period: 1,
        }
    }

    #[test]
    fn rejects_duplicate_pool_names() {
        let mut protocol = Protocol::new();
        protocol.create_lending_pool(config("a"), fee_model(), 0).unwrap();
        let err = protocol.create_lending_pool(config("a"), fee_model(), 0).unwrap_err();
        assert_eq!(err, ConfigError::ExistingName("a".to_string()));
    }

    #[test]
    fn rejects_out_of_range_construction_args() {
        let mut protocol = Protocol::new();
        let mut bad = config("b");
        bad.max_ltv = 1.5;
        assert_eq!(
            protocol.create_lending_pool(bad, fee_model(), 0).unwrap_err(),
            ConfigError::InvalidMaxLtv
        );
    }
}
