use rand::rngs::StdRng;

use crate::agents::Agent;
use crate::environment::Environment;
use crate::errors::EngineError;
use crate::protocol::Protocol;
use crate::records::{ActionInfo, EventInfo};
use crate::strategy::Strategy;

/// The whole mutable state of one run: environment, protocol, agent
/// population, strategy, and the single RNG every stochastic draw in the
/// run shares. Owning the RNG here (rather than splitting it between
/// `Environment` and `Strategy`) keeps the draw sequence a single,
/// deterministic stream from one seed.
pub struct SimulationState {
    pub tick: u64,
    pub now: i64,
    pub dt: i64,
    pub environment: Environment,
    pub protocol: Protocol,
    pub strategy: Strategy,
    pub agents: Vec<Agent>,
    pub rng: StdRng,
}

impl SimulationState {
    pub fn new(now: i64, dt: i64, environment: Environment, protocol: Protocol, strategy: Strategy, agents: Vec<Agent>, rng: StdRng) -> Self {
        Self {
            tick: 0,
            now,
            dt,
            environment,
            protocol,
            strategy,
            agents,
            rng,
        }
    }

    /// One tick: environment, then protocol, then strategy, then agents in
    /// priority order. Matches the source's fixed dispatch order exactly,
    /// since later stages observe earlier ones' effects within the same
    /// tick (an agent acting this tick sees this tick's freshly-stepped
    /// pool, not last tick's).
    pub fn take_step(&mut self) -> Result<(Vec<EventInfo>, Vec<ActionInfo>), EngineError> {
        self.now += self.dt;
        self.tick += 1;

        let mut events = self.environment.step(self.dt);
        events.extend(self.protocol.step(self.now, self.environment.get_price()));

        let pool_name = self.strategy.lending_pool().to_string();
        if let Some(pool) = self.protocol.get_lending_pool(&pool_name) {
            let is_new_cycle = pool.is_new_cycle;
            if is_new_cycle {
                self.agents.retain(|a| !matches!(a, Agent::Borrower(_)));
            }
            let fresh = self.strategy.update_agents(pool, self.now, self.dt, is_new_cycle, &mut self.rng);
            self.agents.extend(fresh);
        }

        self.agents.sort_by_key(Agent::priority);

        let mut actions = Vec::new();
        for agent in &mut self.agents {
            actions.extend(agent.act(&mut self.protocol, &self.environment, self.now));
        }

        Ok((events, actions))
    }
}

#[cfg(test)]
mod tests {
    use lendsim_common::fee::{AaveFeeModel, AaveParameters};
    use rand::SeedableRng;

    use super::*;
    use crate::agents::{FeeParameterUpdate, PoolManagerAgent};
    use crate::environment::HistoricalEnvironment;
    use crate::pool::LendingPoolConfig;
    use crate::strategy::{StrategyCommon, V1Strategy};
    use lendsim_common::distributions::SampledDistribution;

    fn degenerate(value: f64) -> SampledDistribution {
        SampledDistribution::Uniform { lower: value, upper: value }
    }

    fn state() -> SimulationState {
        let environment = Environment::Historical(HistoricalEnvironment {
            series: vec![(0, 100.0)],
            ..HistoricalEnvironment::new("BTC")
        });
        let protocol = Protocol::new();
        let fee_model = lendsim_common::fee::FeeModel::Aave(AaveFeeModel::new(AaveParameters {
            optimal_utilization: 0.8,
            base_rate: 0.01,
            rate_slope_1: 0.04,
            rate_slope_2: 0.75,
        }));
        let pool_config = LendingPoolConfig {
            name: "pool".to_string(),
            max_ltv: 0.9,
            max_liquidity: 1_000_000.0,
            genesis_period: 0,
            running_period: 30 * 86_400,
            min_loan_amount: 1.0,
            min_loan_period: 1,
        };
        let manager = PoolManagerAgent::new(pool_config, fee_model, FeeParameterUpdate::NoOp, 7 * 86_400, 0);
        let strategy = Strategy::V1(V1Strategy {
            common: StrategyCommon::new("pool", degenerate(10.0), degenerate(0.5), degenerate(0.0), degenerate(0.5), 3_600),
            utilization_parameter: 0.1,
        });
        SimulationState::new(
            0,
            3_600,
            environment,
            protocol,
            strategy,
            vec![Agent::PoolManager(manager)],
            StdRng::seed_from_u64(1),
        )
    }

    #[test]
    fn first_tick_creates_the_pool_before_any_borrower_acts() {
        let mut s = state();
        let (_, actions) = s.take_step().unwrap();
        assert!(actions.iter().any(|a| a.type_ == "create_lending_pool"));
        assert!(s.protocol.get_lending_pool("pool").is_some());
    }

    #[test]
    fn new_cycle_clears_stale_borrower_agents() {
        let mut s = state();
        s.take_step().unwrap();
        for _ in 0..(30 * 24) {
            s.take_step().unwrap();
        }
        let borrower_count = s.agents.iter().filter(|a| matches!(a, Agent::Borrower(_))).count();
        assert!(borrower_count <= 2);
    }
}
