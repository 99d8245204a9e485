use rand::rngs::StdRng;
use serde_json::Value;

use lendsim_common::distributions::SampledDistribution;
use lendsim_common::errors::ConfigError;
use lendsim_common::number::safe_divide;
use lendsim_common::wallet::Wallet;

use crate::agents::{Agent, BorrowerAgent, BorrowerPlan};
use crate::errors::EngineError;
use crate::pool::LendingPool;

/// Safety valve on the borrower-replenishment loop: the source has no hard
/// bound, but a pathological config (near-zero loan sizes against a large
/// pool) could otherwise spin indefinitely.
const MAX_BORROWERS_PER_CYCLE: usize = 10_000;

const KNOWN_DISTRIBUTIONS: &[&str] = &[
    "mock",
    "uniform",
    "normal",
    "truncated_normal",
    "truncated_inverse_normal",
    "lognormal",
    "truncated_lognormal",
    "triangular",
    "parabolic",
];

/// Sampling parameters shared by every strategy version: how a single
/// borrower's loan is drawn, independent of the cycle-level stopping rule.
#[derive(Clone, Debug)]
pub struct StrategyCommon {
    pub lending_pool: String,
    pub loan_size: SampledDistribution,
    pub ltv: SampledDistribution,
    pub start_factor: SampledDistribution,
    pub duration_factor: SampledDistribution,
    pub repay_margin: i64,
    next_borrower_id: u64,
}

impl StrategyCommon {
    pub fn new(
        lending_pool: impl Into<String>,
        loan_size: SampledDistribution,
        ltv: SampledDistribution,
        start_factor: SampledDistribution,
        duration_factor: SampledDistribution,
        repay_margin: i64,
    ) -> Self {
        Self {
            lending_pool: lending_pool.into(),
            loan_size,
            ltv,
            start_factor,
            duration_factor,
            repay_margin,
            next_borrower_id: 0,
        }
    }

    fn next_wallet(&mut self) -> Wallet {
        self.next_borrower_id += 1;
        Wallet::new(format!("{}-borrower-{}", self.lending_pool, self.next_borrower_id))
    }

    /// Samples one candidate loan for `pool` at `now`. `dt` is the
    /// simulation's tick-step duration, used to keep the sampled duration
    /// at least one tick long and clear of the cycle boundary.
    fn sample_plan(&mut self, pool: &LendingPool, now: i64, dt: i64, rng: &mut StdRng) -> BorrowerPlan {
        let start_factor = self.start_factor.sample(rng);
        let duration_factor = self.duration_factor.sample(rng);
        let loan_size = self.loan_size.sample(rng);
        let ltv_sample = self.ltv.sample(rng);

        let loan_start = now + (start_factor * pool.config.running_period as f64) as i64;
        let remaining = (pool.next_cycle_time - loan_start).max(dt);
        let loan_duration = (duration_factor * (remaining - 2 * dt) as f64) as i64 + dt;
        let loan_duration = loan_duration.max(dt);
        let ltv = ltv_sample.min(pool.config.max_ltv - 1e-9);

        BorrowerPlan {
            lending_pool: self.lending_pool.clone(),
            loan_size,
            loan_start,
            loan_duration,
            ltv,
            repay_margin: self.repay_margin,
        }
    }
}

#[derive(Clone, Debug)]
pub struct V1Strategy {
    pub common: StrategyCommon,
    pub utilization_parameter: f64,
}

#[derive(Clone, Debug)]
pub struct V2Strategy {
    pub common: StrategyCommon,
    pub borrower_demand_ratio: f64,
}

/// Regenerates a pool's borrower population once per cycle.
///
/// V1 targets a fraction of available liquidity: keep drawing borrowers
/// until their summed loan size would exceed `utilization_parameter *
/// available_amount`, then stop without adding the one that would have
/// crossed it. V2 targets a fraction of cycle-capacity instead, accumulating
/// each candidate's `(size / available) * (duration / running_period)`
/// against `borrower_demand_ratio` under the same stop-before-crossing rule.
#[derive(Clone, Debug)]
pub enum Strategy {
    V1(V1Strategy),
    V2(V2Strategy),
}

impl Strategy {
    /// Called once per tick. Returns a fresh borrower population when
    /// `is_new_cycle` is set; an empty vector otherwise. The caller is
    /// responsible for discarding the previous cycle's borrower agents.
    pub fn update_agents(&mut self, pool: &LendingPool, now: i64, dt: i64, is_new_cycle: bool, rng: &mut StdRng) -> Vec<Agent> {
        if !is_new_cycle {
            return Vec::new();
        }
        match self {
            Self::V1(s) => {
                let threshold = s.utilization_parameter * pool.available_amount;
                let mut cumulative = 0.0;
                let mut agents = Vec::new();
                for _ in 0..MAX_BORROWERS_PER_CYCLE {
                    let plan = s.common.sample_plan(pool, now, dt, rng);
                    if cumulative + plan.loan_size > threshold {
                        break;
                    }
                    cumulative += plan.loan_size;
                    let wallet = s.common.next_wallet();
                    agents.push(Agent::Borrower(BorrowerAgent::new(wallet, plan)));
                }
                agents
            }
            Self::V2(s) => {
                let mut cumulative = 0.0;
                let mut agents = Vec::new();
                for _ in 0..MAX_BORROWERS_PER_CYCLE {
                    let plan = s.common.sample_plan(pool, now, dt, rng);
                    let marginal = safe_divide(plan.loan_size, pool.available_amount)
                        * safe_divide(plan.loan_duration as f64, pool.config.running_period as f64);
                    if cumulative + marginal > s.borrower_demand_ratio {
                        break;
                    }
                    cumulative += marginal;
                    let wallet = s.common.next_wallet();
                    agents.push(Agent::Borrower(BorrowerAgent::new(wallet, plan)));
                }
                agents
            }
        }
    }

    pub fn lending_pool(&self) -> &str {
        match self {
            Self::V1(s) => &s.common.lending_pool,
            Self::V2(s) => &s.common.lending_pool,
        }
    }
}

fn dist_field(value: &Value, field: &str) -> Result<SampledDistribution, EngineError> {
    let node = value
        .get(field)
        .ok_or_else(|| EngineError::Config(ConfigError::MissingField(field.to_string())))?;
    let name = node
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::Config(ConfigError::MissingField(format!("{field}.name"))))?;
    if !KNOWN_DISTRIBUTIONS.contains(&name) {
        return Err(EngineError::Config(ConfigError::DistributionNotFound(name.to_string())));
    }
    let mut stripped = node.clone();
    if let Some(obj) = stripped.as_object_mut() {
        obj.remove("type");
    }
    serde_json::from_value(stripped).map_err(|source| EngineError::Json {
        context: format!("strategy field '{field}'"),
        source,
    })
}

fn string_field(value: &Value, field: &str) -> Result<String, EngineError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| EngineError::Config(ConfigError::MissingField(field.to_string())))
}

fn number_field(value: &Value, field: &str) -> Result<f64, EngineError> {
    value
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| EngineError::Config(ConfigError::MissingField(field.to_string())))
}

fn int_field(value: &Value, field: &str) -> Result<i64, EngineError> {
    value
        .get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| EngineError::Config(ConfigError::MissingField(field.to_string())))
}

/// Parses a strategy config file's JSON text into a [`Strategy`]. Each
/// distribution node is expected in the shape `{"type": "dist", "name":
/// ..., "params": {...}}`; the `"type"` tag is stripped before delegating
/// to [`SampledDistribution`]'s own tagged deserialization, and an
/// unrecognized `name` is rejected here rather than deferred to runtime.
pub fn parse_strategy_config(json_text: &str) -> Result<Strategy, EngineError> {
    let root: Value = serde_json::from_str(json_text).map_err(|source| EngineError::Json {
        context: "strategy config".to_string(),
        source,
    })?;

    let version = string_field(&root, "version")?;
    let lending_pool = string_field(&root, "lending_pool")?;
    let loan_size = dist_field(&root, "loan_size")?;
    let ltv = dist_field(&root, "ltv")?;
    let start_factor = dist_field(&root, "start_factor")?;
    let duration_factor = dist_field(&root, "duration_factor")?;
    let repay_margin = int_field(&root, "repay_margin")?;

    let common = StrategyCommon::new(lending_pool, loan_size, ltv, start_factor, duration_factor, repay_margin);

    match version.as_str() {
        "v1" => Ok(Strategy::V1(V1Strategy {
            utilization_parameter: number_field(&root, "utilization_parameter")?,
            common,
        })),
        "v2" => Ok(Strategy::V2(V2Strategy {
            borrower_demand_ratio: number_field(&root, "borrower_demand_ratio")?,
            common,
        })),
        other => Err(EngineError::Config(ConfigError::MissingField(format!("unsupported strategy version '{other}'")))),
    }
}

#[cfg(test)]
mod tests {
    use lendsim_common::fee::{AaveFeeModel, AaveParameters};
    use rand::SeedableRng;

    use super::*;
    use crate::pool::LendingPoolConfig;

    fn pool() -> LendingPool {
        let fee_model = lendsim_common::fee::FeeModel::Aave(AaveFeeModel::new(AaveParameters {
            optimal_utilization: 0.8,
            base_rate: 0.01,
            rate_slope_1: 0.04,
            rate_slope_2: 0.75,
        }));
        let config = LendingPoolConfig {
            name: "pool".to_string(),
            max_ltv: 0.9,
            max_liquidity: 1_000_000.0,
            genesis_period: 0,
            running_period: 30 * 86_400,
            min_loan_amount: 1.0,
            min_loan_period: 1,
        };
        let mut p = LendingPool::new(config, fee_model, 0);
        p.available_amount = 1_000.0;
        p.total_deposits = 1_000.0;
        p
    }

    fn common() -> StrategyCommon {
        StrategyCommon::new(
            "pool",
            SampledDistribution::Uniform { lower: 50.0, upper: 50.0 },
            SampledDistribution::Uniform { lower: 0.5, upper: 0.5 },
            SampledDistribution::Uniform { lower: 0.0, upper: 0.0 },
            SampledDistribution::Uniform { lower: 0.5, upper: 0.5 },
            3_600,
        )
    }

    #[test]
    fn v1_stops_before_exceeding_the_utilization_target() {
        let pool = pool();
        let mut strategy = Strategy::V1(V1Strategy {
            common: common(),
            utilization_parameter: 0.12,
        });
        let mut rng = StdRng::seed_from_u64(1);
        let agents = strategy.update_agents(&pool, 0, 3_600, true, &mut rng);
        assert_eq!(agents.len(), 2);
    }

    #[test]
    fn v2_stops_before_exceeding_the_demand_ratio() {
        let pool = pool();
        let mut strategy = Strategy::V2(V2Strategy {
            common: common(),
            borrower_demand_ratio: 0.2,
        });
        let mut rng = StdRng::seed_from_u64(2);
        let agents = strategy.update_agents(&pool, 0, 3_600, true, &mut rng);
        assert!(!agents.is_empty());
        // every sampled plan is identical here (degenerate uniform dists), so the
        // loan duration is always exactly one tick: start_factor=0 collapses
        // `remaining` to `dt`, and duration_factor=0.5 over a zero-width window
        // still floors to `dt`.
        let marginal_each = safe_divide(50.0, 1_000.0) * safe_divide(3_600.0, pool.config.running_period as f64);
        assert!(agents.len() as f64 * marginal_each <= 0.2 + 1e-9);
        assert!((agents.len() as f64 + 1.0) * marginal_each > 0.2 - 1e-9);
    }

    #[test]
    fn no_cycle_no_borrowers() {
        let pool = pool();
        let mut strategy = Strategy::V1(V1Strategy {
            common: common(),
            utilization_parameter: 0.5,
        });
        let mut rng = StdRng::seed_from_u64(3);
        assert!(strategy.update_agents(&pool, 0, 3_600, false, &mut rng).is_empty());
    }

    #[test]
    fn rejects_unknown_distribution_name() {
        let json = r#"{
            "version": "v1",
            "lending_pool": "pool",
            "loan_size": {"type": "dist", "name": "bogus", "params": {}},
            "ltv": {"type": "dist", "name": "uniform", "params": {"lower": 0.1, "upper": 0.2}},
            "start_factor": {"type": "dist", "name": "uniform", "params": {"lower": 0.0, "upper": 0.1}},
            "duration_factor": {"type": "dist", "name": "uniform", "params": {"lower": 0.1, "upper": 0.9}},
            "repay_margin": 3600,
            "utilization_parameter": 0.5
        }"#;
        let err = parse_strategy_config(json).unwrap_err();
        assert!(matches!(err, EngineError::Config(ConfigError::DistributionNotFound(_))));
    }

    #[test]
    fn parses_a_well_formed_v2_config() {
        let json = r#"{
            "version": "v2",
            "lending_pool": "pool",
            "loan_size": {"type": "dist", "name": "uniform", "params": {"lower": 10.0, "upper": 100.0}},
            "ltv": {"type": "dist", "name": "uniform", "params": {"lower": 0.1, "upper": 0.5}},
            "start_factor": {"type": "dist", "name": "uniform", "params": {"lower": 0.0, "upper": 0.1}},
            "duration_factor": {"type": "dist", "name": "uniform", "params": {"lower": 0.1, "upper": 0.9}},
            "repay_margin": 3600,
            "borrower_demand_ratio": 0.3
        }"#;
        let strategy = parse_strategy_config(json).unwrap();
        assert!(matches!(strategy, Strategy::V2(_)));
        assert_eq!(strategy.lending_pool(), "pool");
    }
}
