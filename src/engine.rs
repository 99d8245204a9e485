use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;

use lendsim_common::fee::FeeModel;
use lendsim_common::wallet::Wallet;

use crate::agents::{Agent, FeeParameterUpdate, LenderAgent, PoolManagerAgent};
use crate::environment::{Environment, HistoricalEnvironment};
use crate::errors::EngineError;
use crate::metrics::{CustomEventRecord, EndMetrics, Metrics, StepMetrics};
use crate::pool::LendingPoolConfig;
use crate::protocol::Protocol;
use crate::state::SimulationState;
use crate::strategy::parse_strategy_config;

/// Everything one run needs besides its seed: where the strategy file and
/// price cache live, the pool/fee-model/lender setup, and the run's time
/// window.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub strategy_path: PathBuf,
    pub results_dir: PathBuf,
    pub run_name: String,
    pub base_seed: u64,
    pub run_count: u32,
    pub start_time: i64,
    pub end_time: i64,
    pub tick_step_seconds: i64,
    pub lending_pool: LendingPoolConfig,
    pub fee_model: FeeModel,
    pub symbol: String,
    pub price_data_dir: PathBuf,
    pub lender_amount: f64,
    pub parameter_update_period: i64,
}

/// The full set of artifacts one completed run produces.
#[derive(Debug)]
pub struct RunOutcome {
    pub seed: u64,
    pub step_metrics: Vec<StepMetrics>,
    pub custom_events: Vec<CustomEventRecord>,
    pub end_metrics: Vec<EndMetrics>,
}

pub struct SimulationEngine;

impl SimulationEngine {
    /// Runs one simulation end to end: loads price data, builds the pool
    /// manager/lender/strategy from `config`, then steps the tick loop from
    /// `start_time` to `end_time`.
    pub fn run_simulation(config: &RunConfig, seed: u64) -> Result<RunOutcome, EngineError> {
        let mut rng = StdRng::seed_from_u64(seed);

        // Parse the strategy file before touching the price cache, so a
        // malformed config fails fast instead of after a network round trip.
        let strategy_text = std::fs::read_to_string(&config.strategy_path).map_err(|source| EngineError::Io {
            path: config.strategy_path.display().to_string(),
            source,
        })?;
        let strategy = parse_strategy_config(&strategy_text)?;

        let mut environment = Environment::Historical(HistoricalEnvironment::with_data_dir(config.symbol.clone(), config.price_data_dir.clone()));
        environment.load_data_until(config.end_time, &mut rng)?;
        environment.set_time(config.start_time);

        let protocol = Protocol::new();
        let manager = PoolManagerAgent::new(
            config.lending_pool.clone(),
            config.fee_model.clone(),
            FeeParameterUpdate::NoOp,
            config.parameter_update_period,
            config.start_time,
        );
        let lender = LenderAgent::new(Wallet::with_balances("lender", config.lender_amount, 0.0), config.lender_amount);

        let mut state = SimulationState::new(
            config.start_time,
            config.tick_step_seconds,
            environment,
            protocol,
            strategy,
            vec![Agent::PoolManager(manager), Agent::Lender(lender)],
            rng,
        );

        let mut metrics = Metrics::new();
        let mut step_metrics = Vec::new();
        let mut custom_events = Vec::new();

        let total_ticks = ((config.end_time - config.start_time) / config.tick_step_seconds).max(0);
        for _ in 0..total_ticks {
            let (events, _actions) = state.take_step()?;
            let price = state.environment.get_price();
            step_metrics.extend(metrics.by_step(&state.protocol, state.tick, state.now, price));
            custom_events.extend(metrics.custom_events(&events));
        }

        Ok(RunOutcome {
            seed,
            step_metrics,
            custom_events,
            end_metrics: metrics.end_of_simulation(),
        })
    }

    /// Runs `config.run_count` independent simulations, one per seed
    /// `base_seed * (i + 1)`. Each run is sequential and fully isolated; a
    /// failure is logged and skipped rather than aborting the batch.
    pub fn run_simulations(config: &RunConfig) -> Vec<(u64, Result<RunOutcome, EngineError>)> {
        (0..config.run_count.max(1))
            .map(|i| {
                let seed = config.base_seed * (i as u64 + 1);
                let outcome = Self::run_simulation(config, seed);
                if let Err(err) = &outcome {
                    tracing::error!(seed, error = %err, "simulation run failed");
                }
                (seed, outcome)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use lendsim_common::fee::{AaveFeeModel, AaveParameters};

    use super::*;

    fn config(strategy_path: PathBuf, price_data_dir: PathBuf) -> RunConfig {
        RunConfig {
            strategy_path,
            results_dir: PathBuf::from("simlogs"),
            run_name: "testrun".to_string(),
            base_seed: 7,
            run_count: 1,
            start_time: 0,
            end_time: 3 * 3_600,
            tick_step_seconds: 3_600,
            lending_pool: LendingPoolConfig {
                name: "pool".to_string(),
                max_ltv: 0.9,
                max_liquidity: 1_000_000.0,
                genesis_period: 0,
                running_period: 30 * 86_400,
                min_loan_amount: 1.0,
                min_loan_period: 1,
            },
            fee_model: FeeModel::Aave(AaveFeeModel::new(AaveParameters {
                optimal_utilization: 0.8,
                base_rate: 0.01,
                rate_slope_1: 0.04,
                rate_slope_2: 0.75,
            })),
            symbol: "BTC".to_string(),
            price_data_dir,
            lender_amount: 1_000.0,
            parameter_update_period: 7 * 86_400,
        }
    }

    fn write_strategy_fixture(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("strategy.json");
        std::fs::write(
            &path,
            r#"{
                "version": "v1",
                "lending_pool": "pool",
                "loan_size": {"type": "dist", "name": "uniform", "params": {"lower": 10.0, "upper": 20.0}},
                "ltv": {"type": "dist", "name": "uniform", "params": {"lower": 0.1, "upper": 0.5}},
                "start_factor": {"type": "dist", "name": "uniform", "params": {"lower": 0.0, "upper": 0.1}},
                "duration_factor": {"type": "dist", "name": "uniform", "params": {"lower": 0.1, "upper": 0.9}},
                "repay_margin": 3600,
                "utilization_parameter": 0.2
            }"#,
        )
        .unwrap();
        path
    }

    /// Pre-populates the price cache so the engine never needs to reach the
    /// network in tests: the cache already covers the whole run window, so
    /// `PriceStore::get_data`'s staleness check is satisfied.
    fn write_price_fixture(dir: &std::path::Path, end_time: i64) {
        std::fs::create_dir_all(dir).unwrap();
        let mut writer = csv::Writer::from_path(dir.join("BTC.csv")).unwrap();
        writer.write_record(["time", "price"]).unwrap();
        let mut t = 0;
        while t <= end_time {
            writer.write_record([t.to_string(), "100.0".to_string()]).unwrap();
            t += 3_600;
        }
        writer.flush().unwrap();
    }

    #[test]
    fn missing_strategy_file_surfaces_as_io_error() {
        let dir = std::env::temp_dir().join(format!("lendsim-engine-test-missing-{}", std::process::id()));
        let cfg = config(PathBuf::from("/nonexistent/strategy.json"), dir);
        let err = SimulationEngine::run_simulation(&cfg, 1).unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }

    #[test]
    fn run_simulations_uses_base_seed_multiples() {
        let dir = std::env::temp_dir().join(format!("lendsim-engine-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let strategy_path = write_strategy_fixture(&dir);
        write_price_fixture(&dir, 3 * 3_600);
        let mut cfg = config(strategy_path, dir.clone());
        cfg.run_count = 3;

        let results = SimulationEngine::run_simulations(&cfg);
        let seeds: Vec<u64> = results.iter().map(|(s, _)| *s).collect();
        assert_eq!(seeds, vec![7, 14, 21]);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        let first = results[0].1.as_ref().unwrap();
        assert!(!first.step_metrics.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
