use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;

use lendsim::engine::{RunConfig, SimulationEngine};
use lendsim::errors::EngineError;
use lendsim::pool::LendingPoolConfig;
use lendsim::result::ResultWriter;

/// Discrete-event agent-based simulator for a collateralized-lending protocol.
#[derive(Parser, Debug)]
#[command(name = "lendsim", version, about)]
struct Cli {
    /// Path to the strategy config file (JSON).
    #[arg(long)]
    strategy: PathBuf,

    /// Directory results are written under, one subdirectory per run.
    #[arg(long, default_value = "simlogs")]
    results_dir: PathBuf,

    /// Directory the historical price cache lives in.
    #[arg(long, default_value = "data")]
    price_data_dir: PathBuf,

    /// Base RNG seed. With `--runs 1` this is the run's seed directly;
    /// with `--runs N > 1` it seeds `base_seed * (i + 1)` for each run.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Number of independent simulations to run. Values above 1 invoke
    /// the Monte-Carlo batch path instead of a single run.
    #[arg(long, default_value_t = 1)]
    runs: u32,

    /// Simulation start date, `YYYY-MM-DD`.
    #[arg(long)]
    start_date: NaiveDate,

    /// Simulation end date, `YYYY-MM-DD`.
    #[arg(long)]
    end_date: NaiveDate,

    /// Tick-step duration, in seconds.
    #[arg(long, default_value_t = 3_600)]
    tick_step_seconds: i64,

    /// Price symbol to simulate against.
    #[arg(long, default_value = "BTC")]
    symbol: String,

    /// Total liquidity the single lender deposits at genesis.
    #[arg(long, default_value_t = 1_000_000.0)]
    lender_amount: f64,

    /// A name for this run; used in the results-directory name, so it
    /// must not contain '-'.
    #[arg(long, default_value = "lendsim")]
    run_name: String,
}

fn main() -> Result<(), EngineError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let start_time = cli.start_date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
    let end_time = cli.end_date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();

    let config = RunConfig {
        strategy_path: cli.strategy,
        results_dir: cli.results_dir,
        run_name: cli.run_name,
        base_seed: cli.seed,
        run_count: cli.runs,
        start_time,
        end_time,
        tick_step_seconds: cli.tick_step_seconds,
        lending_pool: LendingPoolConfig {
            name: "pool".to_string(),
            max_ltv: 0.8,
            max_liquidity: cli.lender_amount,
            genesis_period: 7 * 86_400,
            running_period: 30 * 86_400,
            min_loan_amount: 1.0,
            min_loan_period: 86_400,
        },
        fee_model: lendsim_common::fee::FeeModel::Aave(lendsim_common::fee::AaveFeeModel::new(lendsim_common::fee::AaveParameters {
            optimal_utilization: 0.8,
            base_rate: 0.01,
            rate_slope_1: 0.04,
            rate_slope_2: 0.75,
        })),
        symbol: cli.symbol,
        price_data_dir: cli.price_data_dir,
        lender_amount: cli.lender_amount,
        parameter_update_period: 7 * 86_400,
    };

    if config.run_count > 1 {
        for (seed, outcome) in SimulationEngine::run_simulations(&config) {
            match outcome {
                Ok(result) => write_result(&config, &format!("{}seed{seed}", config.run_name), result)?,
                Err(err) => tracing::error!(seed, error = %err, "skipping failed run"),
            }
        }
    } else {
        let result = SimulationEngine::run_simulation(&config, config.base_seed)?;
        let name = config.run_name.clone();
        write_result(&config, &name, result)?;
    }

    Ok(())
}

fn write_result(config: &RunConfig, name: &str, result: lendsim::engine::RunOutcome) -> Result<(), EngineError> {
    let writer = ResultWriter::new(&config.results_dir, name)?;
    writer.write_step_metrics(&result.step_metrics)?;
    writer.write_end_metrics(&result.end_metrics)?;
    writer.write_custom_events(&result.custom_events)?;
    writer.write_log(&format!("seed {} produced {} ticks", result.seed, result.step_metrics.len()))?;
    tracing::info!(seed = result.seed, run_dir = %writer.run_dir().display(), "run complete");
    Ok(())
}
