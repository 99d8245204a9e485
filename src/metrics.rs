use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use lendsim_common::number::safe_divide;

use crate::protocol::Protocol;
use crate::records::EventInfo;

/// One pool's snapshot for a single tick. `histograms_json` carries the
/// distribution buckets (`hist-active_loans-ltv_0.3_0.4`, etc.) as a JSON
/// object rather than flattened CSV columns: the `csv` crate's writer
/// doesn't support `#[serde(flatten)]`, and bucket keys vary per run
/// depending on which buckets were ever populated.
#[derive(Clone, Debug, Serialize)]
pub struct StepMetrics {
    pub tick: u64,
    pub time: i64,
    pub lending_pool: String,
    pub status: String,
    pub cycle_count: u64,
    pub total_deposits: f64,
    pub available_amount: f64,
    pub borrowed_amount: f64,
    pub utilization: f64,
    pub active_loan_count: usize,
    pub pool_realized_pnl: f64,
    pub histograms_json: String,
}

impl StepMetrics {
    /// Parses `histograms_json` on demand and looks up one bucket by key.
    /// Only used by tests; production consumers read the CSV column as-is.
    pub fn histogram(&self, key: &str) -> Option<f64> {
        let parsed: BTreeMap<String, f64> = serde_json::from_str(&self.histograms_json).ok()?;
        parsed.get(key).copied()
    }
}

/// One non-environment event, flattened for its own per-kind CSV.
#[derive(Clone, Debug, Serialize)]
pub struct CustomEventRecord {
    pub time: i64,
    pub kind: String,
    pub message: String,
    pub extra_json: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct EndMetrics {
    pub lending_pool: String,
    pub final_tick: u64,
    pub final_time: i64,
    pub cycle_count: u64,
    pub total_deposits: f64,
    pub pool_pnl: f64,
    pub total_loans: u64,
    pub defaulted_loans: u64,
    pub defaulted_loan_ratio: f64,
}

/// Accumulates cross-tick state a single [`StepMetrics`] snapshot can't see
/// on its own: fees realized by cycles that have already closed (a pool
/// zeroes `total_fees_earned` at every cycle boundary), bad debt from loans
/// that expired unpaid, and how many loans a pool has ever originated (its
/// `loans` map is cleared every cycle too).
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    cumulative_fees: BTreeMap<String, f64>,
    merged_cycles: HashSet<(String, u64)>,
    cumulative_bad_debt: BTreeMap<String, f64>,
    counted_defaults: HashSet<(String, String)>,
    seen_loans: HashSet<(String, String)>,
    loans_total: BTreeMap<String, u64>,
    loans_defaulted: BTreeMap<String, u64>,
    history: Vec<StepMetrics>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one [`StepMetrics`] per pool for this tick, folding in any
    /// cycle that just closed and any loan that just became a confirmed
    /// default. `price` is the environment's current spot price, needed to
    /// value unpaid collateral.
    pub fn by_step(&mut self, protocol: &Protocol, tick: u64, now: i64, price: f64) -> Vec<StepMetrics> {
        let mut out = Vec::new();
        for pool in protocol.get_lending_pools() {
            let name = pool.name().to_string();

            for loan in pool.loans() {
                let key = (name.clone(), loan.loan_id.clone());
                if self.seen_loans.insert(key) {
                    *self.loans_total.entry(name.clone()).or_insert(0) += 1;
                }
                if loan.is_expired(now) && !loan.paid {
                    let default_key = (name.clone(), loan.loan_id.clone());
                    if self.counted_defaults.insert(default_key) {
                        let shortfall = (loan.total_debt - loan.collateral_amount * price).max(0.0);
                        *self.cumulative_bad_debt.entry(name.clone()).or_insert(0.0) += shortfall;
                        *self.loans_defaulted.entry(name.clone()).or_insert(0) += 1;
                    }
                }
            }

            if pool.is_new_cycle && pool.cycle_count > 0 {
                let closed_index = pool.cycle_count - 1;
                if self.merged_cycles.insert((name.clone(), closed_index)) {
                    if let Some(cycle) = pool.cycle_history.get(&closed_index) {
                        *self.cumulative_fees.entry(name.clone()).or_insert(0.0) += cycle.fees_earned;
                    }
                }
            }

            let pool_realized_pnl = self.cumulative_fees.get(&name).copied().unwrap_or(0.0) + pool.total_fees_earned
                - self.cumulative_bad_debt.get(&name).copied().unwrap_or(0.0);

            let mut histograms: BTreeMap<String, f64> = BTreeMap::new();
            let cycle_start = pool.next_cycle_time - pool.config.running_period;
            let mut active_loan_count = 0usize;
            for loan in pool.active_loans(now) {
                active_loan_count += 1;
                *histograms.entry(bucket_key("hist-active_loans-ltv", loan.initial_ltv)).or_insert(0.0) += 1.0;

                let duration_fraction = safe_divide(loan.get_duration() as f64, pool.config.running_period as f64);
                *histograms.entry(bucket_key("hist-active_loans-duration", duration_fraction)).or_insert(0.0) += 1.0;
                *histograms.entry(bucket_key("dist-loan_fees-duration", duration_fraction)).or_insert(0.0) += loan.borrowing_fee;

                let start_fraction = safe_divide((loan.start_time - cycle_start).max(0) as f64, pool.config.running_period as f64);
                *histograms.entry(bucket_key("hist-active_loans-start", start_fraction)).or_insert(0.0) += 1.0;

                let size_fraction = safe_divide(loan.net_loan, pool.total_deposits);
                *histograms.entry(bucket_key("hist-active_loans-size", size_fraction)).or_insert(0.0) += 1.0;
            }

            let step = StepMetrics {
                tick,
                time: now,
                lending_pool: name,
                status: format!("{:?}", pool.status),
                cycle_count: pool.cycle_count,
                total_deposits: pool.total_deposits,
                available_amount: pool.available_amount,
                borrowed_amount: pool.borrowed_amount,
                utilization: pool.get_current_utilization(),
                active_loan_count,
                pool_realized_pnl,
                histograms_json: serde_json::to_string(&histograms).unwrap_or_default(),
            };
            self.history.push(step.clone());
            out.push(step);
        }
        out
    }

    /// Extracts every non-ambient event (everything but `environment_step`)
    /// for per-kind logging.
    pub fn custom_events(&self, events: &[EventInfo]) -> Vec<CustomEventRecord> {
        events
            .iter()
            .filter(|e| e.type_ != "environment_step")
            .map(|e| CustomEventRecord {
                time: e.time,
                kind: e.type_.clone(),
                message: e.message.clone(),
                extra_json: serde_json::to_string(&e.extra).unwrap_or_default(),
            })
            .collect()
    }

    /// Reads the last recorded tick for each pool; by construction this
    /// matches `step_metrics`'s final row for that pool, so `pool_pnl` here
    /// is never independently recomputed.
    pub fn end_of_simulation(&self) -> Vec<EndMetrics> {
        let mut last_by_pool: BTreeMap<String, &StepMetrics> = BTreeMap::new();
        for step in &self.history {
            last_by_pool.insert(step.lending_pool.clone(), step);
        }
        last_by_pool
            .into_values()
            .map(|step| {
                let total = self.loans_total.get(&step.lending_pool).copied().unwrap_or(0);
                let defaulted = self.loans_defaulted.get(&step.lending_pool).copied().unwrap_or(0);
                EndMetrics {
                    lending_pool: step.lending_pool.clone(),
                    final_tick: step.tick,
                    final_time: step.time,
                    cycle_count: step.cycle_count,
                    total_deposits: step.total_deposits,
                    pool_pnl: step.pool_realized_pnl,
                    total_loans: total,
                    defaulted_loans: defaulted,
                    defaulted_loan_ratio: safe_divide(defaulted as f64, total as f64),
                }
            })
            .collect()
    }
}

/// `"{prefix}_{lo:.1}_{hi:.1}"` for the 0.1-wide bucket over `[0, 1]`
/// containing `value`; values outside that range clamp to the nearest
/// edge bucket.
fn bucket_key(prefix: &str, value: f64) -> String {
    let clamped = value.clamp(0.0, 0.999_999);
    let lo = (clamped * 10.0).floor() / 10.0;
    let hi = lo + 0.1;
    format!("{prefix}_{lo:.1}_{hi:.1}")
}
