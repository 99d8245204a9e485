use std::collections::BTreeMap;

use crate::errors::FeeModelError;
use crate::number::SECONDS_PER_DAY;

/// One grid key: a loan-to-value bucket and an expiration, in whole days.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct GridPoint {
    /// LTV scaled by 1e6 so the key can be totally ordered; see
    /// [`GridPoint::new`].
    ltv_millionths: u64,
    pub days: u32,
}

impl GridPoint {
    pub fn new(ltv: f64, days: u32) -> Self {
        Self {
            ltv_millionths: (ltv * 1_000_000.0).round() as u64,
            days,
        }
    }

    pub fn ltv(&self) -> f64 {
        self.ltv_millionths as f64 / 1_000_000.0
    }
}

/// `f(u) = a * u * cosh(b * u^c) + d`, `u` in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KellyCurve {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl KellyCurve {
    pub fn evaluate(&self, utilization: f64) -> Result<f64, FeeModelError> {
        if !(0.0..=1.0).contains(&utilization) {
            return Err(FeeModelError::UtilizationOutOfDomain(utilization));
        }
        Ok(self.a * utilization * (self.b * utilization.powf(self.c)).cosh() + self.d)
    }
}

/// Produces one [`KellyCurve`] per `(ltv, expiration_days)` configuration.
/// Stands in for the unbuilt curve-generation library this fee model
/// depends on; only its input/output contract is modeled here.
pub trait CurveGenerator {
    fn generate(
        &self,
        configurations: &[GridPoint],
        price_history: &[(i64, f64)],
    ) -> Vec<KellyCurve>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct KellyParameters {
    pub curve_grid: BTreeMap<GridPoint, KellyCurve>,
}

#[derive(Clone, Debug)]
pub struct KellyFeeModel {
    parameters: KellyParameters,
    cache_key: Option<String>,
}

impl KellyFeeModel {
    pub fn new() -> Self {
        Self {
            parameters: KellyParameters {
                curve_grid: BTreeMap::new(),
            },
            cache_key: None,
        }
    }

    pub fn update_parameters(&mut self, parameters: KellyParameters) {
        self.parameters = parameters;
    }

    pub fn parameters(&self) -> &KellyParameters {
        &self.parameters
    }

    /// Builds the `(ltv, expiration_days)` grid and asks `generator` for one
    /// curve per configuration. `ltv_values` need not be sorted.
    pub fn get_parameters(
        generator: &impl CurveGenerator,
        price_history: &[(i64, f64)],
        ltv_values: &[f64],
        max_expiration_days: u32,
        interval_days: u32,
    ) -> KellyParameters {
        let mut expiration_days = Vec::new();
        let mut d = interval_days;
        loop {
            expiration_days.push(d);
            if d >= max_expiration_days {
                break;
            }
            d += interval_days;
        }

        let configurations: Vec<GridPoint> = ltv_values
            .iter()
            .flat_map(|&ltv| expiration_days.iter().map(move |&days| GridPoint::new(ltv, days)))
            .collect();

        let curves = generator.generate(&configurations, price_history);

        let curve_grid = configurations.into_iter().zip(curves).collect();
        KellyParameters { curve_grid }
    }

    /// Snaps `(ltv, loan_period)` to the smallest grid point with `ltv >=`
    /// and `days >=` the requested values (or the largest grid value along
    /// each axis if none is large enough), then evaluates that curve.
    pub fn get_fee(
        &self,
        ltv: f64,
        utilization: f64,
        loan_period_seconds: i64,
    ) -> Result<f64, FeeModelError> {
        let days = (loan_period_seconds / SECONDS_PER_DAY).max(1) as u32;
        let curve = self.select_curve(ltv, days)?;
        curve.evaluate(utilization)
    }

    fn select_curve(&self, ltv: f64, days: u32) -> Result<KellyCurve, FeeModelError> {
        let snapped_ltv = select_next_highest(
            self.parameters.curve_grid.keys().map(GridPoint::ltv),
            ltv,
        );
        let snapped_days = select_next_highest(
            self.parameters
                .curve_grid
                .keys()
                .filter(|gp| (gp.ltv() - snapped_ltv).abs() < 1e-9)
                .map(|gp| gp.days as f64),
            days as f64,
        );
        self.parameters
            .curve_grid
            .get(&GridPoint::new(snapped_ltv, snapped_days as u32))
            .copied()
            .ok_or(FeeModelError::InsufficientHistory(0))
    }
}

impl Default for KellyFeeModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Smallest value `>= target`, or the maximum value if none is large
/// enough.
fn select_next_highest(values: impl Iterator<Item = f64>, target: f64) -> f64 {
    let mut max = f64::MIN;
    let mut best: Option<f64> = None;
    for v in values {
        max = max.max(v);
        if v >= target && best.map_or(true, |b| v < b) {
            best = Some(v);
        }
    }
    best.unwrap_or(max)
}

/// Read-through cache keyed by `(date, lookback_days, max_expiration_days)`.
/// Idempotent read, single-writer create; see `lendsim`'s
/// `KellyCache` for the filesystem-backed implementation (kept out of this
/// crate since it needs `serde_json` + path handling, not pure math).
pub fn cache_key(date: &str, lookback_days: u32, max_expiration_days: u32) -> String {
    format!("{date}_lb{lookback_days}_exp{max_expiration_days}_kelly_fee_model.json")
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    struct FlatGenerator;
    impl CurveGenerator for FlatGenerator {
        fn generate(&self, configurations: &[GridPoint], _: &[(i64, f64)]) -> Vec<KellyCurve> {
            configurations
                .iter()
                .map(|_| KellyCurve {
                    a: 1.0,
                    b: 1.0,
                    c: 1.0,
                    d: 0.0,
                })
                .collect()
        }
    }

    #[test]
    fn get_parameters_builds_full_grid() {
        let params = KellyFeeModel::get_parameters(&FlatGenerator, &[], &[0.5, 0.8], 90, 30);
        assert_eq!(params.curve_grid.len(), 2 * 3);
    }

    #[test]
    fn get_fee_snaps_to_nearest_grid_point_above() {
        let mut model = KellyFeeModel::new();
        model.update_parameters(KellyParameters {
            curve_grid: BTreeMap::from([(
                GridPoint::new(0.8, 30),
                KellyCurve {
                    a: 1.0,
                    b: 0.0,
                    c: 1.0,
                    d: 0.0,
                },
            )]),
        });
        let fee = model.get_fee(0.5, 0.5, 10 * 86_400).unwrap();
        assert_relative_eq!(fee, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn rejects_utilization_out_of_domain() {
        let curve = KellyCurve {
            a: 1.0,
            b: 1.0,
            c: 1.0,
            d: 0.0,
        };
        assert!(curve.evaluate(1.5).is_err());
    }

    #[test]
    fn cache_key_matches_contract() {
        assert_eq!(
            cache_key("2024-01-01", 90, 365),
            "2024-01-01_lb90_exp365_kelly_fee_model.json"
        );
    }
}
