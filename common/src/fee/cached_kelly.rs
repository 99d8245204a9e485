use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::kelly::cache_key;
use super::{CurveGenerator, GridPoint, KellyCurve, KellyFeeModel, KellyParameters};
use crate::errors::FeeModelError;

#[derive(Serialize, Deserialize)]
struct GridEntry {
    ltv: f64,
    days: u32,
    a: f64,
    b: f64,
    c: f64,
    d: f64,
}

fn to_entries(params: &KellyParameters) -> Vec<GridEntry> {
    params
        .curve_grid
        .iter()
        .map(|(gp, curve)| GridEntry {
            ltv: gp.ltv(),
            days: gp.days,
            a: curve.a,
            b: curve.b,
            c: curve.c,
            d: curve.d,
        })
        .collect()
}

fn from_entries(entries: Vec<GridEntry>) -> KellyParameters {
    let curve_grid: BTreeMap<GridPoint, KellyCurve> = entries
        .into_iter()
        .map(|e| {
            (
                GridPoint::new(e.ltv, e.days),
                KellyCurve {
                    a: e.a,
                    b: e.b,
                    c: e.c,
                    d: e.d,
                },
            )
        })
        .collect();
    KellyParameters { curve_grid }
}

/// Read-through memoiser over [`KellyFeeModel`]: the grid for a given
/// `(date, lookback_days, max_expiration_days)` key is built once and
/// written to a file in `cache_dir`; every subsequent call for the same key
/// loads that file unchanged instead of invoking the generator again.
/// Content-addressed by the key; no mutation after the first write.
#[derive(Clone, Debug)]
pub struct CachedKellyFeeModel {
    inner: KellyFeeModel,
    cache_dir: PathBuf,
}

impl CachedKellyFeeModel {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: KellyFeeModel::new(),
            cache_dir: cache_dir.into(),
        }
    }

    pub fn get_fee(&self, ltv: f64, utilization: f64, loan_period_seconds: i64) -> Result<f64, FeeModelError> {
        self.inner.get_fee(ltv, utilization, loan_period_seconds)
    }

    pub fn update_parameters(&mut self, parameters: KellyParameters) {
        self.inner.update_parameters(parameters);
    }

    pub fn parameters(&self) -> &KellyParameters {
        self.inner.parameters()
    }

    /// Loads the cached grid for `(date, lookback_days, max_expiration_days)`
    /// if present; otherwise builds it via `generator` and writes it once.
    #[allow(clippy::too_many_arguments)]
    pub fn get_parameters(
        &self,
        generator: &impl CurveGenerator,
        price_history: &[(i64, f64)],
        date: &str,
        lookback_days: u32,
        ltv_values: &[f64],
        max_expiration_days: u32,
        interval_days: u32,
    ) -> KellyParameters {
        let key = cache_key(date, lookback_days, max_expiration_days);
        let path = self.cache_dir.join(&key);

        if let Some(cached) = std::fs::read_to_string(&path)
            .ok()
            .and_then(|contents| serde_json::from_str::<Vec<GridEntry>>(&contents).ok())
        {
            return from_entries(cached);
        }

        let params = KellyFeeModel::get_parameters(generator, price_history, ltv_values, max_expiration_days, interval_days);

        if let Ok(serialized) = serde_json::to_string_pretty(&to_entries(&params)) {
            if std::fs::create_dir_all(&self.cache_dir).is_ok() {
                let _ = std::fs::write(&path, serialized);
            }
        }
        params
    }
}
