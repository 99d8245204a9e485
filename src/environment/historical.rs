use std::path::PathBuf;

use crate::errors::EngineError;
use crate::price_data::PriceStore;

use super::previous_index;

/// Historical hourly price series for one symbol.
#[derive(Clone, Debug)]
pub struct HistoricalEnvironment {
    pub symbol: String,
    pub time: i64,
    pub series: Vec<(i64, f64)>,
    pub data_dir: PathBuf,
}

impl HistoricalEnvironment {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            time: 0,
            series: Vec::new(),
            data_dir: PathBuf::from("data"),
        }
    }

    pub fn with_data_dir(symbol: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::new(symbol)
        }
    }

    pub fn load_data_until(&mut self, end: i64) -> Result<(), EngineError> {
        self.series = PriceStore::new(self.data_dir.clone()).get_data(&self.symbol, end)?;
        Ok(())
    }

    pub fn get_price(&self) -> f64 {
        self.get_price_at(self.time)
    }

    pub fn get_price_at(&self, t: i64) -> f64 {
        if self.series.is_empty() {
            return 0.0;
        }
        self.series[previous_index(&self.series, t)].1
    }

    pub fn get_price_for_timestamps(&self, timestamps: &[i64]) -> Vec<f64> {
        timestamps.iter().map(|&t| self.get_price_at(t)).collect()
    }

    /// Inclusive slice `[t - lookback_seconds, t]`.
    pub fn get_price_history(&self, lookback_seconds: i64) -> Vec<(i64, f64)> {
        let start = self.time - lookback_seconds;
        self.series
            .iter()
            .filter(|&&(t, _)| t >= start && t <= self.time)
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(series: Vec<(i64, f64)>) -> HistoricalEnvironment {
        HistoricalEnvironment {
            series,
            ..HistoricalEnvironment::new("BTC")
        }
    }

    #[test]
    fn get_price_uses_previous_index_lookup() {
        let mut env = env_with(vec![(0, 100.0), (3600, 110.0), (7200, 120.0)]);
        env.time = 5000;
        assert_eq!(env.get_price(), 110.0);
    }

    #[test]
    fn get_price_history_is_inclusive_slice() {
        let mut env = env_with(vec![(0, 100.0), (3600, 110.0), (7200, 120.0), (10800, 130.0)]);
        env.time = 7200;
        let history = env.get_price_history(3600);
        assert_eq!(history, vec![(3600, 110.0), (7200, 120.0)]);
    }
}
