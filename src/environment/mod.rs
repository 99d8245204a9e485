mod brownian;
mod historical;

pub use brownian::BrownianEnvironment;
pub use historical::HistoricalEnvironment;

use rand::rngs::StdRng;

use crate::errors::EngineError;
use crate::records::EventInfo;

/// Holds simulated time and a price oracle; advances once per tick.
///
/// A sum type rather than a trait object: there are exactly two variants,
/// and `Brownian` is a strict extension of `Historical` (it delegates
/// lookups to the same previous-index search over its own, longer series).
#[derive(Clone, Debug)]
pub enum Environment {
    Historical(HistoricalEnvironment),
    Brownian(BrownianEnvironment),
}

impl Environment {
    pub fn set_time(&mut self, time: i64) {
        match self {
            Self::Historical(e) => e.time = time,
            Self::Brownian(e) => e.historical.time = time,
        }
    }

    pub fn get_time(&self) -> i64 {
        match self {
            Self::Historical(e) => e.time,
            Self::Brownian(e) => e.historical.time,
        }
    }

    pub fn load_data_until(&mut self, end: i64, rng: &mut StdRng) -> Result<(), EngineError> {
        match self {
            Self::Historical(e) => e.load_data_until(end),
            Self::Brownian(e) => e.load_data_until(end, rng),
        }
    }

    pub fn get_price(&self) -> f64 {
        match self {
            Self::Historical(e) => e.get_price(),
            Self::Brownian(e) => e.historical.get_price(),
        }
    }

    pub fn get_price_history(&self, lookback_seconds: i64) -> Vec<(i64, f64)> {
        match self {
            Self::Historical(e) => e.get_price_history(lookback_seconds),
            Self::Brownian(e) => e.historical.get_price_history(lookback_seconds),
        }
    }

    /// Advances time by `dt` and emits the one `environment_step` event.
    pub fn step(&mut self, dt: i64) -> Vec<EventInfo> {
        let time = self.get_time() + dt;
        self.set_time(time);
        let price = self.get_price();
        vec![EventInfo {
            message: "environment step".to_string(),
            time,
            type_: "environment_step".to_string(),
            extra: [
                ("time_step".to_string(), (dt as f64).into()),
                ("current_price".to_string(), price.into()),
            ]
            .into_iter()
            .collect(),
        }]
    }
}

/// Rightmost index `i` such that `series[i].0 <= t`, clamped to 0. Shared
/// by both environment variants since `Brownian` is just a longer series.
pub(crate) fn previous_index(series: &[(i64, f64)], t: i64) -> usize {
    match series.partition_point(|&(time, _)| time <= t) {
        0 => 0,
        n => n - 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previous_index_clamps_to_zero_before_series_start() {
        let series = [(10, 1.0), (20, 2.0), (30, 3.0)];
        assert_eq!(previous_index(&series, 0), 0);
    }

    #[test]
    fn previous_index_finds_rightmost_match() {
        let series = [(10, 1.0), (20, 2.0), (30, 3.0)];
        assert_eq!(previous_index(&series, 25), 1);
        assert_eq!(previous_index(&series, 30), 2);
        assert_eq!(previous_index(&series, 100), 2);
    }
}
