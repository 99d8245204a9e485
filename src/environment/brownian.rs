use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::errors::EngineError;

use super::HistoricalEnvironment;

/// Extends a historical series with a deterministic geometric-Brownian
/// continuation past its last point, so a run can simulate further into
/// the future than the cached historical data reaches.
#[derive(Clone, Debug)]
pub struct BrownianEnvironment {
    pub historical: HistoricalEnvironment,
    pub volatility_factor: f64,
    pub zero_mu: bool,
}

impl BrownianEnvironment {
    pub fn new(symbol: impl Into<String>, volatility_factor: f64, zero_mu: bool) -> Self {
        Self {
            historical: HistoricalEnvironment::new(symbol),
            volatility_factor,
            zero_mu,
        }
    }

    /// Loads real history up to however much is cached, then extends with
    /// an hourly GBM continuation until `end` is covered.
    pub fn load_data_until(&mut self, end: i64, rng: &mut StdRng) -> Result<(), EngineError> {
        self.historical.load_data_until(end)?;
        let Some(&(last_time, last_price)) = self.historical.series.last() else {
            return Ok(());
        };
        if last_time >= end {
            return Ok(());
        }

        let returns: Vec<f64> = self
            .historical
            .series
            .windows(2)
            .map(|w| (w[1].1 / w[0].1).ln())
            .collect();
        let mu = if self.zero_mu || returns.is_empty() {
            0.0
        } else {
            returns.iter().sum::<f64>() / returns.len() as f64
        };
        let sigma = std_dev(&returns);

        let one_hour = 3600;
        let num_needed = ((end - last_time) / one_hour).max(1);
        let normal = Normal::new(0.0, 1.0).expect("unit normal is always valid");

        let mut price = last_price;
        let mut t = last_time;
        let mut generated = Vec::with_capacity(num_needed as usize);
        for _ in 0..num_needed {
            t += one_hour;
            let epsilon = normal.sample(rng);
            let f = self.volatility_factor;
            let drift = mu - (sigma * f).powi(2) / 2.0;
            let stochastic = epsilon * 1.0_f64.sqrt() * sigma * f;
            price *= (drift + stochastic).exp();
            generated.push((t, price));
        }
        self.historical.series.extend(generated);
        Ok(())
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn continuation_keeps_prices_positive_and_extends_past_history() {
        let mut env = BrownianEnvironment::new("BTC", 1.0, false);
        env.historical.series = vec![(0, 100.0), (3600, 101.0), (7200, 99.0), (10800, 102.0)];
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        env.load_data_until(10800 + 3600 * 5, &mut rng).unwrap();
        assert!(env.historical.series.last().unwrap().0 > 10800);
        assert!(env.historical.series.iter().all(|&(_, p)| p > 0.0));
    }

    #[test]
    fn zero_mu_drops_the_drift_term() {
        let mut env = BrownianEnvironment::new("BTC", 1.0, true);
        env.historical.series = vec![(0, 100.0), (3600, 200.0)];
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        assert!(env.load_data_until(3600 * 10, &mut rng).is_ok());
    }
}
