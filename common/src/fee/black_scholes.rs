use crate::errors::FeeModelError;
use crate::number::{guard_zero, normal_cdf, DAYS_PER_YEAR, SECONDS_PER_DAY};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlackScholesParameters {
    pub volatility: f64,
    pub risk_free_rate: f64,
}

impl Default for BlackScholesParameters {
    fn default() -> Self {
        Self {
            volatility: 0.0,
            risk_free_rate: 0.0,
        }
    }
}

/// Prices the borrower's collateral put option via Black-Scholes, with an
/// optional utilization-dependent multiplier.
#[derive(Clone, Debug)]
pub struct BlackScholesFeeModel {
    parameters: BlackScholesParameters,
    /// `utilization -> factor`; `None` means "identically 1".
    utilization_curve: Option<fn(f64) -> f64>,
}

impl BlackScholesFeeModel {
    pub fn new(utilization_curve: Option<fn(f64) -> f64>) -> Self {
        Self {
            parameters: BlackScholesParameters::default(),
            utilization_curve,
        }
    }

    pub fn update_parameters(&mut self, parameters: BlackScholesParameters) {
        self.parameters = parameters;
    }

    pub fn parameters(&self) -> BlackScholesParameters {
        self.parameters
    }

    /// Estimates volatility from hourly log-returns of `prices`, scaled by
    /// `volatility_factor` and annualized over the span the history covers.
    pub fn get_parameters(
        prices: &[(i64, f64)],
        volatility_factor: f64,
        risk_free_rate: f64,
    ) -> Result<BlackScholesParameters, FeeModelError> {
        if prices.len() < 2 {
            return Err(FeeModelError::InsufficientHistory(prices.len()));
        }
        let returns: Vec<f64> = prices
            .windows(2)
            .map(|w| (w[1].1 / w[0].1).ln())
            .collect();
        let n = returns.len() as f64;
        let var: f64 = returns.iter().map(|r| r * r).sum();
        let span_days =
            (prices.last().unwrap().0 - prices.first().unwrap().0) as f64 / SECONDS_PER_DAY as f64;
        let periods_per_year = n / (span_days / DAYS_PER_YEAR);
        let sigma = (periods_per_year / n * var).sqrt() * volatility_factor;
        Ok(BlackScholesParameters {
            volatility: sigma,
            risk_free_rate,
        })
    }

    /// Put-premium fee, spot normalized to 1, strike = `ltv`.
    pub fn get_fee(&self, ltv: f64, utilization: f64, loan_period_seconds: i64) -> f64 {
        let tau = loan_period_seconds as f64 / SECONDS_PER_DAY as f64 / DAYS_PER_YEAR;
        let sigma = guard_zero(self.parameters.volatility);
        let r = self.parameters.risk_free_rate;
        let tau = guard_zero(tau);

        let d1 = ((1.0 / ltv).ln() + (r + sigma * sigma / 2.0) * tau) / (sigma * tau.sqrt());
        let d2 = d1 - sigma * tau.sqrt();

        let put = ltv * (-r * tau).exp() * normal_cdf(-d2) - normal_cdf(-d1);
        let factor = self.utilization_curve.map_or(1.0, |f| f(utilization));
        put * factor
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rstest::rstest;

    use super::*;

    fn hourly_history(n: usize) -> Vec<(i64, f64)> {
        (0..n)
            .map(|i| (i as i64 * 3600, 100.0 + (i as f64).sin()))
            .collect()
    }

    #[test]
    fn get_parameters_rejects_short_history() {
        let err = BlackScholesFeeModel::get_parameters(&hourly_history(1), 1.0, 0.0).unwrap_err();
        assert_eq!(err, FeeModelError::InsufficientHistory(1));
    }

    #[rstest]
    #[case(0.3)]
    #[case(0.6)]
    #[case(0.9)]
    fn get_fee_is_positive_and_monotonic_in_ltv(#[case] ltv: f64) {
        let mut model = BlackScholesFeeModel::new(None);
        model.update_parameters(BlackScholesParameters {
            volatility: 0.8,
            risk_free_rate: 0.0,
        });
        let fee = model.get_fee(ltv, 0.5, 30 * 86_400);
        assert!(fee >= 0.0, "fee {fee} should be non-negative for ltv {ltv}");
    }

    #[test]
    fn higher_ltv_costs_more() {
        let mut model = BlackScholesFeeModel::new(None);
        model.update_parameters(BlackScholesParameters {
            volatility: 0.8,
            risk_free_rate: 0.0,
        });
        let low = model.get_fee(0.2, 0.5, 30 * 86_400);
        let high = model.get_fee(0.8, 0.5, 30 * 86_400);
        assert!(high > low);
    }

    #[test]
    fn utilization_curve_scales_fee() {
        let mut model = BlackScholesFeeModel::new(Some(|u| 1.0 + u));
        model.update_parameters(BlackScholesParameters {
            volatility: 0.5,
            risk_free_rate: 0.0,
        });
        let base = model.get_fee(0.5, 0.0, 30 * 86_400);
        let scaled = model.get_fee(0.5, 1.0, 30 * 86_400);
        assert_relative_eq!(scaled, base * 2.0, epsilon = 1e-9);
    }
}
