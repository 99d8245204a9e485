use crate::number::{DAYS_PER_YEAR, SECONDS_PER_DAY};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AaveParameters {
    pub optimal_utilization: f64,
    pub base_rate: f64,
    pub rate_slope_1: f64,
    pub rate_slope_2: f64,
}

/// Aave-style kink utilization curve: a gentle slope up to
/// `optimal_utilization`, then a steep one beyond it.
#[derive(Clone, Copy, Debug)]
pub struct AaveFeeModel {
    parameters: AaveParameters,
}

impl AaveFeeModel {
    pub fn new(parameters: AaveParameters) -> Self {
        Self { parameters }
    }

    pub fn update_parameters(&mut self, parameters: AaveParameters) {
        self.parameters = parameters;
    }

    pub fn parameters(&self) -> AaveParameters {
        self.parameters
    }

    pub fn get_fee(&self, utilization: f64, loan_period_seconds: i64) -> f64 {
        let p = &self.parameters;
        let annual_rate = if utilization < p.optimal_utilization {
            p.base_rate + (utilization / p.optimal_utilization) * p.rate_slope_1
        } else {
            p.base_rate
                + p.rate_slope_1
                + p.rate_slope_2 * (utilization - p.optimal_utilization)
                    / (1.0 - p.optimal_utilization)
        };
        annual_rate * (loan_period_seconds as f64 / SECONDS_PER_DAY as f64 / DAYS_PER_YEAR)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn model() -> AaveFeeModel {
        AaveFeeModel::new(AaveParameters {
            optimal_utilization: 0.8,
            base_rate: 0.0,
            rate_slope_1: 0.04,
            rate_slope_2: 0.75,
        })
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(0.4, 0.02)]
    #[case(0.8, 0.04)]
    fn below_or_at_kink_is_linear(#[case] utilization: f64, #[case] expected_annual: f64) {
        let fee = model().get_fee(utilization, 365 * 86_400);
        assert!((fee - expected_annual).abs() < 1e-9);
    }

    #[test]
    fn above_kink_is_steeper() {
        let m = model();
        let at_kink = m.get_fee(0.8, 365 * 86_400);
        let above_kink = m.get_fee(0.9, 365 * 86_400);
        let full = m.get_fee(1.0, 365 * 86_400);
        assert!(above_kink > at_kink);
        assert!((full - (0.04 + 0.75)).abs() < 1e-9);
    }
}
