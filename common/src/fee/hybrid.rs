use super::{AaveFeeModel, BlackScholesFeeModel, KellyFeeModel};
use crate::errors::FeeModelError;

/// The "A" side of a hybrid: either the option-premium model or the Kelly
/// grid.
#[derive(Clone, Debug)]
pub enum PrimaryFeeModel {
    BlackScholes(BlackScholesFeeModel),
    Kelly(KellyFeeModel),
}

impl PrimaryFeeModel {
    fn get_fee(
        &self,
        ltv: f64,
        utilization: f64,
        loan_period_seconds: i64,
    ) -> Result<f64, FeeModelError> {
        match self {
            Self::BlackScholes(m) => Ok(m.get_fee(ltv, utilization, loan_period_seconds)),
            Self::Kelly(m) => m.get_fee(ltv, utilization, loan_period_seconds),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HybridMode {
    /// `fee = A + B`.
    Sum,
    /// `fee = A` if `A >= B`, else `(A + B) / 2`.
    Combined,
}

/// Composes one [`PrimaryFeeModel`] with one [`AaveFeeModel`] under a
/// [`HybridMode`].
#[derive(Clone, Debug)]
pub struct HybridFeeModel {
    pub primary: PrimaryFeeModel,
    pub aave: AaveFeeModel,
    pub mode: HybridMode,
}

impl HybridFeeModel {
    pub fn new(primary: PrimaryFeeModel, aave: AaveFeeModel, mode: HybridMode) -> Self {
        Self {
            primary,
            aave,
            mode,
        }
    }

    pub fn get_fee(
        &self,
        ltv: f64,
        utilization: f64,
        loan_period_seconds: i64,
    ) -> Result<f64, FeeModelError> {
        let a = self.primary.get_fee(ltv, utilization, loan_period_seconds)?;
        let b = self.aave.get_fee(utilization, loan_period_seconds);
        Ok(match self.mode {
            HybridMode::Sum => a + b,
            HybridMode::Combined => {
                if a >= b {
                    a
                } else {
                    0.5 * (a + b)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::{AaveParameters, BlackScholesParameters};
    use super::*;

    fn aave() -> AaveFeeModel {
        AaveFeeModel::new(AaveParameters {
            optimal_utilization: 0.8,
            base_rate: 0.0,
            rate_slope_1: 0.04,
            rate_slope_2: 0.75,
        })
    }

    fn bsm(volatility: f64) -> BlackScholesFeeModel {
        let mut m = BlackScholesFeeModel::new(None);
        m.update_parameters(BlackScholesParameters {
            volatility,
            risk_free_rate: 0.0,
        });
        m
    }

    #[test]
    fn sum_adds_both_fees() {
        let hybrid = HybridFeeModel::new(
            PrimaryFeeModel::BlackScholes(bsm(0.5)),
            aave(),
            HybridMode::Sum,
        );
        let a = bsm(0.5).get_fee(0.5, 0.5, 30 * 86_400);
        let b = aave().get_fee(0.5, 30 * 86_400);
        let fee = hybrid.get_fee(0.5, 0.5, 30 * 86_400).unwrap();
        assert!((fee - (a + b)).abs() < 1e-9);
    }

    #[test]
    fn combined_takes_the_larger_when_a_dominates() {
        // With utilization 0, Aave's base_rate is 0 so B == 0 and A (a
        // genuine option premium) should dominate.
        let hybrid = HybridFeeModel::new(
            PrimaryFeeModel::BlackScholes(bsm(0.8)),
            aave(),
            HybridMode::Combined,
        );
        let fee = hybrid.get_fee(0.5, 0.0, 30 * 86_400).unwrap();
        let a = bsm(0.8).get_fee(0.5, 0.0, 30 * 86_400);
        assert!((fee - a).abs() < 1e-9);
    }

    #[test]
    fn combined_averages_when_b_dominates() {
        let hybrid = HybridFeeModel::new(
            PrimaryFeeModel::BlackScholes(bsm(0.0001)),
            aave(),
            HybridMode::Combined,
        );
        let fee = hybrid.get_fee(0.01, 0.9, 30 * 86_400).unwrap();
        let a = bsm(0.0001).get_fee(0.01, 0.9, 30 * 86_400);
        let b = aave().get_fee(0.9, 30 * 86_400);
        assert!(b > a);
        assert!((fee - 0.5 * (a + b)).abs() < 1e-9);
    }
}
