mod aave;
mod black_scholes;
mod cached_kelly;
mod hybrid;
mod kelly;

pub use aave::{AaveFeeModel, AaveParameters};
pub use black_scholes::{BlackScholesFeeModel, BlackScholesParameters};
pub use cached_kelly::CachedKellyFeeModel;
pub use hybrid::{HybridFeeModel, HybridMode, PrimaryFeeModel};
pub use kelly::{cache_key, CurveGenerator, GridPoint, KellyCurve, KellyFeeModel, KellyParameters};

use crate::errors::FeeModelError;

/// A sealed family of fee models sharing one capability set: fetch fresh
/// parameters from the environment, store them, and price a loan.
///
/// Modeled as a sum type with match-dispatched methods (rather than an open
/// trait-object hierarchy) since the set of fee models is closed and each
/// variant's parameters are a distinct shape.
#[derive(Clone, Debug)]
pub enum FeeModel {
    BlackScholes(BlackScholesFeeModel),
    Aave(AaveFeeModel),
    Kelly(KellyFeeModel),
    CachedKelly(CachedKellyFeeModel),
    Hybrid(HybridFeeModel),
}

impl FeeModel {
    /// `get_fee(ltv, utilization, loan_period_seconds)`. `utilization` must
    /// be in `[0, 1]`.
    pub fn get_fee(
        &self,
        ltv: f64,
        utilization: f64,
        loan_period_seconds: i64,
    ) -> Result<f64, FeeModelError> {
        if !(0.0..=1.0).contains(&utilization) {
            return Err(FeeModelError::UtilizationOutOfDomain(utilization));
        }
        Ok(match self {
            Self::BlackScholes(m) => m.get_fee(ltv, utilization, loan_period_seconds),
            Self::Aave(m) => m.get_fee(utilization, loan_period_seconds),
            Self::Kelly(m) => m.get_fee(ltv, utilization, loan_period_seconds)?,
            Self::CachedKelly(m) => m.get_fee(ltv, utilization, loan_period_seconds)?,
            Self::Hybrid(m) => m.get_fee(ltv, utilization, loan_period_seconds)?,
        })
    }

    /// Refreshes the Black-Scholes side of this model, wherever it lives:
    /// directly, or as the primary side of a hybrid. A no-op for models
    /// that don't carry a Black-Scholes component.
    pub fn update_black_scholes_parameters(&mut self, parameters: BlackScholesParameters) {
        match self {
            Self::BlackScholes(m) => m.update_parameters(parameters),
            Self::Hybrid(h) => {
                if let PrimaryFeeModel::BlackScholes(m) = &mut h.primary {
                    m.update_parameters(parameters);
                }
            }
            Self::Aave(_) | Self::Kelly(_) | Self::CachedKelly(_) => {}
        }
    }
}
