use crate::number::SECONDS_PER_DAY;

/// A borrow position. Immutable except for `paid`, which flips `false ->
/// true` at most once, on repayment.
#[derive(Clone, Debug, PartialEq)]
pub struct Loan {
    pub loan_id: String,
    pub borrower_address: String,
    pub start_time: i64,
    pub expiration_time: i64,
    pub initial_ltv: f64,
    pub collateral_amount: f64,
    pub borrowing_fee: f64,
    pub net_loan: f64,
    pub total_debt: f64,
    pub paid: bool,
}

impl Loan {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        loan_id: String,
        borrower_address: String,
        start_time: i64,
        expiration_time: i64,
        collateral_amount: f64,
        spot_price_at_creation: f64,
        total_debt: f64,
        borrowing_fee: f64,
    ) -> Self {
        let initial_ltv = total_debt / (collateral_amount * spot_price_at_creation);
        Self {
            loan_id,
            borrower_address,
            start_time,
            expiration_time,
            initial_ltv,
            collateral_amount,
            borrowing_fee,
            net_loan: total_debt - borrowing_fee,
            total_debt,
            paid: false,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expiration_time
    }

    pub fn get_duration(&self) -> i64 {
        self.expiration_time - self.start_time
    }

    /// `net_loan * duration_in_days`. Summed across loans for normalized
    /// utilization.
    pub fn get_size_days(&self) -> f64 {
        self.net_loan * (self.get_duration() as f64 / SECONDS_PER_DAY as f64)
    }
}

/// Snapshot taken when a running cycle settles.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleData {
    pub cycle_index: u64,
    pub initial_liquidity: f64,
    pub remaining_liquidity: f64,
    pub reclaimed_collateral: f64,
    pub fees_earned: f64,
    pub final_price: f64,
    pub average_utilization: f64,
    pub normalized_utilization: f64,
    pub loans: Vec<Loan>,
}

impl CycleData {
    pub fn final_collateral_value(&self) -> f64 {
        self.final_price * self.reclaimed_collateral
    }
}
