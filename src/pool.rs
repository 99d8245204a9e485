use std::collections::{BTreeMap, HashMap};

use lendsim_common::errors::PoolError;
use lendsim_common::fee::FeeModel;
use lendsim_common::loan::{CycleData, Loan};
use lendsim_common::number::{safe_divide, SECONDS_PER_DAY};
use lendsim_common::wallet::Wallet;

use crate::records::EventInfo;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LendingPoolStatus {
    Genesis,
    Running,
}

/// Construction-time policy for a pool; immutable once built.
#[derive(Clone, Debug)]
pub struct LendingPoolConfig {
    pub name: String,
    pub max_ltv: f64,
    pub max_liquidity: f64,
    pub genesis_period: i64,
    pub running_period: i64,
    pub min_loan_amount: f64,
    pub min_loan_period: i64,
}

/// Genesis -> Running cycle state machine: deposits/withdrawals/loans/
/// repayments, cycle settlement, utilization tracking, cycle history.
#[derive(Clone, Debug)]
pub struct LendingPool {
    pub config: LendingPoolConfig,
    pub fee_model: FeeModel,

    pub status: LendingPoolStatus,
    pub next_cycle_time: i64,
    pub cycle_count: u64,
    pub is_new_cycle: bool,

    pending_deposits: HashMap<String, f64>,
    signaled_withdrawals: HashMap<String, f64>,
    pending_withdrawals: HashMap<String, f64>,
    reclaimed_collateral: HashMap<String, f64>,
    deposits: HashMap<String, f64>,
    loans: BTreeMap<String, Loan>,
    borrower_loans: HashMap<String, Vec<String>>,
    utilizations: Vec<f64>,
    pub cycle_history: BTreeMap<u64, CycleData>,

    pub total_deposits: f64,
    pub total_collateral_locked: f64,
    pub available_amount: f64,
    pub borrowed_amount: f64,
    pub total_fees_earned: f64,
}

impl LendingPool {
    pub fn new(config: LendingPoolConfig, fee_model: FeeModel, now: i64) -> Self {
        let next_cycle_time = now + config.genesis_period;
        Self {
            config,
            fee_model,
            status: LendingPoolStatus::Genesis,
            next_cycle_time,
            cycle_count: 0,
            is_new_cycle: false,
            pending_deposits: HashMap::new(),
            signaled_withdrawals: HashMap::new(),
            pending_withdrawals: HashMap::new(),
            reclaimed_collateral: HashMap::new(),
            deposits: HashMap::new(),
            loans: BTreeMap::new(),
            borrower_loans: HashMap::new(),
            utilizations: Vec::new(),
            cycle_history: BTreeMap::new(),
            total_deposits: 0.0,
            total_collateral_locked: 0.0,
            available_amount: 0.0,
            borrowed_amount: 0.0,
            total_fees_earned: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// `borrowed / (borrowed + available)`, 0 when both are 0. Used inside
    /// `take_step`'s tick history and by `borrow`'s fee computation.
    ///
    /// Deliberately distinct from [`LendingPool::get_utilization`], which
    /// returns 1.0 instead of 0 on the same zero-denominator case: the
    /// source keeps these as two different functions, and so do we.
    pub fn get_current_utilization(&self) -> f64 {
        safe_divide(self.borrowed_amount, self.borrowed_amount + self.available_amount)
    }

    /// Public utilization accessor used by agents/strategy; returns `1.0`
    /// when `available_amount == 0` rather than `0`.
    pub fn get_utilization(&self) -> f64 {
        if self.available_amount == 0.0 {
            1.0
        } else {
            self.borrowed_amount / (self.borrowed_amount + self.available_amount)
        }
    }

    pub fn active_loans(&self, now: i64) -> impl Iterator<Item = &Loan> {
        self.loans.values().filter(move |l| !l.paid && !l.is_expired(now))
    }

    pub fn loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans.values()
    }

    pub fn get_loan(&self, loan_id: &str) -> Option<&Loan> {
        self.loans.get(loan_id)
    }

    pub fn borrower_loan_ids(&self, borrower: &str) -> &[String] {
        self.borrower_loans.get(borrower).map_or(&[], Vec::as_slice)
    }

    /// Advances the pool by `dt`. Appends the tick's utilization to the
    /// in-progress cycle's history *before* checking the cycle boundary
    /// (so the final tick of a cycle contributes to both the closing
    /// average and the freshly reset state) and handles genesis->running
    /// promotion or running-cycle settlement when `now >= next_cycle_time`.
    pub fn take_step(&mut self, now: i64, price: f64) -> Vec<EventInfo> {
        self.utilizations.push(self.get_current_utilization());

        if now < self.next_cycle_time {
            self.is_new_cycle = false;
            return Vec::new();
        }

        let mut events = Vec::new();
        match self.status {
            LendingPoolStatus::Genesis => {
                self.status = LendingPoolStatus::Running;
                self.deposits = std::mem::take(&mut self.pending_deposits);
                self.cycle_count += 1;
                events.push(EventInfo {
                    message: format!("lending pool '{}' genesis period ended", self.name()),
                    time: now,
                    type_: "lending_pool_genesis_period_ended".to_string(),
                    extra: [("lending_pool".to_string(), self.name().into())]
                        .into_iter()
                        .collect(),
                });
            }
            LendingPoolStatus::Running => {
                self.cycle_count += 1;
                self.settle_cycle(now, price);
                events.push(EventInfo {
                    message: format!("lending pool '{}' running period ended", self.name()),
                    time: now,
                    type_: "lending_pool_running_period_ended".to_string(),
                    extra: [
                        ("cycle_number".to_string(), ((self.cycle_count - 1) as f64).into()),
                        ("lending_pool".to_string(), self.name().into()),
                    ]
                    .into_iter()
                    .collect(),
                });
            }
        }

        self.reset_cycle_bookkeeping();
        self.next_cycle_time += self.config.running_period;
        self.is_new_cycle = true;
        events
    }

    fn settle_cycle(&mut self, now: i64, price: f64) {
        let mut final_liquidity = HashMap::new();
        for (addr, &owned) in &self.deposits {
            let omega = safe_divide(owned, self.total_deposits);
            let liquidity_share = omega * self.available_amount;
            final_liquidity.insert(addr.clone(), liquidity_share);
            *self.reclaimed_collateral.entry(addr.clone()).or_insert(0.0) +=
                omega * self.total_collateral_locked;
        }

        for (addr, &ratio) in &self.signaled_withdrawals {
            if let Some(&liquidity) = final_liquidity.get(addr) {
                let withdrawn = liquidity * ratio;
                *self.pending_withdrawals.entry(addr.clone()).or_insert(0.0) += withdrawn;
                *final_liquidity.get_mut(addr).unwrap() -= withdrawn;
            }
        }

        let average_utilization = if self.utilizations.is_empty() {
            0.0
        } else {
            self.utilizations.iter().sum::<f64>() / self.utilizations.len() as f64
        };
        let running_period_days = self.config.running_period as f64 / SECONDS_PER_DAY as f64;
        let normalized_utilization = safe_divide(
            self.loans.values().map(Loan::get_size_days).sum(),
            self.total_deposits * running_period_days,
        );

        let reclaimed_this_cycle: f64 = self
            .loans
            .values()
            .filter(|l| l.is_expired(now) && !l.paid)
            .map(|l| l.collateral_amount)
            .sum();
        let fees_this_cycle: f64 = self.loans.values().filter(|l| l.paid).map(|l| l.borrowing_fee).sum();

        self.cycle_history.insert(
            self.cycle_count - 1,
            CycleData {
                cycle_index: self.cycle_count - 1,
                initial_liquidity: self.total_deposits,
                remaining_liquidity: self.available_amount,
                reclaimed_collateral: reclaimed_this_cycle,
                fees_earned: fees_this_cycle,
                final_price: price,
                average_utilization,
                normalized_utilization,
                loans: self.loans.values().cloned().collect(),
            },
        );

        let mut new_deposits = std::mem::take(&mut self.pending_deposits);
        for (addr, remaining) in final_liquidity {
            if remaining > 0.0 {
                *new_deposits.entry(addr).or_insert(0.0) += remaining;
            }
        }
        self.deposits = new_deposits;
    }

    fn reset_cycle_bookkeeping(&mut self) {
        self.pending_deposits.clear();
        self.signaled_withdrawals.clear();
        self.borrower_loans.clear();
        self.loans.clear();
        self.utilizations.clear();
        self.total_deposits = self.deposits.values().sum();
        self.available_amount = self.total_deposits;
        self.total_collateral_locked = 0.0;
        self.borrowed_amount = 0.0;
        self.total_fees_earned = 0.0;
    }

    pub fn deposit(&mut self, lender: &mut Wallet, amount: f64) -> Result<(), PoolError> {
        lender.debit_primary(amount).ok_or(PoolError::InsufficientBalance)?;
        *self.pending_deposits.entry(lender.address.clone()).or_insert(0.0) += amount;
        Ok(())
    }

    fn require_running(&self) -> Result<(), PoolError> {
        match self.status {
            LendingPoolStatus::Running => Ok(()),
            LendingPoolStatus::Genesis => Err(PoolError::NotRunning),
        }
    }

    pub fn signal_withdrawal(&mut self, lender_address: &str, ratio: f64) -> Result<(), PoolError> {
        self.require_running()?;
        if !self.deposits.contains_key(lender_address) {
            return Err(PoolError::NonExistingBorrowerAddress(lender_address.to_string()));
        }
        self.signaled_withdrawals.insert(lender_address.to_string(), ratio.clamp(0.0, 1.0));
        Ok(())
    }

    pub fn withdraw_liquidity(&mut self, lender: &mut Wallet, amount: f64) -> Result<(), PoolError> {
        let mut remaining = amount;
        if let Some(pending) = self.pending_deposits.get_mut(&lender.address) {
            let take = pending.min(remaining);
            *pending -= take;
            remaining -= take;
        }
        if remaining > 0.0 {
            if let Some(claimable) = self.pending_withdrawals.get_mut(&lender.address) {
                let take = claimable.min(remaining);
                *claimable -= take;
                remaining -= take;
            }
        }
        if remaining > 1e-9 {
            return Err(PoolError::InsufficientBalance);
        }
        lender.credit_primary(amount);
        Ok(())
    }

    pub fn withdraw_collateral(&mut self, lender: &mut Wallet, amount: f64) -> Result<(), PoolError> {
        let claimable = self.reclaimed_collateral.get_mut(&lender.address).ok_or(PoolError::InsufficientBalance)?;
        if *claimable < amount {
            return Err(PoolError::InsufficientBalance);
        }
        *claimable -= amount;
        lender.credit_secondary(amount);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn borrow(
        &mut self,
        borrower: &mut Wallet,
        price: f64,
        borrow_amount: f64,
        collateral_amount: f64,
        loan_period: i64,
        now: i64,
    ) -> Result<Loan, PoolError> {
        self.require_running()?;

        if borrow_amount < self.config.min_loan_amount {
            return Err(PoolError::LoanAmountTooLow);
        }
        let value = collateral_amount * price;
        if borrow_amount > value * self.config.max_ltv {
            return Err(PoolError::InsufficientCollateral {
                collateral_balance: collateral_amount,
                collateral_needed: borrow_amount / (self.config.max_ltv * price),
            });
        }
        if borrower.secondary_balance() < collateral_amount {
            return Err(PoolError::InsufficientBalance);
        }
        if self.available_amount < borrow_amount {
            return Err(PoolError::InsufficientLiquidity);
        }
        if loan_period < self.config.min_loan_period {
            return Err(PoolError::InvalidLoanPeriodShort);
        }
        if loan_period > self.next_cycle_time - now {
            return Err(PoolError::InvalidLoanPeriodLong);
        }

        let ltv = borrow_amount / value;
        let utilization = self.get_current_utilization();
        let fee = self
            .fee_model
            .get_fee(ltv, utilization, loan_period)
            .unwrap_or(0.0)
            * borrow_amount;
        let net = borrow_amount - fee;

        self.total_collateral_locked += collateral_amount;
        self.available_amount -= net;
        self.borrowed_amount += net;
        borrower.debit_secondary(collateral_amount).ok_or(PoolError::InsufficientBalance)?;
        borrower.credit_primary(net);

        let expiration_time = now + loan_period;
        let loan_id = format!("{}-{}-{}", self.name(), borrower.address, expiration_time);
        let loan = Loan::new(
            loan_id.clone(),
            borrower.address.clone(),
            now,
            expiration_time,
            collateral_amount,
            price,
            borrow_amount,
            fee,
        );
        self.loans.insert(loan_id.clone(), loan.clone());
        self.borrower_loans.entry(borrower.address.clone()).or_default().push(loan_id);
        Ok(loan)
    }

    pub fn repay(&mut self, borrower: &mut Wallet, loan_id: &str, now: i64) -> Result<(), PoolError> {
        self.require_running()?;
        let loan = self.loans.get(loan_id).ok_or_else(|| PoolError::InvalidLoanId(loan_id.to_string()))?;
        if loan.borrower_address != borrower.address {
            return Err(PoolError::InvalidLoanId(loan_id.to_string()));
        }
        if loan.is_expired(now) {
            return Err(PoolError::LoanExpired(loan_id.to_string()));
        }
        if borrower.primary_balance() < loan.total_debt {
            return Err(PoolError::InsufficientBalance);
        }

        let (total_debt, net_loan, collateral_amount, borrowing_fee) =
            (loan.total_debt, loan.net_loan, loan.collateral_amount, loan.borrowing_fee);

        self.available_amount += total_debt;
        self.borrowed_amount -= net_loan;
        self.total_collateral_locked -= collateral_amount;
        self.total_fees_earned += borrowing_fee;
        borrower.debit_primary(total_debt).ok_or(PoolError::InsufficientBalance)?;
        borrower.credit_secondary(collateral_amount);

        if let Some(ids) = self.borrower_loans.get_mut(&borrower.address) {
            ids.retain(|id| id != loan_id);
        }
        self.loans.get_mut(loan_id).unwrap().paid = true;
        Ok(())
    }
}
