use lendsim_common::fee::{BlackScholesFeeModel, FeeModel};
use lendsim_common::wallet::Wallet;

use crate::environment::Environment;
use crate::pool::LendingPoolConfig;
use crate::protocol::Protocol;
use crate::records::ActionInfo;

/// Static scheduling priority: pool manager runs first, then lenders, then
/// borrowers, so a borrower never observes a cycle transition the manager
/// hasn't already reacted to.
pub const PRIORITY_POOL_MANAGER: u8 = 0;
pub const PRIORITY_LENDER: u8 = 1;
pub const PRIORITY_BORROWER: u8 = 2;

#[derive(Clone, Debug)]
pub enum Agent {
    PoolManager(PoolManagerAgent),
    Lender(LenderAgent),
    Borrower(BorrowerAgent),
}

impl Agent {
    pub fn priority(&self) -> u8 {
        match self {
            Self::PoolManager(_) => PRIORITY_POOL_MANAGER,
            Self::Lender(_) => PRIORITY_LENDER,
            Self::Borrower(_) => PRIORITY_BORROWER,
        }
    }

    pub fn act(&mut self, protocol: &mut Protocol, environment: &Environment, now: i64) -> Vec<ActionInfo> {
        match self {
            Self::PoolManager(a) => a.act(protocol, environment, now),
            Self::Lender(a) => a.act(protocol, now),
            Self::Borrower(a) => a.act(protocol, environment, now),
        }
    }
}

/// How the pool manager refreshes its fee model's parameters. Only the
/// Black-Scholes model has parameters worth periodically re-estimating
/// from price history; the others are effectively static once constructed,
/// so `NoOp` skips the recompute but the manager still emits
/// `update_fee_parameters` on schedule (matching the source, which always
/// fires the update tick regardless of whether the model has anything new
/// to report).
#[derive(Clone, Copy, Debug)]
pub enum FeeParameterUpdate {
    BlackScholes {
        lookback_seconds: i64,
        volatility_factor: f64,
        risk_free_rate: f64,
    },
    NoOp,
}

#[derive(Clone, Debug)]
pub struct PoolManagerAgent {
    pub pool_config: Option<LendingPoolConfig>,
    pub initial_fee_model: FeeModel,
    pub update_plan: FeeParameterUpdate,
    pub parameter_update_period: i64,
    next_parameter_update: i64,
    pool_created: bool,
}

impl PoolManagerAgent {
    pub fn new(
        pool_config: LendingPoolConfig,
        initial_fee_model: FeeModel,
        update_plan: FeeParameterUpdate,
        parameter_update_period: i64,
        now: i64,
    ) -> Self {
        Self {
            pool_config: Some(pool_config),
            initial_fee_model,
            update_plan,
            parameter_update_period,
            next_parameter_update: now,
            pool_created: false,
        }
    }

    fn act(&mut self, protocol: &mut Protocol, environment: &Environment, now: i64) -> Vec<ActionInfo> {
        let mut actions = Vec::new();

        if !self.pool_created {
            if let Some(config) = self.pool_config.take() {
                let name = config.name.clone();
                if protocol
                    .create_lending_pool(config, self.initial_fee_model.clone(), now)
                    .is_ok()
                {
                    self.pool_created = true;
                    actions.push(ActionInfo {
                        message: format!("created lending pool '{name}'"),
                        agent_id: "pool_manager".to_string(),
                        time: now,
                        type_: "create_lending_pool".to_string(),
                        extra: [("lending_pool".to_string(), name.into())].into_iter().collect(),
                    });
                }
            }
            return actions;
        }

        if now < self.next_parameter_update {
            return actions;
        }
        self.next_parameter_update += self.parameter_update_period;

        let Some(pool_name) = pool_name_for(protocol) else {
            return actions;
        };

        if let FeeParameterUpdate::BlackScholes {
            lookback_seconds,
            volatility_factor,
            risk_free_rate,
        } = self.update_plan
        {
            let history = environment.get_price_history(lookback_seconds);
            if let Ok(params) =
                BlackScholesFeeModel::get_parameters(&history, volatility_factor, risk_free_rate)
            {
                if let Some(pool) = protocol.get_lending_pool_mut(&pool_name) {
                    pool.fee_model.update_black_scholes_parameters(params);
                    actions.push(ActionInfo {
                        message: "updated fee model parameters".to_string(),
                        agent_id: "pool_manager".to_string(),
                        time: now,
                        type_: "update_fee_parameters".to_string(),
                        extra: [
                            ("volatility".to_string(), params.volatility.into()),
                            ("risk_free_rate".to_string(), params.risk_free_rate.into()),
                        ]
                        .into_iter()
                        .collect(),
                    });
                }
            }
        } else {
            actions.push(ActionInfo {
                message: "fee model parameters unchanged".to_string(),
                agent_id: "pool_manager".to_string(),
                time: now,
                type_: "update_fee_parameters".to_string(),
                extra: Default::default(),
            });
        }

        actions
    }
}

fn pool_name_for(protocol: &Protocol) -> Option<String> {
    protocol.first_pool_name().map(str::to_string)
}

#[derive(Clone, Debug)]
pub struct LenderAgent {
    pub wallet: Wallet,
    pub amount: f64,
    deposited: bool,
}

impl LenderAgent {
    pub fn new(wallet: Wallet, amount: f64) -> Self {
        Self {
            wallet,
            amount,
            deposited: false,
        }
    }

    fn act(&mut self, protocol: &mut Protocol, now: i64) -> Vec<ActionInfo> {
        if self.deposited {
            return Vec::new();
        }
        let Some(pool_name) = pool_name_for(protocol) else {
            return Vec::new();
        };
        let Some(pool) = protocol.get_lending_pool_mut(&pool_name) else {
            return Vec::new();
        };
        if pool.deposit(&mut self.wallet, self.amount).is_err() {
            return Vec::new();
        }
        self.deposited = true;
        vec![ActionInfo {
            message: format!("deposited {} into '{pool_name}'", self.amount),
            agent_id: self.wallet.address.clone(),
            time: now,
            type_: "deposit".to_string(),
            extra: [
                ("amount".to_string(), self.amount.into()),
                ("lending_pool".to_string(), pool_name.into()),
            ]
            .into_iter()
            .collect(),
        }]
    }
}

/// A pre-planned loan: when to start, for how long, at what size and LTV,
/// and how close to expiry the borrower will attempt repayment.
#[derive(Clone, Debug)]
pub struct BorrowerPlan {
    pub lending_pool: String,
    pub loan_size: f64,
    pub loan_start: i64,
    pub loan_duration: i64,
    pub ltv: f64,
    pub repay_margin: i64,
}

#[derive(Clone, Debug)]
pub struct BorrowerAgent {
    pub wallet: Wallet,
    pub plan: BorrowerPlan,
    loan_id: Option<String>,
    settled: bool,
}

impl BorrowerAgent {
    pub fn new(wallet: Wallet, plan: BorrowerPlan) -> Self {
        Self {
            wallet,
            plan,
            loan_id: None,
            settled: false,
        }
    }

    fn act(&mut self, protocol: &mut Protocol, environment: &Environment, now: i64) -> Vec<ActionInfo> {
        if self.settled {
            return Vec::new();
        }

        let Some(pool) = protocol.get_lending_pool_mut(&self.plan.lending_pool) else {
            return Vec::new();
        };

        if self.loan_id.is_none() {
            if now < self.plan.loan_start {
                return Vec::new();
            }
            if pool.available_amount < self.plan.loan_size
                || self.plan.loan_duration > pool.next_cycle_time - now
            {
                return Vec::new();
            }
            let price = environment.get_price();
            let collateral = self.plan.loan_size / (self.plan.ltv * price);
            self.wallet.credit_secondary(collateral);
            match pool.borrow(&mut self.wallet, price, self.plan.loan_size, collateral, self.plan.loan_duration, now) {
                Ok(loan) => {
                    self.loan_id = Some(loan.loan_id.clone());
                    return vec![ActionInfo {
                        message: format!("borrowed {} from '{}'", self.plan.loan_size, self.plan.lending_pool),
                        agent_id: self.wallet.address.clone(),
                        time: now,
                        type_: "borrow".to_string(),
                        extra: [
                            ("loan_id".to_string(), loan.loan_id.into()),
                            ("amount".to_string(), self.plan.loan_size.into()),
                            ("ltv".to_string(), self.plan.ltv.into()),
                        ]
                        .into_iter()
                        .collect(),
                    }];
                }
                Err(_) => {
                    self.wallet.debit_secondary(collateral);
                    return Vec::new();
                }
            }
        }

        let loan_id = self.loan_id.clone().unwrap();
        let Some(loan) = pool.get_loan(&loan_id).cloned() else {
            self.settled = true;
            return Vec::new();
        };
        if now < self.plan.loan_start + self.plan.loan_duration - self.plan.repay_margin {
            return Vec::new();
        }
        if loan.is_expired(now) {
            self.settled = true;
            return Vec::new();
        }

        let price = environment.get_price();
        if loan.collateral_amount * price > loan.total_debt {
            self.wallet.credit_primary(loan.borrowing_fee);
            match pool.repay(&mut self.wallet, &loan_id, now) {
                Ok(()) => {
                    self.settled = true;
                    vec![ActionInfo {
                        message: format!("repaid loan '{loan_id}'"),
                        agent_id: self.wallet.address.clone(),
                        time: now,
                        type_: "repay".to_string(),
                        extra: [("loan_id".to_string(), loan_id.into())].into_iter().collect(),
                    }]
                }
                Err(_) => Vec::new(),
            }
        } else {
            self.settled = true;
            vec![ActionInfo {
                message: format!("let loan '{loan_id}' expire"),
                agent_id: self.wallet.address.clone(),
                time: now,
                type_: "let_expire".to_string(),
                extra: [("loan_id".to_string(), loan_id.into())].into_iter().collect(),
            }]
        }
    }
}
