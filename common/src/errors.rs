use thiserror::Error;

/// Raised while assembling a protocol/pool/strategy before a run starts.
/// Always fatal.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("a lending pool named '{0}' already exists")]
    ExistingName(String),
    #[error("genesis_period must be non-negative and running_period must be positive")]
    InvalidPeriod,
    #[error("max_ltv must be in (0, 1]")]
    InvalidMaxLtv,
    #[error("max_liquidity must be positive")]
    InvalidMaxLiquidity,
    #[error("unknown distribution name '{0}'")]
    DistributionNotFound(String),
    #[error("missing or malformed field '{0}' in strategy config")]
    MissingField(String),
    #[error("unsupported coin symbol '{0}'")]
    UnsupportedCoin(String),
    #[error("unsupported currency '{0}'")]
    UnsupportedCurrency(String),
}

/// Raised by a [`crate::loan`]/pool operation when a precondition doesn't
/// hold. Agents are expected to preflight every one of these; seeing one
/// propagate to the engine indicates a bug in the calling agent, not a
/// recoverable runtime condition.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PoolError {
    #[error("lending pool is not running yet")]
    NotRunning,
    #[error("lending pool is already running")]
    AlreadyRunning,
    #[error("borrower '{0}' has no open positions")]
    NonExistingBorrowerAddress(String),
    #[error("loan id '{0}' does not exist")]
    InvalidLoanId(String),
    #[error("loan '{0}' has already expired")]
    LoanExpired(String),
    #[error("requested loan amount is below the pool minimum")]
    LoanAmountTooLow,
    #[error("requested loan period exceeds the pool maximum, or crosses the next cycle boundary")]
    InvalidLoanPeriodLong,
    #[error("requested loan period is below the pool minimum")]
    InvalidLoanPeriodShort,
    #[error("insufficient pool liquidity to fund this loan")]
    InsufficientLiquidity,
    #[error("wallet balance is insufficient for this operation")]
    InsufficientBalance,
    #[error("collateral balance {collateral_balance} is insufficient; {collateral_needed} needed")]
    InsufficientCollateral {
        collateral_balance: f64,
        collateral_needed: f64,
    },
}

/// Raised by a fee model when evaluated outside its numerical domain, or
/// when there isn't enough price history to estimate its parameters.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeeModelError {
    #[error("utilization {0} is outside [0, 1]")]
    UtilizationOutOfDomain(f64),
    #[error("need at least 2 price-history points to estimate volatility, got {0}")]
    InsufficientHistory(usize),
}

/// Raised by the price-history store and its CoinGecko collaborator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PriceDataError {
    #[error("requested range spans more than 90 days, which the market-chart API rejects")]
    Granularity,
    #[error("no price data available for symbol '{0}'")]
    PriceNotFound(String),
    #[error("{0}")]
    Io(String),
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    FeeModel(#[from] FeeModelError),
    #[error(transparent)]
    PriceData(#[from] PriceDataError),
}
