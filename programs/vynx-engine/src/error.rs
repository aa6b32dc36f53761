use anchor_lang::prelude::*;

#[error_code]
pub enum ErrorCode {
    #[msg("Amount must be greater than zero")]
    InvalidAmount,

    #[msg("Deposit is below the tier minimum")]
    DepositTooSmall,

    #[msg("Address cannot be the default pubkey")]
    InvalidAddress,

    #[msg("Tier already holds the maximum number of strategies")]
    TooManyStrategies,

    #[msg("Strategy is already registered")]
    DuplicateStrategy,

    #[msg("Strategy not found")]
    StrategyNotFound,

    #[msg("Strategy is not active")]
    StrategyInactive,

    #[msg("Strategy still holds assets")]
    StrategyNotEmpty,

    #[msg("Owner does not hold enough shares")]
    InsufficientShares,

    #[msg("Idle buffer and strategies cannot cover the withdrawal")]
    InsufficientLiquidity,

    #[msg("Arithmetic overflow or division by zero")]
    MathOverflow,

    #[msg("Deposits are disabled while the vault is not in normal mode")]
    DepositsPaused,

    #[msg("Harvests are disabled while the vault is not in normal mode")]
    HarvestPaused,

    #[msg("Vault mode transition is not allowed from the current mode")]
    InvalidModeTransition,

    #[msg("Unauthorized: caller is not the tier operator")]
    Unauthorized,

    #[msg("Tier configuration is inconsistent")]
    InvalidConfig,

    #[msg("External strategy call reverted")]
    StrategyCallFailed,

    #[msg("Swap output is below the minimum accepted amount")]
    SlippageExceeded,

    #[msg("Router kept a residual balance after the call")]
    RouterResidualBalance,

    #[msg("Rate source returned no data")]
    RateUnavailable,

    #[msg("Vault holds no assets against outstanding shares")]
    VaultInsolvent,
}
