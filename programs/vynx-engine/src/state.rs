use anchor_lang::prelude::*;
use crate::error::ErrorCode;
use crate::math::{mul_div_down, mul_div_up, BPS_DENOMINATOR, WAD};

/// Hard ceiling on strategies per tier, whatever the tier config asks for
pub const MAX_STRATEGIES_CAP: u8 = 20;
pub const MAX_KEEPER_FEE_BPS: u32 = 1_000;
/// Harvests kept per tier for the dashboard feed
pub const HARVEST_LOG_CAPACITY: usize = 32;
/// Keeper payouts never push `total_assets` below this share of `total_shares`
pub const SOLVENCY_FLOOR_BPS: u32 = 9_900;

// Fixed APY estimates per protocol family (basis points)
pub const LIQUID_STAKING_APY_BPS: u32 = 400;
pub const STABLE_SWAP_LP_APY_BPS: u32 = 350;
pub const CONCENTRATED_LIQUIDITY_APY_BPS: u32 = 800;

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tier {
    Balanced,
    Aggressive,
}

impl Tier {
    pub fn name(&self) -> &'static str {
        match self {
            Tier::Balanced => "balanced",
            Tier::Aggressive => "aggressive",
        }
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum VaultMode {
    Normal,      // Deposits, harvests, allocation and rebalancing enabled
    Paused,      // Deposits and harvests blocked, withdrawals still served
    Draining,    // Emergency exit ran, capital pulled back into the idle buffer
    Reconciled,  // Bookkeeping synced against idle capital, waiting for the operator
}

impl VaultMode {
    pub fn accepts_deposits(&self) -> bool {
        *self == VaultMode::Normal
    }

    pub fn accepts_harvests(&self) -> bool {
        *self == VaultMode::Normal
    }

    pub fn can_transition_to(&self, next: VaultMode) -> bool {
        matches!(
            (self, next),
            (VaultMode::Normal, VaultMode::Paused)
                | (VaultMode::Paused, VaultMode::Normal)
                | (VaultMode::Paused, VaultMode::Draining)
                | (VaultMode::Draining, VaultMode::Reconciled)
                | (VaultMode::Reconciled, VaultMode::Normal)
        )
    }
}

/// Order in which `withdraw_to` pulls capital back out of strategies
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum WithdrawPriority {
    /// Most over-allocated strategy first, registration order on ties
    OverAllocation,
    /// Fixed sequence set by the operator; unlisted strategies go last in registration order
    Configured(Vec<Pubkey>),
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolKind {
    LiquidStaking,          // Liquid-staking token issuer
    Lending,                // Lending pool supply position, live rate
    StableSwapLp,           // Stable-swap AMM liquidity
    ConcentratedLiquidity,  // Concentrated-liquidity position manager
}

impl ProtocolKind {
    pub fn get_protocol_name(&self) -> &'static str {
        match self {
            ProtocolKind::LiquidStaking => "Liquid Staking",
            ProtocolKind::Lending => "Lending",
            ProtocolKind::StableSwapLp => "Stable-Swap LP",
            ProtocolKind::ConcentratedLiquidity => "Concentrated Liquidity",
        }
    }

    /// Configured APY for protocol families without a live rate. The lending
    /// strategy holds the staking token, so its base is the staking yield.
    pub fn default_apy_bps(&self) -> u32 {
        match self {
            ProtocolKind::LiquidStaking => LIQUID_STAKING_APY_BPS,
            ProtocolKind::Lending => LIQUID_STAKING_APY_BPS,
            ProtocolKind::StableSwapLp => STABLE_SWAP_LP_APY_BPS,
            ProtocolKind::ConcentratedLiquidity => CONCENTRATED_LIQUIDITY_APY_BPS,
        }
    }
}

/// Risk parameters of one tier. Immutable once the vault is initialized.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct TierConfig {
    pub idle_threshold: u128,              // Idle WETH that triggers an allocation
    pub min_tvl_for_rebalance: u128,       // Managed WETH below which rebalancing is pointless
    pub rebalance_threshold_bps: u32,      // Minimum APY spread that justifies a rebalance
    pub min_profit_for_harvest: u128,      // Net profit floor per strategy harvest
    pub max_alloc_bps: u32,                // Ceiling on a single strategy's share
    pub min_alloc_bps: u32,                // Floor on a single strategy's share
    pub max_strategies: u8,                // Registry size limit
    pub min_deposit: u128,                 // Dust protection on deposits
    pub keeper_fee_bps: u32,               // Reward paid to non-official keepers
    pub allocation_tolerance_bps: u32,     // Deviation from target treated as "on target"
    pub withdraw_priority: WithdrawPriority,
    pub fallback_apy_bps: u32,             // Headline APY shown while nothing is allocated
}

impl TierConfig {
    pub fn balanced() -> Self {
        TierConfig {
            idle_threshold: 8 * WAD,
            min_tvl_for_rebalance: 8 * WAD,
            rebalance_threshold_bps: 200,
            min_profit_for_harvest: WAD / 100 * 8,   // 0.08 WETH
            max_alloc_bps: 5_000,
            min_alloc_bps: 2_000,
            max_strategies: 10,
            min_deposit: WAD / 100,                  // 0.01 WETH
            keeper_fee_bps: 100,
            allocation_tolerance_bps: 10,
            withdraw_priority: WithdrawPriority::OverAllocation,
            fallback_apy_bps: 520,
        }
    }

    pub fn aggressive() -> Self {
        TierConfig {
            idle_threshold: 12 * WAD,
            min_tvl_for_rebalance: 12 * WAD,
            rebalance_threshold_bps: 200,
            min_profit_for_harvest: WAD / 100 * 12,  // 0.12 WETH
            max_alloc_bps: 7_000,
            min_alloc_bps: 1_000,
            max_strategies: 10,
            min_deposit: WAD / 100,
            keeper_fee_bps: 100,
            allocation_tolerance_bps: 10,
            withdraw_priority: WithdrawPriority::OverAllocation,
            fallback_apy_bps: 1_140,
        }
    }

    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Balanced => TierConfig::balanced(),
            Tier::Aggressive => TierConfig::aggressive(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let denominator = BPS_DENOMINATOR as u32;
        require!(self.max_alloc_bps > 0 && self.max_alloc_bps <= denominator, ErrorCode::InvalidConfig);
        require!(self.min_alloc_bps <= self.max_alloc_bps, ErrorCode::InvalidConfig);
        require!(self.rebalance_threshold_bps > 0, ErrorCode::InvalidConfig);
        require!(
            self.max_strategies > 0 && self.max_strategies <= MAX_STRATEGIES_CAP,
            ErrorCode::InvalidConfig
        );
        require!(self.min_deposit > 0, ErrorCode::InvalidConfig);
        require!(self.keeper_fee_bps <= MAX_KEEPER_FEE_BPS, ErrorCode::InvalidConfig);
        require!(self.allocation_tolerance_bps < denominator, ErrorCode::InvalidConfig);

        if let WithdrawPriority::Configured(order) = &self.withdraw_priority {
            for (index, id) in order.iter().enumerate() {
                require!(*id != Pubkey::default(), ErrorCode::InvalidAddress);
                require!(!order[..index].contains(id), ErrorCode::DuplicateStrategy);
            }
        }
        Ok(())
    }
}

/// One executed harvest. `sequence` is process-wide, so logs of both tiers
/// merge into a single newest-first feed.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct HarvestEntry {
    pub sequence: u64,
    pub tier: Tier,
    pub strategy: Pubkey,
    pub profit: u128,
    pub keeper: Pubkey,
    pub keeper_fee: u128,
}

/// ERC-4626 style ledger. `total_shares` moves only on mint and burn.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VaultLedger {
    pub total_assets: u128,
    pub total_shares: u128,
    pub idle_buffer: u128,
}

impl VaultLedger {
    /// Shares minted for `assets`, rounded down. Empty vault is 1:1.
    /// Shares left over after a total loss cannot be priced.
    pub fn convert_to_shares(&self, assets: u128) -> Result<u128> {
        if self.total_shares == 0 {
            return Ok(assets);
        }
        require!(self.total_assets > 0, ErrorCode::VaultInsolvent);
        mul_div_down(assets, self.total_shares, self.total_assets)
    }

    /// Assets owed for `shares`, rounded down. Empty vault is 1:1.
    pub fn convert_to_assets(&self, shares: u128) -> Result<u128> {
        if self.total_shares == 0 {
            return Ok(shares);
        }
        mul_div_down(shares, self.total_assets, self.total_shares)
    }

    /// Shares burned to release exactly `assets`, rounded up
    pub fn shares_for_withdrawal(&self, assets: u128) -> Result<u128> {
        if self.total_shares == 0 {
            return Ok(assets);
        }
        require!(self.total_assets > 0, ErrorCode::VaultInsolvent);
        mul_div_up(assets, self.total_shares, self.total_assets)
    }

    /// What keepers may still be paid before `SOLVENCY_FLOOR_BPS` is reached
    pub fn payout_headroom(&self) -> Result<u128> {
        let floor = mul_div_up(self.total_shares, SOLVENCY_FLOOR_BPS as u128, BPS_DENOMINATOR)?;
        Ok(self.total_assets.saturating_sub(floor))
    }

    pub fn managed_assets(&self) -> u128 {
        self.total_assets.saturating_sub(self.idle_buffer)
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct StrategyRecord {
    pub strategy_id: Pubkey,            // Adapter address
    pub protocol: ProtocolKind,         // Protocol family wrapped by the adapter
    pub current_assets: u128,           // WETH-equivalent held, as last read
    pub apy_bps: u32,                   // APY as last read
    pub active: bool,                   // Participates in allocation and harvest
    pub total_deposited: u128,          // Lifetime deposits into the adapter
    pub total_withdrawn: u128,          // Lifetime withdrawals from the adapter
    pub total_harvested: u128,          // Lifetime gross profit reported by harvest
}

impl StrategyRecord {
    pub fn new(strategy_id: Pubkey, protocol: ProtocolKind, apy_bps: u32) -> Self {
        StrategyRecord {
            strategy_id,
            protocol,
            current_assets: 0,
            apy_bps,
            active: true,
            total_deposited: 0,
            total_withdrawn: 0,
            total_harvested: 0,
        }
    }
}
