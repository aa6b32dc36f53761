use anchor_lang::prelude::*;
use crate::state::{Tier, VaultMode};

#[event]
#[derive(Debug, Clone, PartialEq)]
pub struct Deposited {
    pub tier: Tier,
    pub receiver: Pubkey,
    pub assets: u128,
    pub shares: u128,
    //--- ledger after the deposit
    pub total_assets: u128,
    pub total_shares: u128,
    pub idle_buffer: u128,
}

#[event]
#[derive(Debug, Clone, PartialEq)]
pub struct Withdrawn {
    pub tier: Tier,
    pub owner: Pubkey,
    pub receiver: Pubkey,
    pub assets: u128,
    pub shares: u128,
    pub pulled_from_strategies: u128,
    pub total_assets: u128,
    pub total_shares: u128,
}

#[event]
#[derive(Debug, Clone, PartialEq)]
pub struct Allocated {
    pub tier: Tier,
    pub strategy: Pubkey,
    pub amount: u128,
    pub strategy_assets: u128,
}

#[event]
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyCallFailed {
    pub tier: Tier,
    pub strategy: Pubkey,
    pub operation: String,
}

#[event]
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestExecuted {
    pub strategy: Pubkey,
    pub profit: u128,
    pub keeper: Pubkey,
    pub keeper_fee: u128,
}

#[event]
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestFailed {
    pub strategy: Pubkey,
}

#[event]
#[derive(Debug, Clone, PartialEq)]
pub struct Rebalanced {
    pub tier: Tier,
    pub keeper: Pubkey,
    pub spread_bps: u32,
    pub moved: u128,
    pub redeployed: u128,
    pub keeper_reward: u128,
}

#[event]
#[derive(Debug, Clone, PartialEq)]
pub struct ModeChanged {
    pub tier: Tier,
    pub from: VaultMode,
    pub to: VaultMode,
}

#[event]
#[derive(Debug, Clone, PartialEq)]
pub struct IdleBufferSynced {
    pub tier: Tier,
    pub previous_total_assets: u128,
    pub total_assets: u128,
    pub idle_buffer: u128,
}
