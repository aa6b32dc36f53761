use anchor_lang::prelude::*;
use crate::error::ErrorCode;
use crate::math::{mul_div_down, ratio_bps, WAD};
use crate::state::HarvestEntry;
use crate::vault::{Deployment, TierVault};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationView {
    pub strategy: Pubkey,
    pub assets: u128,
    pub pct_bps: u32,       // Share of the allocated capital
    pub apy_bps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApyView {
    pub apy_bps: u32,
    /// Tier fallback, nothing allocated yet
    pub estimated: bool,
}

// READ-ONLY SURFACE: everything the dashboard and keepers query
impl TierVault {
    pub fn total_assets(&self) -> u128 {
        self.ledger.total_assets
    }

    pub fn total_supply(&self) -> u128 {
        self.ledger.total_shares
    }

    pub fn balance_of(&self, owner: &Pubkey) -> u128 {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    pub fn convert_to_shares(&self, assets: u128) -> Result<u128> {
        self.ledger.convert_to_shares(assets)
    }

    pub fn convert_to_assets(&self, shares: u128) -> Result<u128> {
        self.ledger.convert_to_assets(shares)
    }

    pub fn preview_deposit(&self, assets: u128) -> Result<u128> {
        self.ledger.convert_to_shares(assets)
    }

    pub fn preview_redeem(&self, shares: u128) -> Result<u128> {
        self.ledger.convert_to_assets(shares)
    }

    pub fn preview_withdraw(&self, assets: u128) -> Result<u128> {
        self.ledger.shares_for_withdrawal(assets)
    }

    /// Value of the owner's shares, capped by what the vault can reach
    pub fn max_withdraw(&self, owner: &Pubkey) -> Result<u128> {
        let owed = self.ledger.convert_to_assets(self.balance_of(owner))?;
        let reachable = self.ledger.idle_buffer
            .checked_add(self.managed_assets())
            .ok_or(ErrorCode::MathOverflow)?;
        Ok(owed.min(reachable))
    }

    /// Assets backing one whole share (1e18 units)
    pub fn share_price(&self) -> Result<u128> {
        self.ledger.convert_to_assets(WAD)
    }

    pub fn strategy_addresses(&self) -> Vec<Pubkey> {
        self.strategy_records().map(|record| record.strategy_id).collect()
    }

    /// Current targets in bps, active strategies in registration order
    pub fn targets(&self) -> Vec<(Pubkey, u32)> {
        self.target_allocations()
            .into_iter()
            .map(|(index, target)| (self.strategies[index].record.strategy_id, target))
            .collect()
    }

    pub fn allocations(&self) -> Result<Vec<AllocationView>> {
        let allocated = self.managed_assets();
        self.strategy_records()
            .filter(|record| record.active)
            .map(|record| {
                Ok(AllocationView {
                    strategy: record.strategy_id,
                    assets: record.current_assets,
                    pct_bps: ratio_bps(record.current_assets, allocated)?,
                    apy_bps: record.apy_bps,
                })
            })
            .collect()
    }

    /// Allocation-weighted APY of the capital at work
    pub fn weighted_apy(&self) -> Result<ApyView> {
        let allocated = self.managed_assets();
        if allocated == 0 {
            return Ok(ApyView { apy_bps: self.config.fallback_apy_bps, estimated: true });
        }

        let mut weighted = 0u128;
        for record in self.strategy_records().filter(|record| record.active) {
            let contribution = mul_div_down(record.current_assets, record.apy_bps as u128, allocated)?;
            weighted = weighted.checked_add(contribution).ok_or(ErrorCode::MathOverflow)?;
        }
        let apy_bps = u32::try_from(weighted).map_err(|_| ErrorCode::MathOverflow)?;
        Ok(ApyView { apy_bps, estimated: false })
    }

    /// Executed harvests of this tier, newest first
    pub fn recent_harvests(&self, limit: usize) -> Vec<HarvestEntry> {
        self.harvest_log.iter().rev().take(limit).copied().collect()
    }
}

impl Deployment {
    /// Harvest feed across both tiers, newest first
    pub fn recent_harvests(&self, limit: usize) -> Vec<HarvestEntry> {
        let mut merged: Vec<HarvestEntry> = self.balanced.harvest_log
            .iter()
            .chain(self.aggressive.harvest_log.iter())
            .copied()
            .collect();
        merged.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        merged.truncate(limit);
        merged
    }
}
