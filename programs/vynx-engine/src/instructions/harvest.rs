use anchor_lang::prelude::*;
use crate::error::ErrorCode;
use crate::events::{HarvestExecuted, HarvestFailed};
use crate::math::bps_of;
use crate::strategy::StrategyOutcome;
use crate::vault::TierVault;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestedProfit {
    pub profit: u128,
    pub keeper_fee: u128,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestReport {
    pub outcomes: Vec<(Pubkey, StrategyOutcome<HarvestedProfit>)>,
    pub executed: Vec<HarvestExecuted>,
    pub failed: Vec<HarvestFailed>,
    pub total_profit: u128,
    pub total_keeper_fees: u128,
}

impl TierVault {
    /// Harvests every active strategy inside its own failure boundary.
    /// Profit is compounded into `total_assets` without minting shares.
    pub fn harvest(&mut self, keeper: Pubkey) -> Result<HarvestReport> {
        require!(self.mode.accepts_harvests(), ErrorCode::HarvestPaused);
        require!(keeper != Pubkey::default(), ErrorCode::InvalidAddress);

        self.refresh();
        let fee_bps = if self.is_official_keeper(&keeper) { 0 } else { self.config.keeper_fee_bps };
        let min_profit = self.config.min_profit_for_harvest;

        let outcomes = self.for_each_active("harvest", |vault, index| {
            vault.harvest_strategy(index, keeper, fee_bps, min_profit)
        });

        let mut report = HarvestReport::default();
        for (strategy, outcome) in &outcomes {
            match outcome {
                StrategyOutcome::Completed(harvested) => {
                    report.total_profit = report.total_profit.saturating_add(harvested.profit);
                    report.total_keeper_fees = report.total_keeper_fees.saturating_add(harvested.keeper_fee);
                    report.executed.push(HarvestExecuted {
                        strategy: *strategy,
                        profit: harvested.profit,
                        keeper,
                        keeper_fee: harvested.keeper_fee,
                    });
                }
                StrategyOutcome::Failed(_) => {
                    emit!(HarvestFailed { strategy: *strategy });
                    report.failed.push(HarvestFailed { strategy: *strategy });
                }
                StrategyOutcome::Skipped => {}
            }
        }
        report.outcomes = outcomes;

        msg!(
            "Harvest: tier={}, keeper={}, harvested={}, failed={}, profit={}, fees={}",
            self.tier.name(), keeper, report.executed.len(), report.failed.len(),
            report.total_profit, report.total_keeper_fees
        );
        Ok(report)
    }

    fn harvest_strategy(
        &mut self,
        index: usize,
        keeper: Pubkey,
        fee_bps: u32,
        min_profit: u128,
    ) -> Result<Option<HarvestedProfit>> {
        let strategy = self.strategies[index].record.strategy_id;

        // ANTI-SPAM GATE: net of what this keeper would be paid
        let estimated = self.strategies[index].adapter.pending_profit()?;
        let estimated_fee = bps_of(estimated, fee_bps)?;
        if estimated - estimated_fee < min_profit {
            msg!("Harvest skipped for {}: net profit {} below {}", strategy, estimated - estimated_fee, min_profit);
            return Ok(None);
        }

        let profit = self.strategies[index].adapter.harvest()?;
        // Book the position as the adapter reports it; rewards it already
        // counted before the harvest must not be added a second time
        match self.strategies[index].adapter.total_assets() {
            Ok(observed) => self.apply_observed_assets(index, observed),
            Err(err) => {
                msg!("Strategy {} not re-read after harvest ({}), booking reported profit", strategy, err);
                let record = &mut self.strategies[index].record;
                record.current_assets = record.current_assets
                    .checked_add(profit)
                    .ok_or(ErrorCode::MathOverflow)?;
                self.ledger.total_assets = self.ledger.total_assets
                    .checked_add(profit)
                    .ok_or(ErrorCode::MathOverflow)?;
            }
        }
        let record = &mut self.strategies[index].record;
        record.total_harvested = record.total_harvested.saturating_add(profit);

        // Fee comes out of the compounded position; a failed pull forfeits it
        let fee = bps_of(profit, fee_bps)?;
        let mut keeper_fee = 0;
        if fee > 0 {
            match self.strategy_withdraw(index, fee) {
                Ok(delivered) => {
                    self.ledger.idle_buffer -= delivered;
                    self.ledger.total_assets -= delivered;
                    *self.keeper_rewards.entry(keeper).or_insert(0) += delivered;
                    keeper_fee = delivered;
                }
                Err(err) => msg!("Keeper fee for {} not paid: {}", strategy, err),
            }
        }

        msg!("Harvested {} from {}, keeper_fee={}", profit, strategy, keeper_fee);
        self.log_harvest(strategy, profit, keeper, keeper_fee);
        emit!(HarvestExecuted { strategy, profit, keeper, keeper_fee });
        Ok(Some(HarvestedProfit { profit, keeper_fee }))
    }
}
