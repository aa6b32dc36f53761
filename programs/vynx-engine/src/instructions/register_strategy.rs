use anchor_lang::prelude::*;
use crate::error::ErrorCode;
use crate::state::*;
use crate::strategy::{ApySource, Strategy, StrategySlot};
use crate::vault::TierVault;

impl TierVault {
    pub fn register_strategy(
        &mut self,
        caller: Pubkey,
        strategy_id: Pubkey,
        protocol: ProtocolKind,
        adapter: Box<dyn Strategy>,
        apy: ApySource,
    ) -> Result<()> {
        // SECURITY VALIDATIONS
        self.ensure_operator(&caller)?;
        require!(strategy_id != Pubkey::default(), ErrorCode::InvalidAddress);
        require!(self.strategy(&strategy_id).is_none(), ErrorCode::DuplicateStrategy);
        require!(
            self.strategies.len() < self.config.max_strategies as usize,
            ErrorCode::TooManyStrategies
        );

        // A fresh adapter must not bring assets the ledger never accounted for
        let held = adapter.total_assets().map_err(|_| ErrorCode::StrategyCallFailed)?;
        require!(held == 0, ErrorCode::StrategyNotEmpty);

        let apy_bps = apy.current_bps();
        self.strategies.push(StrategySlot {
            record: StrategyRecord::new(strategy_id, protocol, apy_bps),
            adapter,
            apy,
        });

        msg!(
            "Strategy registered: tier={}, id={}, protocol={}, apy={}bps",
            self.tier.name(), strategy_id, protocol.get_protocol_name(), apy_bps
        );
        Ok(())
    }

    /// Drains the strategy into the idle buffer, then excludes it from allocation
    pub fn deactivate_strategy(&mut self, caller: Pubkey, strategy_id: Pubkey) -> Result<u128> {
        self.ensure_operator(&caller)?;
        let index = self.index_of(&strategy_id)?;
        require!(self.strategies[index].record.active, ErrorCode::StrategyInactive);

        let held = self.strategies[index]
            .adapter
            .total_assets()
            .map_err(|_| ErrorCode::StrategyCallFailed)?;
        self.apply_observed_assets(index, held);

        let recovered = if held > 0 {
            self.strategy_withdraw(index, held)
                .map_err(|_| ErrorCode::StrategyCallFailed)?
        } else {
            0
        };

        // Whatever the adapter still reports after the pull is no longer reachable
        let record = &mut self.strategies[index].record;
        self.ledger.total_assets = self.ledger.total_assets.saturating_sub(record.current_assets);
        record.current_assets = 0;
        record.active = false;

        msg!("Strategy deactivated: id={}, recovered={}", strategy_id, recovered);
        Ok(recovered)
    }

    pub fn activate_strategy(&mut self, caller: Pubkey, strategy_id: Pubkey) -> Result<()> {
        self.ensure_operator(&caller)?;
        let index = self.index_of(&strategy_id)?;
        let slot = &mut self.strategies[index];
        slot.record.active = true;
        slot.record.apy_bps = slot.apy.current_bps();

        msg!("Strategy activated: id={}", strategy_id);
        Ok(())
    }

    /// Configured APYs are a deployment concern; the operator refreshes them here
    pub fn update_fixed_apy(&mut self, caller: Pubkey, strategy_id: Pubkey, apy_bps: u32) -> Result<()> {
        self.ensure_operator(&caller)?;
        let index = self.index_of(&strategy_id)?;
        let slot = &mut self.strategies[index];
        slot.apy.set_base_bps(apy_bps);
        slot.record.apy_bps = slot.apy.current_bps();

        msg!("Strategy APY updated: id={}, base={}bps, effective={}bps", strategy_id, apy_bps, slot.record.apy_bps);
        Ok(())
    }

    /// Official keepers run maintenance without collecting a reward
    pub fn set_official_keeper(&mut self, caller: Pubkey, keeper: Pubkey, official: bool) -> Result<()> {
        self.ensure_operator(&caller)?;
        require!(keeper != Pubkey::default(), ErrorCode::InvalidAddress);
        if official {
            self.official_keepers.insert(keeper);
        } else {
            self.official_keepers.remove(&keeper);
        }
        msg!("Official keeper {} set to {}", keeper, official);
        Ok(())
    }
}
