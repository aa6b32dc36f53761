use anchor_lang::prelude::*;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use crate::error::ErrorCode;
use crate::events::{ModeChanged, StrategyCallFailed};
use crate::state::*;
use crate::strategy::{StrategyOutcome, StrategySlot};

/// One tier's vault: ledger, strategy set and mode. Mutating operations take
/// `&mut self`, so a tier has a single writer at a time; tiers share nothing.
pub struct TierVault {
    pub(crate) tier: Tier,
    pub(crate) operator: Pubkey,
    pub(crate) config: TierConfig,
    pub(crate) ledger: VaultLedger,
    pub(crate) mode: VaultMode,
    pub(crate) strategies: Vec<StrategySlot>,                 // Registration order
    pub(crate) balances: BTreeMap<Pubkey, u128>,              // Shares per owner
    pub(crate) official_keepers: BTreeSet<Pubkey>,
    pub(crate) keeper_rewards: BTreeMap<Pubkey, u128>,        // Lifetime payouts per keeper
    pub(crate) harvest_log: VecDeque<HarvestEntry>,           // Oldest first, bounded
}

static HARVEST_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// The two risk tiers, constructed side by side and never sharing state
pub struct Deployment {
    pub balanced: TierVault,
    pub aggressive: TierVault,
}

impl Deployment {
    pub fn tier(&self, tier: Tier) -> &TierVault {
        match tier {
            Tier::Balanced => &self.balanced,
            Tier::Aggressive => &self.aggressive,
        }
    }

    pub fn tier_mut(&mut self, tier: Tier) -> &mut TierVault {
        match tier {
            Tier::Balanced => &mut self.balanced,
            Tier::Aggressive => &mut self.aggressive,
        }
    }
}

impl TierVault {
    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn operator(&self) -> Pubkey {
        self.operator
    }

    pub fn config(&self) -> &TierConfig {
        &self.config
    }

    pub fn ledger(&self) -> &VaultLedger {
        &self.ledger
    }

    pub fn mode(&self) -> VaultMode {
        self.mode
    }

    pub fn strategy_records(&self) -> impl Iterator<Item = &StrategyRecord> {
        self.strategies.iter().map(|slot| &slot.record)
    }

    pub fn strategy(&self, strategy_id: &Pubkey) -> Option<&StrategyRecord> {
        self.strategy_records().find(|record| record.strategy_id == *strategy_id)
    }

    pub fn is_official_keeper(&self, keeper: &Pubkey) -> bool {
        self.official_keepers.contains(keeper)
    }

    pub fn keeper_rewards(&self, keeper: &Pubkey) -> u128 {
        self.keeper_rewards.get(keeper).copied().unwrap_or(0)
    }

    /// Sum of recorded assets across active strategies
    pub fn managed_assets(&self) -> u128 {
        self.strategies
            .iter()
            .filter(|slot| slot.record.active)
            .map(|slot| slot.record.current_assets)
            .fold(0u128, |sum, assets| sum.saturating_add(assets))
    }

    /// `idle_buffer + Σ active strategy assets == total_assets`
    pub fn is_conserved(&self) -> bool {
        self.ledger.idle_buffer.checked_add(self.managed_assets()) == Some(self.ledger.total_assets)
    }

    /// Re-reads every active adapter and folds gains or losses into `total_assets`
    pub fn refresh(&mut self) {
        for index in self.active_indices() {
            let observed = self.strategies[index].adapter.total_assets();
            match observed {
                Ok(assets) => self.apply_observed_assets(index, assets),
                Err(err) => {
                    msg!(
                        "Refresh skipped for strategy {}: {}",
                        self.strategies[index].record.strategy_id, err
                    );
                }
            }
            let apy_bps = self.strategies[index].apy.current_bps();
            self.strategies[index].record.apy_bps = apy_bps;
        }
    }

    pub(crate) fn apply_observed_assets(&mut self, index: usize, observed: u128) {
        let record = &mut self.strategies[index].record;
        if observed >= record.current_assets {
            let gain = observed - record.current_assets;
            self.ledger.total_assets = self.ledger.total_assets.saturating_add(gain);
        } else {
            let loss = record.current_assets - observed;
            self.ledger.total_assets = self.ledger.total_assets.saturating_sub(loss);
        }
        record.current_assets = observed;
    }

    pub(crate) fn ensure_operator(&self, caller: &Pubkey) -> Result<()> {
        require!(*caller == self.operator, ErrorCode::Unauthorized);
        Ok(())
    }

    pub(crate) fn index_of(&self, strategy_id: &Pubkey) -> Result<usize> {
        self.strategies
            .iter()
            .position(|slot| slot.record.strategy_id == *strategy_id)
            .ok_or_else(|| ErrorCode::StrategyNotFound.into())
    }

    pub(crate) fn active_indices(&self) -> Vec<usize> {
        self.strategies
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.record.active)
            .map(|(index, _)| index)
            .collect()
    }

    pub(crate) fn set_mode(&mut self, next: VaultMode) -> Result<()> {
        require!(self.mode.can_transition_to(next), ErrorCode::InvalidModeTransition);
        let previous = self.mode;
        self.mode = next;

        msg!("Vault {} mode: {:?} -> {:?}", self.tier.name(), previous, next);
        emit!(ModeChanged { tier: self.tier, from: previous, to: next });
        Ok(())
    }

    /// Moves `amount` from the idle buffer into a strategy
    pub(crate) fn strategy_deposit(&mut self, index: usize, amount: u128) -> Result<()> {
        require!(amount <= self.ledger.idle_buffer, ErrorCode::InsufficientLiquidity);
        self.strategies[index].adapter.deposit(amount)?;

        let record = &mut self.strategies[index].record;
        record.current_assets = record.current_assets
            .checked_add(amount)
            .ok_or(ErrorCode::MathOverflow)?;
        record.total_deposited = record.total_deposited.saturating_add(amount);
        self.ledger.idle_buffer -= amount;
        Ok(())
    }

    /// Pulls up to `amount` from a strategy into the idle buffer, returns what arrived
    pub(crate) fn strategy_withdraw(&mut self, index: usize, amount: u128) -> Result<u128> {
        let delivered = self.strategies[index].adapter.withdraw(amount)?;

        let record = &mut self.strategies[index].record;
        if delivered > record.current_assets {
            // Adapter grew since the last read
            let gain = delivered - record.current_assets;
            self.ledger.total_assets = self.ledger.total_assets
                .checked_add(gain)
                .ok_or(ErrorCode::MathOverflow)?;
            record.current_assets = 0;
        } else {
            record.current_assets -= delivered;
        }
        record.total_withdrawn = record.total_withdrawn.saturating_add(delivered);
        self.ledger.idle_buffer = self.ledger.idle_buffer
            .checked_add(delivered)
            .ok_or(ErrorCode::MathOverflow)?;
        Ok(delivered)
    }

    pub(crate) fn log_harvest(&mut self, strategy: Pubkey, profit: u128, keeper: Pubkey, keeper_fee: u128) {
        let sequence = HARVEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        if self.harvest_log.len() == HARVEST_LOG_CAPACITY {
            self.harvest_log.pop_front();
        }
        self.harvest_log.push_back(HarvestEntry {
            sequence,
            tier: self.tier,
            strategy,
            profit,
            keeper,
            keeper_fee,
        });
    }

    pub(crate) fn record_strategy_failure(&self, index: usize, operation: &str, err: &anchor_lang::error::Error) {
        let strategy = self.strategies[index].record.strategy_id;
        msg!("Strategy {} failed during {}: {}", strategy, operation, err);
        emit!(StrategyCallFailed {
            tier: self.tier,
            strategy,
            operation: operation.to_string(),
        });
    }

    /// Runs `op` once per active strategy inside its own failure boundary.
    /// A failure is recorded and the loop moves on to the next strategy.
    pub(crate) fn for_each_active<T>(
        &mut self,
        operation: &str,
        mut op: impl FnMut(&mut TierVault, usize) -> Result<Option<T>>,
    ) -> Vec<(Pubkey, StrategyOutcome<T>)> {
        let mut outcomes = Vec::new();
        for index in self.active_indices() {
            let strategy = self.strategies[index].record.strategy_id;
            let outcome = match op(self, index) {
                Ok(Some(value)) => StrategyOutcome::Completed(value),
                Ok(None) => StrategyOutcome::Skipped,
                Err(err) => {
                    self.record_strategy_failure(index, operation, &err);
                    StrategyOutcome::Failed(err.to_string())
                }
            };
            outcomes.push((strategy, outcome));
        }
        outcomes
    }
}
