use anchor_lang::prelude::*;
use crate::error::ErrorCode;
use crate::events::IdleBufferSynced;
use crate::state::VaultMode;
use crate::strategy::StrategyOutcome;
use crate::vault::TierVault;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmergencyExitReport {
    pub recovered: u128,
    pub outcomes: Vec<(Pubkey, StrategyOutcome<u128>)>,
    pub failed: Vec<Pubkey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub previous_total_assets: u128,
    pub total_assets: u128,
    pub idle_buffer: u128,
}

impl TierVault {
    /// Blocks deposits, harvests and allocation. Withdrawals keep working.
    pub fn pause(&mut self, caller: Pubkey) -> Result<()> {
        self.ensure_operator(&caller)?;
        self.set_mode(VaultMode::Paused)
    }

    pub fn unpause(&mut self, caller: Pubkey) -> Result<()> {
        self.ensure_operator(&caller)?;
        require!(self.mode == VaultMode::Paused, ErrorCode::InvalidModeTransition);
        self.set_mode(VaultMode::Normal)
    }

    /// Pulls everything retrievable from every active strategy into the idle
    /// buffer. Can be re-run while draining to retry strategies that reverted.
    pub fn emergency_exit(&mut self, caller: Pubkey) -> Result<EmergencyExitReport> {
        self.ensure_operator(&caller)?;
        match self.mode {
            VaultMode::Paused => self.set_mode(VaultMode::Draining)?,
            VaultMode::Draining => msg!("Emergency exit retry on {}", self.tier.name()),
            _ => return Err(ErrorCode::InvalidModeTransition.into()),
        }

        let outcomes = self.for_each_active("emergency_exit", |vault, index| {
            let held = vault.strategies[index].adapter.total_assets()?;
            if held == 0 {
                return Ok(None);
            }
            vault.strategy_withdraw(index, held).map(Some)
        });

        let mut report = EmergencyExitReport::default();
        for (strategy, outcome) in &outcomes {
            match outcome {
                StrategyOutcome::Completed(delivered) => {
                    report.recovered = report.recovered.saturating_add(*delivered);
                }
                StrategyOutcome::Failed(_) => report.failed.push(*strategy),
                StrategyOutcome::Skipped => {}
            }
        }
        report.outcomes = outcomes;

        msg!(
            "Emergency exit: tier={}, recovered={}, failed={}, idle={}",
            self.tier.name(), report.recovered, report.failed.len(), self.ledger.idle_buffer
        );
        Ok(report)
    }

    /// Rebuilds `total_assets` from the idle buffer and what strategies still
    /// report, absorbing exit slippage and losses into the share price
    pub fn sync_idle_buffer(&mut self, caller: Pubkey) -> Result<SyncReport> {
        self.ensure_operator(&caller)?;
        require!(self.mode == VaultMode::Draining, ErrorCode::InvalidModeTransition);

        for index in self.active_indices() {
            match self.strategies[index].adapter.total_assets() {
                Ok(held) => self.strategies[index].record.current_assets = held,
                Err(err) => msg!(
                    "Sync keeps recorded assets for {}: {}",
                    self.strategies[index].record.strategy_id, err
                ),
            }
        }

        let previous_total_assets = self.ledger.total_assets;
        self.ledger.total_assets = self.ledger.idle_buffer
            .checked_add(self.managed_assets())
            .ok_or(ErrorCode::MathOverflow)?;

        let report = SyncReport {
            previous_total_assets,
            total_assets: self.ledger.total_assets,
            idle_buffer: self.ledger.idle_buffer,
        };
        msg!(
            "Idle buffer synced: tier={}, total_assets {} -> {}, idle={}",
            self.tier.name(), previous_total_assets, report.total_assets, report.idle_buffer
        );
        emit!(IdleBufferSynced {
            tier: self.tier,
            previous_total_assets,
            total_assets: report.total_assets,
            idle_buffer: report.idle_buffer,
        });

        self.set_mode(VaultMode::Reconciled)?;
        Ok(report)
    }

    pub fn resume(&mut self, caller: Pubkey) -> Result<()> {
        self.ensure_operator(&caller)?;
        require!(self.mode == VaultMode::Reconciled, ErrorCode::InvalidModeTransition);
        self.set_mode(VaultMode::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::WAD;
    use crate::sim::{SimFailures, SimStrategy};
    use crate::state::*;
    use crate::strategy::ApySource;
    use anchor_lang::error::Error;

    fn key(seed: u8) -> Pubkey {
        Pubkey::new_from_array([seed; 32])
    }

    fn funded_vault() -> (TierVault, Vec<SimStrategy>) {
        let mut vault = TierVault::initialize(Tier::Aggressive, key(1), TierConfig::aggressive()).unwrap();
        let mut adapters = Vec::new();
        for (seed, protocol) in [(10, ProtocolKind::Lending), (11, ProtocolKind::ConcentratedLiquidity)] {
            let adapter = SimStrategy::new();
            vault.register_strategy(
                key(1),
                key(seed),
                protocol,
                Box::new(adapter.clone()),
                ApySource::Fixed(protocol.default_apy_bps()),
            ).unwrap();
            adapters.push(adapter);
        }
        vault.deposit(20 * WAD, key(20)).unwrap();
        (vault, adapters)
    }

    #[test]
    fn test_full_emergency_cycle() {
        let (mut vault, adapters) = funded_vault();
        assert_eq!(vault.ledger().idle_buffer, 0);

        vault.pause(key(1)).unwrap();
        let report = vault.emergency_exit(key(1)).unwrap();
        assert_eq!(report.recovered, 20 * WAD);
        assert!(report.failed.is_empty());
        assert_eq!(vault.mode(), VaultMode::Draining);
        assert!(adapters.iter().all(|adapter| adapter.assets() == 0));

        let sync = vault.sync_idle_buffer(key(1)).unwrap();
        assert_eq!(sync.total_assets, 20 * WAD);
        assert_eq!(vault.mode(), VaultMode::Reconciled);

        vault.resume(key(1)).unwrap();
        assert_eq!(vault.mode(), VaultMode::Normal);
        assert!(vault.is_conserved());
    }

    #[test]
    fn test_exit_isolates_reverting_strategy_and_retries() {
        let (mut vault, adapters) = funded_vault();
        let stuck = adapters[1].assets();
        adapters[1].set_failures(SimFailures { withdraw: true, ..Default::default() });

        vault.pause(key(1)).unwrap();
        let report = vault.emergency_exit(key(1)).unwrap();
        assert_eq!(report.failed, vec![key(11)]);
        assert_eq!(report.recovered, 20 * WAD - stuck);

        adapters[1].set_failures(SimFailures::default());
        let retry = vault.emergency_exit(key(1)).unwrap();
        assert_eq!(retry.recovered, stuck);
        assert_eq!(retry.outcomes[0].1, StrategyOutcome::Skipped);
        assert_eq!(vault.ledger().idle_buffer, 20 * WAD);
    }

    #[test]
    fn test_sync_absorbs_exit_slippage() {
        let (mut vault, adapters) = funded_vault();
        for adapter in &adapters {
            adapter.set_withdraw_haircut_bps(100);
        }
        vault.pause(key(1)).unwrap();
        vault.emergency_exit(key(1)).unwrap();

        let sync = vault.sync_idle_buffer(key(1)).unwrap();
        assert_eq!(sync.previous_total_assets, 20 * WAD);
        assert_eq!(sync.total_assets, 20 * WAD - 20 * WAD / 100);
        assert_eq!(vault.ledger().total_shares, 20 * WAD);
        assert!(vault.is_conserved());
    }

    #[test]
    fn test_mode_transitions_are_guarded() {
        let (mut vault, _) = funded_vault();
        let invalid = Error::from(ErrorCode::InvalidModeTransition);

        assert_eq!(vault.pause(key(9)).unwrap_err(), Error::from(ErrorCode::Unauthorized));
        assert_eq!(vault.emergency_exit(key(1)).unwrap_err(), invalid);
        assert_eq!(vault.sync_idle_buffer(key(1)).unwrap_err(), invalid);
        assert_eq!(vault.resume(key(1)).unwrap_err(), invalid);
        assert_eq!(vault.unpause(key(1)).unwrap_err(), invalid);

        vault.pause(key(1)).unwrap();
        assert_eq!(vault.resume(key(1)).unwrap_err(), invalid);
        vault.unpause(key(1)).unwrap();
        assert_eq!(vault.mode(), VaultMode::Normal);
    }

    #[test]
    fn test_withdrawals_work_in_every_mode() {
        let (mut vault, _) = funded_vault();
        vault.pause(key(1)).unwrap();
        vault.redeem(WAD, key(30), key(20)).unwrap();
        vault.emergency_exit(key(1)).unwrap();
        vault.redeem(WAD, key(30), key(20)).unwrap();
        vault.sync_idle_buffer(key(1)).unwrap();
        vault.redeem(WAD, key(30), key(20)).unwrap();
        assert_eq!(vault.balance_of(&key(20)), 17 * WAD);
    }
}
