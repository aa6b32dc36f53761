use anchor_lang::prelude::*;
use crate::error::ErrorCode;
use crate::events::Rebalanced;
use crate::instructions::allocate::AllocationReport;
use crate::math::{bps_of, mul_div_down, ratio_bps, BPS_DENOMINATOR};
use crate::state::VaultMode;
use crate::vault::TierVault;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebalanceReport {
    pub executed: bool,
    pub spread_bps: u32,
    pub moved: u128,                          // Pulled out of over-allocated strategies
    pub keeper_reward: u128,
    pub allocation: Option<AllocationReport>, // Redeployment of the moved capital
    pub skipped: Vec<Pubkey>,                 // Strategies whose withdraw reverted
}

impl TierVault {
    /// Max APY minus min APY over active strategies
    pub fn rebalance_spread_bps(&self) -> u32 {
        let apys = self.strategies
            .iter()
            .filter(|slot| slot.record.active)
            .map(|slot| slot.apy.current_bps());
        let (min, max) = apys.fold((u32::MAX, 0u32), |(min, max), apy| (min.min(apy), max.max(apy)));
        max.saturating_sub(min)
    }

    /// Pure predicate polled by keepers: enough spread on enough capital
    pub fn should_rebalance(&self) -> bool {
        self.mode == VaultMode::Normal
            && self.rebalance_spread_bps() >= self.config.rebalance_threshold_bps
            && self.managed_assets() >= self.config.min_tvl_for_rebalance
    }

    /// Moves excess capital from over-allocated strategies to under-allocated ones.
    /// A no-op, not an error, when `should_rebalance` is false.
    pub fn rebalance(&mut self, keeper: Pubkey) -> Result<RebalanceReport> {
        require!(keeper != Pubkey::default(), ErrorCode::InvalidAddress);

        let spread_bps = self.rebalance_spread_bps();
        if !self.should_rebalance() {
            msg!(
                "Rebalance skipped: tier={}, spread={}bps, threshold={}bps, managed={}",
                self.tier.name(), spread_bps, self.config.rebalance_threshold_bps, self.managed_assets()
            );
            return Ok(RebalanceReport { spread_bps, ..Default::default() });
        }

        self.refresh();
        let managed = self.managed_assets();
        let tolerance = bps_of(managed, self.config.allocation_tolerance_bps)?;

        // STEP 1: IDENTIFY OVER-ALLOCATED STRATEGIES
        let mut excess = Vec::new();
        for (index, target_bps) in self.target_allocations() {
            let current = self.strategies[index].record.current_assets;
            let desired = mul_div_down(target_bps as u128, managed, BPS_DENOMINATOR)?;
            if current > desired.saturating_add(tolerance) {
                let over_bps = ratio_bps(current, managed)? as i64 - target_bps as i64;
                excess.push((index, current - desired, over_bps));
            }
        }
        excess.sort_by(|a, b| b.2.cmp(&a.2));

        // STEP 2: PULL THE EXCESS INTO THE IDLE BUFFER
        let mut report = RebalanceReport { executed: true, spread_bps, ..Default::default() };
        for (index, amount, _) in excess {
            match self.strategy_withdraw(index, amount) {
                Ok(delivered) => report.moved = report.moved.saturating_add(delivered),
                Err(err) => {
                    self.record_strategy_failure(index, "rebalance", &err);
                    report.skipped.push(self.strategies[index].record.strategy_id);
                }
            }
        }

        // STEP 3: KEEPER REWARD OUT OF THE MOVED CAPITAL, CAPPED AT THE SOLVENCY FLOOR
        if report.moved > 0 && !self.is_official_keeper(&keeper) {
            let earned = bps_of(report.moved, self.config.keeper_fee_bps)?;
            let reward = earned.min(self.ledger.payout_headroom()?);
            if reward < earned {
                msg!("Keeper reward capped: earned={}, paid={}", earned, reward);
            }
            self.ledger.idle_buffer -= reward;
            self.ledger.total_assets -= reward;
            if reward > 0 {
                *self.keeper_rewards.entry(keeper).or_insert(0) += reward;
            }
            report.keeper_reward = reward;
        }

        // STEP 4: REDEPLOY
        let redeploy = report.moved - report.keeper_reward;
        if redeploy > 0 {
            report.allocation = Some(self.allocate(redeploy)?);
        }

        let redeployed = report.allocation.as_ref().map(|a| a.placed).unwrap_or(0);
        msg!(
            "Rebalanced: tier={}, spread={}bps, moved={}, redeployed={}, keeper_reward={}",
            self.tier.name(), spread_bps, report.moved, redeployed, report.keeper_reward
        );
        emit!(Rebalanced {
            tier: self.tier,
            keeper,
            spread_bps,
            moved: report.moved,
            redeployed,
            keeper_reward: report.keeper_reward,
        });
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::WAD;
    use crate::sim::{SimFailures, SimStrategy};
    use crate::state::*;
    use crate::strategy::ApySource;

    fn key(seed: u8) -> Pubkey {
        Pubkey::new_from_array([seed; 32])
    }

    fn two_strategy_vault(threshold_bps: u32, apys: [u32; 2]) -> (TierVault, Vec<SimStrategy>) {
        let mut config = TierConfig::balanced();
        config.rebalance_threshold_bps = threshold_bps;
        config.min_tvl_for_rebalance = WAD;
        config.max_alloc_bps = 10_000;
        config.min_alloc_bps = 0;
        let mut vault = TierVault::initialize(Tier::Balanced, key(1), config).unwrap();
        let mut adapters = Vec::new();
        for (offset, apy) in apys.iter().enumerate() {
            let adapter = SimStrategy::new();
            vault.register_strategy(
                key(1),
                key(10 + offset as u8),
                ProtocolKind::LiquidStaking,
                Box::new(adapter.clone()),
                ApySource::Fixed(*apy),
            ).unwrap();
            adapters.push(adapter);
        }
        (vault, adapters)
    }

    #[test]
    fn test_spread_over_threshold_triggers() {
        let (mut vault, _) = two_strategy_vault(200, [400, 800]);
        vault.deposit(10 * WAD, key(20)).unwrap();
        assert_eq!(vault.rebalance_spread_bps(), 400);
        assert!(vault.should_rebalance());
    }

    #[test]
    fn test_spread_under_threshold_is_a_no_op() {
        let (mut vault, adapters) = two_strategy_vault(500, [400, 800]);
        vault.deposit(10 * WAD, key(20)).unwrap();
        assert!(!vault.should_rebalance());

        let ledger_before = *vault.ledger();
        let records_before: Vec<StrategyRecord> = vault.strategy_records().cloned().collect();
        let assets_before: Vec<u128> = adapters.iter().map(|a| a.assets()).collect();

        let report = vault.rebalance(key(30)).unwrap();
        assert!(!report.executed);
        assert_eq!(*vault.ledger(), ledger_before);
        assert_eq!(vault.strategy_records().cloned().collect::<Vec<_>>(), records_before);
        assert_eq!(adapters.iter().map(|a| a.assets()).collect::<Vec<_>>(), assets_before);
    }

    #[test]
    fn test_low_tvl_blocks_rebalance() {
        let (vault, _) = two_strategy_vault(200, [400, 800]);
        assert!(!vault.should_rebalance());
    }

    #[test]
    fn test_rebalance_moves_excess_and_pays_keeper() {
        let (mut vault, adapters) = two_strategy_vault(200, [400, 400]);
        vault.deposit(10 * WAD, key(20)).unwrap();
        assert_eq!(adapters[0].assets(), 5 * WAD);

        vault.update_fixed_apy(key(1), key(11), 1_200).unwrap();
        let report = vault.rebalance(key(30)).unwrap();

        assert!(report.executed);
        assert_eq!(report.moved, 5 * WAD / 2);
        assert_eq!(report.keeper_reward, 5 * WAD / 200);
        assert_eq!(vault.keeper_rewards(&key(30)), 5 * WAD / 200);
        assert_eq!(adapters[0].assets(), 5 * WAD / 2);
        assert_eq!(adapters[1].assets(), 7_475 * WAD / 1_000);
        assert_eq!(vault.ledger().total_assets, 9_975 * WAD / 1_000);
        assert_eq!(vault.ledger().idle_buffer, 0);
        assert!(vault.is_conserved());
    }

    #[test]
    fn test_official_keeper_collects_nothing() {
        let (mut vault, adapters) = two_strategy_vault(200, [400, 400]);
        vault.deposit(10 * WAD, key(20)).unwrap();
        vault.set_official_keeper(key(1), key(30), true).unwrap();
        vault.update_fixed_apy(key(1), key(11), 1_200).unwrap();

        let report = vault.rebalance(key(30)).unwrap();
        assert_eq!(report.keeper_reward, 0);
        assert_eq!(adapters[0].assets(), 5 * WAD / 2);
        assert_eq!(adapters[1].assets(), 15 * WAD / 2);
        assert_eq!(vault.ledger().total_assets, 10 * WAD);
    }

    #[test]
    fn test_rebalance_survives_reverting_withdraw() {
        let (mut vault, adapters) = two_strategy_vault(200, [400, 400]);
        vault.deposit(10 * WAD, key(20)).unwrap();
        vault.update_fixed_apy(key(1), key(11), 1_200).unwrap();
        adapters[0].set_failures(SimFailures { withdraw: true, ..Default::default() });

        let report = vault.rebalance(key(30)).unwrap();
        assert!(report.executed);
        assert_eq!(report.moved, 0);
        assert_eq!(report.skipped, vec![key(10)]);
        assert!(report.allocation.is_none());
        assert_eq!(vault.ledger().total_assets, 10 * WAD);
    }

    #[test]
    fn test_paused_vault_never_rebalances() {
        let (mut vault, _) = two_strategy_vault(200, [400, 800]);
        vault.deposit(10 * WAD, key(20)).unwrap();
        vault.pause(key(1)).unwrap();
        assert!(!vault.should_rebalance());
        assert!(!vault.rebalance(key(30)).unwrap().executed);
    }

    #[test]
    fn test_repeated_flips_keep_vault_solvent() {
        let (mut vault, _) = two_strategy_vault(200, [400, 1_200]);
        vault.deposit(20 * WAD, key(20)).unwrap();

        for round in 0..12 {
            let (low, high) = if round % 2 == 0 { (key(11), key(10)) } else { (key(10), key(11)) };
            vault.update_fixed_apy(key(1), high, 1_200).unwrap();
            vault.update_fixed_apy(key(1), low, 400).unwrap();
            assert!(vault.rebalance(key(30)).unwrap().executed);

            let ledger = vault.ledger();
            assert!(ledger.total_assets * 100 >= ledger.total_shares * 99);
            assert!(vault.is_conserved());
        }
        // everything above the floor was paid out, nothing below it
        assert_eq!(vault.keeper_rewards(&key(30)), WAD / 5);
        assert_eq!(vault.ledger().total_assets, 99 * WAD / 5);
    }
}
