//! Keeper-side helpers. The engine never schedules anything itself: a keeper
//! process polls `should_rebalance`, acts, and owns its retry policy.

use anchor_lang::prelude::*;
use std::time::Duration;
use crate::instructions::{HarvestReport, RebalanceReport};
use crate::state::Tier;
use crate::vault::{Deployment, TierVault};

/// Exponential retry delay, capped, for a keeper whose call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based), `None` once exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let delay = 2u32
            .checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeeperCycleReport {
    pub tier: Tier,
    pub harvest: Option<HarvestReport>,       // None while harvests are paused
    pub rebalance: Option<RebalanceReport>,   // None when the predicate said no
}

/// One poll: harvest, then rebalance if the predicate holds
pub fn run_cycle(vault: &mut TierVault, keeper: Pubkey) -> Result<KeeperCycleReport> {
    let harvest = if vault.mode().accepts_harvests() {
        Some(vault.harvest(keeper)?)
    } else {
        msg!("Keeper cycle: {} harvest skipped in {:?}", vault.tier().name(), vault.mode());
        None
    };

    let rebalance = if vault.should_rebalance() {
        Some(vault.rebalance(keeper)?)
    } else {
        None
    };

    Ok(KeeperCycleReport { tier: vault.tier(), harvest, rebalance })
}

/// Runs both tiers at once; they share no state, so each gets its own thread
pub fn run_deployment_cycle(
    deployment: &mut Deployment,
    keeper: Pubkey,
) -> (Result<KeeperCycleReport>, Result<KeeperCycleReport>) {
    let Deployment { balanced, aggressive } = deployment;
    std::thread::scope(|scope| {
        let aggressive_cycle = scope.spawn(move || run_cycle(aggressive, keeper));
        let balanced_report = run_cycle(balanced, keeper);
        let aggressive_report = aggressive_cycle
            .join()
            .unwrap_or_else(|_| Err(crate::error::ErrorCode::StrategyCallFailed.into()));
        (balanced_report, aggressive_report)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::WAD;
    use crate::sim::SimStrategy;
    use crate::state::*;
    use crate::strategy::ApySource;

    fn key(seed: u8) -> Pubkey {
        Pubkey::new_from_array([seed; 32])
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay_for(0), Some(Duration::from_secs(2)));
        assert_eq!(backoff.delay_for(3), Some(Duration::from_secs(16)));
        assert_eq!(backoff.delay_for(4), Some(Duration::from_secs(32)));
        assert_eq!(backoff.delay_for(5), None);

        let long = Backoff { max_attempts: 64, ..Backoff::default() };
        assert_eq!(long.delay_for(40), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_cycle_harvests_then_rebalances() {
        let mut config = TierConfig::balanced();
        config.max_alloc_bps = 10_000;
        config.min_alloc_bps = 0;
        let mut vault = TierVault::initialize(Tier::Balanced, key(1), config).unwrap();
        let adapters: Vec<SimStrategy> = (0..2).map(|_| SimStrategy::new()).collect();
        for (offset, adapter) in adapters.iter().enumerate() {
            vault.register_strategy(
                key(1),
                key(10 + offset as u8),
                ProtocolKind::LiquidStaking,
                Box::new(adapter.clone()),
                ApySource::Fixed(400),
            ).unwrap();
        }
        vault.deposit(10 * WAD, key(20)).unwrap();
        adapters[0].accrue_profit(WAD);
        vault.update_fixed_apy(key(1), key(11), 1_200).unwrap();

        let report = run_cycle(&mut vault, key(30)).unwrap();
        assert_eq!(report.harvest.unwrap().total_profit, WAD);
        assert!(report.rebalance.unwrap().executed);
        assert!(vault.is_conserved());
    }

    #[test]
    fn test_paused_tier_skips_everything() {
        let mut vault = TierVault::initialize(Tier::Aggressive, key(1), TierConfig::aggressive()).unwrap();
        vault.pause(key(1)).unwrap();
        let report = run_cycle(&mut vault, key(30)).unwrap();
        assert!(report.harvest.is_none());
        assert!(report.rebalance.is_none());
    }

    #[test]
    fn test_deployment_cycle_runs_both_tiers() {
        let mut deployment = Deployment::initialize(key(1)).unwrap();
        let (balanced, aggressive) = run_deployment_cycle(&mut deployment, key(30));
        assert_eq!(balanced.unwrap().tier, Tier::Balanced);
        assert_eq!(aggressive.unwrap().tier, Tier::Aggressive);
    }
}
