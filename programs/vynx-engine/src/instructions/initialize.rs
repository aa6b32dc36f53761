use anchor_lang::prelude::*;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use crate::error::ErrorCode;
use crate::state::*;
use crate::vault::{Deployment, TierVault};

impl TierVault {
    pub fn initialize(tier: Tier, operator: Pubkey, config: TierConfig) -> Result<Self> {
        // SECURITY VALIDATIONS
        require!(operator != Pubkey::default(), ErrorCode::InvalidAddress);
        config.validate()?;

        msg!(
            "Vault initialized: tier={}, operator={}, idle_threshold={}, rebalance_threshold={}bps, alloc=[{}, {}]bps",
            tier.name(), operator, config.idle_threshold, config.rebalance_threshold_bps,
            config.min_alloc_bps, config.max_alloc_bps
        );

        Ok(TierVault {
            tier,
            operator,
            config,
            ledger: VaultLedger::default(),
            mode: VaultMode::Normal,
            strategies: Vec::new(),
            balances: BTreeMap::new(),
            official_keepers: BTreeSet::new(),
            keeper_rewards: BTreeMap::new(),
            harvest_log: VecDeque::with_capacity(HARVEST_LOG_CAPACITY),
        })
    }
}

impl Deployment {
    /// Both tiers with their preset risk parameters
    pub fn initialize(operator: Pubkey) -> Result<Self> {
        Deployment::with_configs(operator, TierConfig::balanced(), TierConfig::aggressive())
    }

    pub fn with_configs(
        operator: Pubkey,
        balanced: TierConfig,
        aggressive: TierConfig,
    ) -> Result<Self> {
        Ok(Deployment {
            balanced: TierVault::initialize(Tier::Balanced, operator, balanced)?,
            aggressive: TierVault::initialize(Tier::Aggressive, operator, aggressive)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_rejects_default_operator() {
        let result = TierVault::initialize(Tier::Balanced, Pubkey::default(), TierConfig::balanced());
        assert_eq!(
            result.err().unwrap(),
            anchor_lang::error::Error::from(ErrorCode::InvalidAddress)
        );
    }

    #[test]
    fn test_deployment_builds_isolated_tiers() {
        let operator = Pubkey::new_from_array([1; 32]);
        let deployment = Deployment::initialize(operator).unwrap();

        assert_eq!(deployment.balanced.tier(), Tier::Balanced);
        assert_eq!(deployment.aggressive.tier(), Tier::Aggressive);
        assert_eq!(deployment.tier(Tier::Balanced).config(), &TierConfig::balanced());
        assert_eq!(deployment.tier(Tier::Aggressive).config(), &TierConfig::aggressive());
        assert_eq!(deployment.balanced.mode(), VaultMode::Normal);
        assert_eq!(*deployment.aggressive.ledger(), VaultLedger::default());
    }
}
