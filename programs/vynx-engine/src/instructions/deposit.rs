use anchor_lang::prelude::*;
use crate::error::ErrorCode;
use crate::events::Deposited;
use crate::instructions::allocate::AllocationReport;
use crate::vault::TierVault;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositReceipt {
    pub shares: u128,
    /// Set when the deposit pushed the idle buffer over its threshold
    pub allocation: Option<AllocationReport>,
}

impl TierVault {
    pub fn deposit(&mut self, assets: u128, receiver: Pubkey) -> Result<DepositReceipt> {
        // INPUT VALIDATIONS
        require!(self.mode.accepts_deposits(), ErrorCode::DepositsPaused);
        require!(assets > 0, ErrorCode::InvalidAmount);
        require!(assets >= self.config.min_deposit, ErrorCode::DepositTooSmall);
        require!(receiver != Pubkey::default(), ErrorCode::InvalidAddress);

        let shares = self.ledger.convert_to_shares(assets)?;
        require!(shares > 0, ErrorCode::InvalidAmount);

        // compute every new value before touching state
        let total_assets = self.ledger.total_assets
            .checked_add(assets)
            .ok_or(ErrorCode::MathOverflow)?;
        let total_shares = self.ledger.total_shares
            .checked_add(shares)
            .ok_or(ErrorCode::MathOverflow)?;
        let idle_buffer = self.ledger.idle_buffer
            .checked_add(assets)
            .ok_or(ErrorCode::MathOverflow)?;
        let balance = self.balance_of(&receiver)
            .checked_add(shares)
            .ok_or(ErrorCode::MathOverflow)?;

        self.ledger.total_assets = total_assets;
        self.ledger.total_shares = total_shares;
        self.ledger.idle_buffer = idle_buffer;
        self.balances.insert(receiver, balance);

        msg!(
            "Deposit: tier={}, receiver={}, assets={}, shares={}, idle={}",
            self.tier.name(), receiver, assets, shares, idle_buffer
        );
        emit!(Deposited {
            tier: self.tier,
            receiver,
            assets,
            shares,
            total_assets,
            total_shares,
            idle_buffer,
        });

        let allocation = self.run_idle_gate();
        Ok(DepositReceipt { shares, allocation })
    }

    /// Allocates the whole idle buffer once it reaches the tier threshold.
    /// Whatever the engine could not place stays idle for the next round.
    pub(crate) fn run_idle_gate(&mut self) -> Option<AllocationReport> {
        let idle = self.ledger.idle_buffer;
        if idle == 0 || idle < self.config.idle_threshold {
            return None;
        }

        msg!("Idle buffer {} reached threshold {}, allocating", idle, self.config.idle_threshold);
        match self.allocate(idle) {
            Ok(report) => Some(report),
            Err(err) => {
                msg!("Idle allocation aborted, capital stays idle: {}", err);
                None
            }
        }
    }
}
