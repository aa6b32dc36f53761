use anchor_lang::prelude::*;
use crate::error::ErrorCode;
use crate::math::{bps_of, BPS_DENOMINATOR};
use crate::vault::TierVault;

/// Swap venue quoting and executing single-pool swaps. `pool_fee` is the
/// pool's fee tier in hundredths of a basis point (3000 = 0.3%).
pub trait SwapVenue {
    fn quote(&self, token_in: Pubkey, token_out: Pubkey, amount_in: u128, pool_fee: u32) -> Result<u128>;

    /// Reverts with `SlippageExceeded` when the output is below `min_out`
    fn swap(
        &mut self,
        token_in: Pubkey,
        token_out: Pubkey,
        amount_in: u128,
        pool_fee: u32,
        min_out: u128,
    ) -> Result<u128>;
}

/// Native ETH is addressed by the null key and wrapped 1:1, never swapped
pub const NATIVE_ETH: Pubkey = Pubkey::new_from_array([0; 32]);

/// Quote minus the caller's slippage tolerance
pub fn min_out(quote: u128, slippage_bps: u32) -> Result<u128> {
    require!(slippage_bps as u128 <= BPS_DENOMINATOR, ErrorCode::InvalidConfig);
    Ok(quote - bps_of(quote, slippage_bps)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZapDepositReceipt {
    pub weth_in: u128,
    pub shares: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZapWithdrawReceipt {
    pub shares: u128,
    pub weth_out: u128,
    pub token_out: Pubkey,      // WETH when the exit swap fell back, NATIVE_ETH when unwrapped
    pub amount_out: u128,
}

/// Multi-asset entry and exit in front of a tier vault. Holds funds only
/// inside a call and must finish every call holding nothing.
pub struct ZapRouter<V: SwapVenue> {
    router_id: Pubkey,
    weth: Pubkey,
    venue: V,
    residual: u128,
}

impl<V: SwapVenue> ZapRouter<V> {
    pub fn new(router_id: Pubkey, weth: Pubkey, venue: V) -> Result<Self> {
        require!(router_id != Pubkey::default(), ErrorCode::InvalidAddress);
        require!(weth != Pubkey::default(), ErrorCode::InvalidAddress);
        Ok(ZapRouter { router_id, weth, venue, residual: 0 })
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }

    pub fn venue_mut(&mut self) -> &mut V {
        &mut self.venue
    }

    pub fn residual(&self) -> u128 {
        self.residual
    }

    /// WETH and native ETH move 1:1 without touching the venue
    fn is_weth_equivalent(&self, token: Pubkey) -> bool {
        token == self.weth || token == NATIVE_ETH
    }

    /// Swaps `amount` of `token` into WETH and deposits it for `receiver`.
    /// WETH skips the swap and native ETH is wrapped. If the deposit reverts
    /// the WETH goes back to the caller and nothing stays in the router.
    pub fn zap_deposit(
        &mut self,
        vault: &mut TierVault,
        token: Pubkey,
        amount: u128,
        pool_fee: u32,
        min_weth_out: u128,
        receiver: Pubkey,
    ) -> Result<ZapDepositReceipt> {
        require!(self.residual == 0, ErrorCode::RouterResidualBalance);
        require!(amount > 0, ErrorCode::InvalidAmount);
        require!(receiver != Pubkey::default(), ErrorCode::InvalidAddress);

        // Fail before swapping whatever the vault would reject anyway
        require!(vault.mode().accepts_deposits(), ErrorCode::DepositsPaused);
        let expected = if self.is_weth_equivalent(token) {
            amount
        } else {
            self.venue.quote(token, self.weth, amount, pool_fee)?
        };
        require!(expected >= min_weth_out, ErrorCode::SlippageExceeded);
        require!(expected >= vault.config().min_deposit, ErrorCode::DepositTooSmall);

        let weth_in = if token == NATIVE_ETH {
            msg!("Wrapped {} ETH", amount);
            amount
        } else if token == self.weth {
            amount
        } else {
            self.venue.swap(token, self.weth, amount, pool_fee, min_weth_out)?
        };
        self.residual += weth_in;

        let receipt = match vault.deposit(weth_in, receiver) {
            Ok(receipt) => receipt,
            Err(err) => {
                self.residual -= weth_in;
                msg!("Zap deposit reverted ({}), returning {} WETH to the caller", err, weth_in);
                return Err(err);
            }
        };
        self.residual -= weth_in;
        require!(self.residual == 0, ErrorCode::RouterResidualBalance);

        msg!(
            "Zap deposit: token={}, amount={}, weth={}, shares={}",
            token, amount, weth_in, receipt.shares
        );
        Ok(ZapDepositReceipt { weth_in, shares: receipt.shares })
    }

    /// Redeems `shares` of `owner` and swaps the WETH into `token`. If the
    /// exit swap reverts the receiver gets the WETH instead. Native ETH is
    /// unwrapped 1:1.
    #[allow(clippy::too_many_arguments)]
    pub fn zap_withdraw(
        &mut self,
        vault: &mut TierVault,
        shares: u128,
        owner: Pubkey,
        token: Pubkey,
        pool_fee: u32,
        min_token_out: u128,
        receiver: Pubkey,
    ) -> Result<ZapWithdrawReceipt> {
        require!(self.residual == 0, ErrorCode::RouterResidualBalance);
        require!(receiver != Pubkey::default(), ErrorCode::InvalidAddress);

        if !self.is_weth_equivalent(token) {
            let expected_weth = vault.preview_redeem(shares)?;
            let quote = self.venue.quote(self.weth, token, expected_weth, pool_fee)?;
            require!(quote >= min_token_out, ErrorCode::SlippageExceeded);
        }

        let redeemed = vault.redeem(shares, self.router_id, owner)?;
        let weth_out = redeemed.assets;
        self.residual += weth_out;

        let (token_out, amount_out) = if token == self.weth {
            (self.weth, weth_out)
        } else if token == NATIVE_ETH {
            msg!("Unwrapped {} WETH", weth_out);
            (NATIVE_ETH, weth_out)
        } else {
            match self.venue.swap(self.weth, token, weth_out, pool_fee, min_token_out) {
                Ok(amount_out) => (token, amount_out),
                Err(err) => {
                    msg!("Exit swap to {} failed ({}), delivering WETH", token, err);
                    (self.weth, weth_out)
                }
            }
        };
        self.residual -= weth_out;
        require!(self.residual == 0, ErrorCode::RouterResidualBalance);

        msg!(
            "Zap withdraw: shares={}, weth={}, token_out={}, amount_out={}, receiver={}",
            shares, weth_out, token_out, amount_out, receiver
        );
        Ok(ZapWithdrawReceipt { shares, weth_out, token_out, amount_out })
    }
}
