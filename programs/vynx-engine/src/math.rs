use anchor_lang::prelude::*;
use crate::error::ErrorCode;

// Kept out of the prelude's scope: its one-parameter `Result` breaks the macro expansion
mod wide {
    use uint::construct_uint;

    construct_uint! {
        pub struct U256(4);
    }
}

pub use wide::U256;

pub const BPS_DENOMINATOR: u128 = 10_000;
/// 1 WETH in wei
pub const WAD: u128 = 1_000_000_000_000_000_000;
/// Lending pools quote rates in RAY (1e27); one basis point is 1e23 RAY
pub const RAY_PER_BPS: u128 = 100_000_000_000_000_000_000_000;

fn to_u128(value: U256) -> Result<u128> {
    require!(value <= U256::from(u128::MAX), ErrorCode::MathOverflow);
    Ok(value.low_u128())
}

/// floor(a * b / c) with a 256-bit intermediate
pub fn mul_div_down(a: u128, b: u128, c: u128) -> Result<u128> {
    require!(c > 0, ErrorCode::MathOverflow);
    let product = U256::from(a)
        .checked_mul(U256::from(b))
        .ok_or(ErrorCode::MathOverflow)?;
    to_u128(product / U256::from(c))
}

/// ceil(a * b / c) with a 256-bit intermediate
pub fn mul_div_up(a: u128, b: u128, c: u128) -> Result<u128> {
    require!(c > 0, ErrorCode::MathOverflow);
    let product = U256::from(a)
        .checked_mul(U256::from(b))
        .ok_or(ErrorCode::MathOverflow)?;
    let divisor = U256::from(c);
    let mut quotient = product / divisor;
    if !(product % divisor).is_zero() {
        quotient = quotient + U256::one();
    }
    to_u128(quotient)
}

pub fn bps_of(amount: u128, bps: u32) -> Result<u128> {
    mul_div_down(amount, bps as u128, BPS_DENOMINATOR)
}

/// Share of `part` in `whole` expressed in basis points, 0 when `whole` is empty
pub fn ratio_bps(part: u128, whole: u128) -> Result<u32> {
    if whole == 0 {
        return Ok(0);
    }
    let bps = mul_div_down(part, BPS_DENOMINATOR, whole)?;
    Ok(bps.min(u32::MAX as u128) as u32)
}

/// RAY-denominated rate to basis points, rounded half up
pub fn ray_to_bps(rate_ray: u128) -> u32 {
    let rounded = rate_ray.saturating_add(RAY_PER_BPS / 2) / RAY_PER_BPS;
    rounded.min(u32::MAX as u128) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_rounding() {
        assert_eq!(mul_div_down(10, 1, 3).unwrap(), 3);
        assert_eq!(mul_div_up(10, 1, 3).unwrap(), 4);
        assert_eq!(mul_div_up(9, 1, 3).unwrap(), 3);
        assert!(mul_div_down(1, 1, 0).is_err());
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // u128::MAX * 2 overflows u128 but the quotient fits
        let value = mul_div_down(u128::MAX, 2, 4).unwrap();
        assert_eq!(value, u128::MAX / 2);
        assert!(mul_div_down(u128::MAX, 2, 1).is_err());
    }

    #[test]
    fn test_ray_to_bps() {
        // 2.5% in RAY
        let rate = 25_000_000_000_000_000_000_000_000u128;
        assert_eq!(ray_to_bps(rate), 250);
        assert_eq!(ray_to_bps(0), 0);
        assert_eq!(ray_to_bps(RAY_PER_BPS / 2), 1);
        assert_eq!(ray_to_bps(RAY_PER_BPS / 2 - 1), 0);
    }

    #[test]
    fn test_ratio_bps() {
        assert_eq!(ratio_bps(1, 4).unwrap(), 2_500);
        assert_eq!(ratio_bps(5, 0).unwrap(), 0);
        assert_eq!(bps_of(WAD, 100).unwrap(), WAD / 100);
    }
}
