//! U256 fixed-point arithmetic for solvency calculations.
//!
//! All values are integers; every division floors. Products are formed before
//! quotients so precision is only lost at the final division. Products that do
//! not fit in 256 bits yield `None` rather than wrapping.

use alloy::primitives::U256;

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Fixed-point scale of health factors and USD values (1e18)
pub const PRECISION: U256 = WAD;

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10000u64, 0, 0, 0]);

/// Whole units to WAD: `units * 1e18`.
#[inline(always)]
pub fn wad(units: u64) -> U256 {
    U256::from(units) * WAD
}

/// Apply basis points reduction (e.g., for slippage).
/// Returns: value * (10000 - basis_points) / 10000
///
/// Example: apply_basis_points(1000, 200) = Some(980) (2% reduction)
#[inline(always)]
pub fn apply_basis_points(value: U256, basis_points: u16) -> Option<U256> {
    let factor = U256::from(10000u16.saturating_sub(basis_points));
    value.checked_mul(factor).map(|v| v / BPS_DENOMINATOR)
}

/// `value * numerator / denominator`, floored. Zero denominator yields zero.
#[inline(always)]
pub fn mul_div(value: U256, numerator: U256, denominator: U256) -> Option<U256> {
    if denominator.is_zero() {
        return Some(U256::ZERO);
    }
    value.checked_mul(numerator).map(|v| v / denominator)
}

/// Calculate health factor in WAD (18 decimals).
/// HF = (collateral_usd * threshold / liquidation_precision) * 10^18 / debt_usd
///
/// Returns U256::MAX if debt is zero.
#[inline(always)]
pub fn calculate_hf_wad(
    collateral_usd: U256,
    debt_usd: U256,
    liquidation_threshold: U256,
    liquidation_precision: U256,
) -> Option<U256> {
    if debt_usd.is_zero() {
        return Some(U256::MAX);
    }
    let adjusted = mul_div(collateral_usd, liquidation_threshold, liquidation_precision)?;
    mul_div(adjusted, PRECISION, debt_usd)
}

/// Check if health factor indicates liquidatable position (HF < minimum).
#[inline(always)]
pub fn is_liquidatable_wad(hf_wad: U256, minimum: U256) -> bool {
    hf_wad < minimum
}

/// Convert WAD (18 decimals) to f64.
/// Use only for display/logging, not for computation.
#[inline(always)]
pub fn wad_to_f64(wad: U256) -> f64 {
    if wad == U256::MAX {
        return f64::INFINITY;
    }
    if wad <= U256::from(u128::MAX) {
        let value: u128 = wad.to();
        value as f64 / 1e18
    } else {
        let limbs = wad.as_limbs();
        let high = limbs[1] as f64 * (u64::MAX as f64 + 1.0);
        let low = limbs[0] as f64;
        (high + low) / 1e18
    }
}

/// Safe minimum of two U256 values
#[inline(always)]
pub fn min(a: U256, b: U256) -> U256 {
    if a < b {
        a
    } else {
        b
    }
}
