//! Service fee calculator.
//!
//! Pure integer arithmetic over minor units. The same function runs at
//! authorization time and again at settlement time against the same
//! authoritative subtotal, so both sides must agree bit-for-bit.

use crate::types::Money;

/// Service fee percentage applied to the subtotal, in basis points (5%).
pub const FEE_PERCENT_BPS: i64 = 500;

/// Fixed surcharge added on top of the percentage fee, in minor units.
pub const FEE_FIXED_MINOR: i64 = 500;

/// Compute the service fee for a subtotal.
///
/// `fee = round_half_up(subtotal * 5%) + 500`, all in minor units.
#[must_use]
pub const fn service_fee(subtotal: Money) -> Money {
    // Round-half-up division: (n * bps + 5000) / 10000 for non-negative n.
    let scaled = subtotal.minor() * FEE_PERCENT_BPS;
    let rounded = (scaled + 5_000) / 10_000;
    Money::from_minor(rounded + FEE_FIXED_MINOR)
}

/// Compute the total charge for a subtotal: `subtotal + service_fee(subtotal)`.
#[must_use]
pub const fn order_total(subtotal: Money) -> Money {
    Money::from_minor(subtotal.minor() + service_fee(subtotal).minor())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_spec_example() {
        // subtotal 3000 -> fee = round(3000 * 0.05) + 500 = 650, total 3650
        let subtotal = Money::from_minor(3_000);
        assert_eq!(service_fee(subtotal), Money::from_minor(650));
        assert_eq!(order_total(subtotal), Money::from_minor(3_650));
    }

    #[test]
    fn test_fee_rounds_half_up() {
        // 5% of 1010 = 50.5 -> 51
        assert_eq!(service_fee(Money::from_minor(1_010)), Money::from_minor(551));
        // 5% of 1009 = 50.45 -> 50
        assert_eq!(service_fee(Money::from_minor(1_009)), Money::from_minor(550));
    }

    #[test]
    fn test_fee_zero_subtotal() {
        assert_eq!(service_fee(Money::ZERO), Money::from_minor(FEE_FIXED_MINOR));
        assert_eq!(order_total(Money::ZERO), Money::from_minor(FEE_FIXED_MINOR));
    }

    #[test]
    fn test_recomputation_is_deterministic() {
        // Issuance and settlement call the same function on the same
        // authoritative subtotal; totals must be identical.
        for minor in [1, 99, 100, 101, 3_000, 123_456, 9_999_999] {
            let subtotal = Money::from_minor(minor);
            assert_eq!(order_total(subtotal), order_total(subtotal));
            assert_eq!(
                order_total(subtotal).minor(),
                subtotal.minor() + service_fee(subtotal).minor()
            );
        }
    }
}
