//! Rekber Fees - Escrow transaction fee calculation
//!
//! Pure arithmetic, no side effects, no errors. All amounts are `Decimal`;
//! floats never touch a monetary path.
//!
//! # Fee structure
//!
//! | Component    | Rate                        |
//! |--------------|-----------------------------|
//! | Platform fee | 2% of subtotal              |
//! | Gateway fee  | 1.5% of subtotal            |
//! | Tier discount| 0% / 0.1% / 0.2% / 0.3%     |
//!
//! `total = subtotal + platform_fee - tier_discount + gateway_fee`
//!
//! The merchant's net is computed as
//! `total - (platform_fee + gateway_fee - tier_discount)`. Today that
//! collapses algebraically to the subtotal; the long form is kept on
//! purpose so a future fee-model change cannot silently diverge from the
//! charged total.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use rekber_types::{FeeBreakdown, Tier};

/// Platform fee rate on the subtotal (2%)
pub const PLATFORM_FEE_RATE: Decimal = dec!(0.02);

/// Payment gateway fee rate on the subtotal (1.5%)
pub const GATEWAY_FEE_RATE: Decimal = dec!(0.015);

/// Compute the full fee breakdown for a purchase.
///
/// The caller is responsible for rejecting `quantity == 0` and
/// non-positive prices before invoking this; the function itself has no
/// failure mode.
pub fn quote(unit_price: Decimal, quantity: u32, buyer_tier: Tier) -> FeeBreakdown {
    let subtotal = unit_price * Decimal::from(quantity);
    let platform_fee = subtotal * PLATFORM_FEE_RATE;
    let tier_discount = subtotal * buyer_tier.discount_rate();
    let gateway_fee = subtotal * GATEWAY_FEE_RATE;
    let total = subtotal + platform_fee - tier_discount + gateway_fee;
    let net_to_merchant = total - (platform_fee + gateway_fee - tier_discount);

    FeeBreakdown {
        subtotal,
        platform_fee,
        tier_discount,
        gateway_fee,
        total,
        net_to_merchant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silver_tier_worked_example() {
        // 2 units at 100_000, silver buyer
        let fees = quote(dec!(100000), 2, Tier::Silver);
        assert_eq!(fees.subtotal, dec!(200000));
        assert_eq!(fees.platform_fee, dec!(4000.00));
        assert_eq!(fees.tier_discount, dec!(200.000));
        assert_eq!(fees.gateway_fee, dec!(3000.000));
        assert_eq!(fees.total, dec!(206800));
        assert_eq!(fees.net_to_merchant, dec!(200000));
    }

    #[test]
    fn total_identity_holds() {
        let fees = quote(dec!(12345.67), 3, Tier::Gold);
        assert_eq!(
            fees.total,
            fees.subtotal + fees.platform_fee - fees.tier_discount + fees.gateway_fee
        );
    }

    #[test]
    fn net_formula_currently_equals_subtotal() {
        // The long-form net computation collapses to the subtotal under the
        // current fee model. If this assertion ever fails, the fee model
        // changed and the divergence needs an explicit decision.
        for tier in [Tier::Bronze, Tier::Silver, Tier::Gold, Tier::Platinum] {
            let fees = quote(dec!(999.99), 7, tier);
            assert_eq!(fees.net_to_merchant, fees.subtotal);
        }
    }

    #[test]
    fn bronze_gets_no_discount() {
        let fees = quote(dec!(50000), 1, Tier::Bronze);
        assert_eq!(fees.tier_discount, Decimal::ZERO);
        assert_eq!(fees.total, dec!(51750.000));
    }

    #[test]
    fn net_never_exceeds_subtotal() {
        for tier in [Tier::Bronze, Tier::Silver, Tier::Gold, Tier::Platinum] {
            let fees = quote(dec!(100), 5, tier);
            assert!(fees.net_to_merchant <= fees.subtotal);
        }
    }
}
