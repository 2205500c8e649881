//! Buyer / merchant tiers
//!
//! A tier is a derived classification: it is recomputed from the cumulative
//! successful-transaction count as part of the completion transition, and it
//! grants a small discount on future purchases.
//!
//! | Tier     | Successful trx | Discount |
//! |----------|----------------|----------|
//! | Bronze   | < 10           | 0%       |
//! | Silver   | >= 10          | 0.1%     |
//! | Gold     | >= 50          | 0.2%     |
//! | Platinum | >= 100         | 0.3%     |

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tier levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Tier {
    /// Discount rate applied to the subtotal at purchase time
    pub fn discount_rate(&self) -> Decimal {
        match self {
            // 0.1% / 0.2% / 0.3%
            Tier::Bronze => Decimal::ZERO,
            Tier::Silver => Decimal::new(1, 3),
            Tier::Gold => Decimal::new(2, 3),
            Tier::Platinum => Decimal::new(3, 3),
        }
    }

    /// Determine tier from the cumulative successful-transaction count
    pub fn from_success_count(count: u32) -> Self {
        if count >= 100 {
            Tier::Platinum
        } else if count >= 50 {
            Tier::Gold
        } else if count >= 10 {
            Tier::Silver
        } else {
            Tier::Bronze
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
            Tier::Platinum => "platinum",
        }
    }

    /// Parse a stored tier name; unknown values fall back to bronze,
    /// matching the fee table's treatment of unknown tiers.
    pub fn parse_or_bronze(s: &str) -> Self {
        match s {
            "silver" => Tier::Silver,
            "gold" => Tier::Gold,
            "platinum" => Tier::Platinum,
            _ => Tier::Bronze,
        }
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Bronze
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn discount_rates() {
        assert_eq!(Tier::Bronze.discount_rate(), Decimal::ZERO);
        assert_eq!(Tier::Silver.discount_rate(), dec!(0.001));
        assert_eq!(Tier::Gold.discount_rate(), dec!(0.002));
        assert_eq!(Tier::Platinum.discount_rate(), dec!(0.003));
    }

    #[test]
    fn thresholds_are_exact() {
        assert_eq!(Tier::from_success_count(0), Tier::Bronze);
        assert_eq!(Tier::from_success_count(9), Tier::Bronze);
        assert_eq!(Tier::from_success_count(10), Tier::Silver);
        assert_eq!(Tier::from_success_count(49), Tier::Silver);
        assert_eq!(Tier::from_success_count(50), Tier::Gold);
        assert_eq!(Tier::from_success_count(99), Tier::Gold);
        assert_eq!(Tier::from_success_count(100), Tier::Platinum);
    }

    #[test]
    fn unknown_tier_parses_to_bronze() {
        assert_eq!(Tier::parse_or_bronze("diamond"), Tier::Bronze);
        assert_eq!(Tier::parse_or_bronze("gold"), Tier::Gold);
    }
}
