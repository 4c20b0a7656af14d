//! Whole-unit money arithmetic.
//!
//! Amounts are whole currency units (no fractional paise at the domain level).
//! Percentages are whole numbers in `0..=100`. Every rounding is half-up on
//! non-negative values, done in integer arithmetic.

/// An amount in whole currency units.
pub type Amount = u64;

/// `amount × (1 − percent/100)`, rounded to the nearest unit.
pub fn discounted(amount: Amount, percent: u32) -> Amount {
    let pct = u64::from(percent.min(100));
    div_round(amount * (100 - pct), 100)
}

/// `amount × percent/100`, rounded to the nearest unit.
pub fn percent_of(amount: Amount, percent: u64) -> Amount {
    div_round(amount.saturating_mul(percent), 100)
}

/// Convert whole units to the gateway's minor unit (×100).
pub fn to_minor_units(amount: Amount) -> u64 {
    amount.saturating_mul(100)
}

/// Half-up integer division (`den > 0`).
pub fn div_round(num: u64, den: u64) -> u64 {
    (num + den / 2) / den
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn discounted_rounds_half_up() {
        assert_eq!(discounted(500, 0), 500);
        assert_eq!(discounted(999, 10), 899); // 899.1
        assert_eq!(discounted(995, 10), 896); // 895.5
        assert_eq!(discounted(300, 100), 0);
    }

    #[test]
    fn percent_of_caps_nothing_by_itself() {
        assert_eq!(percent_of(1300, 15), 195);
        assert_eq!(percent_of(1299, 15), 195); // 194.85
    }

    #[test]
    fn minor_units_are_hundredths() {
        assert_eq!(to_minor_units(1300), 130_000);
    }

    proptest! {
        #[test]
        fn discounted_never_exceeds_amount(amount in 0u64..10_000_000, pct in 0u32..=100) {
            prop_assert!(discounted(amount, pct) <= amount);
        }
    }
}
