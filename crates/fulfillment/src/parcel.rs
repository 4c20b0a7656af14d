//! Parcel sizing and address normalisation for the courier aggregator.

use serde::Serialize;

pub const MIN_WEIGHT_KG: f64 = 0.5;
pub const MAX_WEIGHT_KG: f64 = 30.0;
pub const WEIGHT_PER_UNIT_KG: f64 = 0.5;

/// Flat-rate parcel weight: half a kilo per unit, clamped to the courier range.
pub fn parcel_weight_kg(total_quantity: u32) -> f64 {
    (f64::from(total_quantity) * WEIGHT_PER_UNIT_KG).clamp(MIN_WEIGHT_KG, MAX_WEIGHT_KG)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Dimensions {
    pub length: u32,
    pub breadth: u32,
    pub width: u32,
    pub height: u32,
}

/// Every parcel ships in the same box, in centimetres.
pub const PARCEL_DIMENSIONS: Dimensions = Dimensions {
    length: 15,
    breadth: 15,
    width: 15,
    height: 10,
};

fn digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Reduce a phone number to a 10-digit mobile number.
///
/// A leading trunk `0` (11 digits) or `91` country code (12 digits) is
/// stripped; longer inputs keep their last ten digits. Shorter inputs are
/// returned as their digits.
pub fn normalize_phone(raw: &str) -> String {
    let d = digits(raw);
    match d.len() {
        11 if d.starts_with('0') => d[1..].to_string(),
        12 if d.starts_with("91") => d[2..].to_string(),
        n if n >= 10 => d[n - 10..].to_string(),
        _ => d,
    }
}

/// Digits only, at most six, or `fallback` when nothing is left.
pub fn normalize_pincode(raw: &str, fallback: &str) -> String {
    let mut d = digits(raw);
    d.truncate(6);
    if d.is_empty() { fallback.to_string() } else { d }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn weight_is_clamped() {
        assert_eq!(parcel_weight_kg(0), 0.5);
        assert_eq!(parcel_weight_kg(1), 0.5);
        assert_eq!(parcel_weight_kg(3), 1.5);
        assert_eq!(parcel_weight_kg(60), 30.0);
        assert_eq!(parcel_weight_kg(500), 30.0);
    }

    #[test]
    fn phone_variants() {
        assert_eq!(normalize_phone("+91 98765 43210"), "9876543210");
        assert_eq!(normalize_phone("09876543210"), "9876543210");
        assert_eq!(normalize_phone("(987) 654-3210"), "9876543210");
        assert_eq!(normalize_phone("0019876543210"), "9876543210");
        assert_eq!(normalize_phone("12345"), "12345");
        assert_eq!(normalize_phone(""), "");
    }

    #[test]
    fn pincode_keeps_six_digits() {
        assert_eq!(normalize_pincode("560 001", "000000"), "560001");
        assert_eq!(normalize_pincode("1100019", "000000"), "110001");
        assert_eq!(normalize_pincode("n/a", "110001"), "110001");
    }

    proptest! {
        #[test]
        fn phone_never_exceeds_ten_digits(raw in "[0-9 +()-]{0,20}") {
            let phone = normalize_phone(&raw);
            prop_assert!(phone.len() <= 10 || phone.is_empty());
            prop_assert!(phone.chars().all(|c| c.is_ascii_digit()));
        }

        #[test]
        fn weight_always_within_courier_range(qty in 0u32..10_000) {
            let w = parcel_weight_kg(qty);
            prop_assert!((MIN_WEIGHT_KG..=MAX_WEIGHT_KG).contains(&w));
        }
    }
}
