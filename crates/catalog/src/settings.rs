use serde::{Deserialize, Serialize};

use storefront_core::Amount;

/// Store-wide checkout settings (single record).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    pub shipping_charges: Amount,
    /// Subtotal at or above which shipping is free. 0 disables free shipping.
    pub free_shipping_threshold: Amount,
    /// Recorded on the settings record, not applied to order totals.
    #[serde(default)]
    pub tax_rate: u32,
    pub cod_enabled: bool,
}

impl StoreSettings {
    pub fn shipping_for(&self, subtotal: Amount) -> Amount {
        if self.free_shipping_threshold > 0 && subtotal >= self.free_shipping_threshold {
            0
        } else {
            self.shipping_charges
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            shipping_charges: 50,
            free_shipping_threshold: 1000,
            tax_rate: 0,
            cod_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipping_is_free_at_threshold() {
        let s = StoreSettings::default();
        assert_eq!(s.shipping_for(999), 50);
        assert_eq!(s.shipping_for(1000), 0);
    }

    #[test]
    fn zero_threshold_never_frees_shipping() {
        let s = StoreSettings { free_shipping_threshold: 0, ..StoreSettings::default() };
        assert_eq!(s.shipping_for(1_000_000), 50);
    }
}
