//! Value objects embedded in an order: line snapshots and the shipping address.

use serde::{Deserialize, Serialize};

use storefront_catalog::ProductId;
use storefront_core::{Amount, DomainError, DomainResult, ValueObject};
use storefront_customers::AddressType;
use storefront_inventory::{StockDebit, StockSource};

storefront_core::typed_id!(LineItemId, "LineItemId");

/// Line snapshot captured at order time; never re-read from the live product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub line_id: LineItemId,
    pub product_id: ProductId,
    pub name: String,
    pub sku: String,
    pub image: Option<String>,
    /// Price the discount applies to.
    pub price: Amount,
    /// Percent discount captured for the line.
    pub discount: u32,
    /// Effective unit price (`price` after `discount`, rounded).
    pub unit_price: Amount,
    pub quantity: u32,
    pub size: Option<String>,
    pub color: Option<String>,
    /// Counter the reservation was taken from; release mirrors it.
    pub reserved_from: StockSource,
}

impl LineItem {
    pub fn total(&self) -> Amount {
        self.unit_price.saturating_mul(u64::from(self.quantity))
    }

    /// The stock movement this line holds, for `quantity` units.
    pub fn debit_for(&self, quantity: u32) -> StockDebit {
        StockDebit {
            product_id: self.product_id,
            source: self.reserved_from.clone(),
            quantity,
        }
    }

    pub fn debit(&self) -> StockDebit {
        self.debit_for(self.quantity)
    }
}

impl ValueObject for LineItem {}

/// Raw address fields as submitted at checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub street: Option<String>,
    pub address: Option<String>,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub country: Option<String>,
    pub landmark: Option<String>,
    pub address_type: Option<AddressType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub first_name: String,
    pub last_name: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub country: String,
    pub landmark: String,
    pub address_type: AddressType,
}

impl ShippingAddress {
    pub const DEFAULT_COUNTRY: &'static str = "India";

    /// Normalise checkout input, applying defaults. An email is mandatory.
    pub fn from_input(input: AddressInput) -> DomainResult<Self> {
        let email = input.email.trim().to_string();
        if email.is_empty() {
            return Err(DomainError::validation("Shipping address with email is required"));
        }
        let name = format!("{} {}", input.first_name.trim(), input.last_name.trim())
            .trim()
            .to_string();
        let street = input
            .street
            .filter(|s| !s.trim().is_empty())
            .or(input.address)
            .unwrap_or_default();

        Ok(Self {
            first_name: input.first_name,
            last_name: input.last_name,
            name,
            email,
            phone: input.phone,
            street,
            city: input.city,
            state: input.state,
            pincode: input.pincode,
            country: input
                .country
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| Self::DEFAULT_COUNTRY.to_string()),
            landmark: input.landmark.unwrap_or_default(),
            address_type: input.address_type.unwrap_or_default(),
        })
    }
}

impl ValueObject for ShippingAddress {}
