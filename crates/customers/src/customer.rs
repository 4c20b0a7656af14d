use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{Amount, Entity};

storefront_core::typed_id!(CustomerId, "CustomerId");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AddressType {
    #[default]
    Home,
    Work,
    Other,
}

/// Address book entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub country: String,
    #[serde(default)]
    pub landmark: String,
    #[serde(default)]
    pub address_type: AddressType,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub contact: ContactInfo,
    #[serde(default)]
    pub addresses: Vec<Address>,
    pub total_orders: u32,
    pub total_spent: Amount,
    pub last_order_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    pub fn new(name: impl Into<String>, email: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: CustomerId::generate(),
            name: name.into(),
            contact: ContactInfo { email: email.trim().to_lowercase(), phone: None },
            addresses: Vec::new(),
            total_orders: 0,
            total_spent: 0,
            last_order_at: None,
            created_at,
        }
    }

    /// Guest checkout record, named `"first last"`.
    pub fn guest(first_name: &str, last_name: &str, email: &str, phone: Option<String>, now: DateTime<Utc>) -> Self {
        let name = format!("{} {}", first_name.trim(), last_name.trim()).trim().to_string();
        let mut customer = Self::new(name, email, now);
        customer.contact.phone = phone.filter(|p| !p.trim().is_empty());
        customer
    }

    pub fn email(&self) -> &str {
        &self.contact.email
    }

    /// Case-insensitive email match.
    pub fn matches_email(&self, email: &str) -> bool {
        self.contact.email.eq_ignore_ascii_case(email.trim())
    }

    pub fn has_ordered(&self) -> bool {
        self.total_orders > 0
    }

    pub fn record_order(&mut self, total: Amount, at: DateTime<Utc>) {
        self.total_orders += 1;
        self.total_spent = self.total_spent.saturating_add(total);
        self.last_order_at = Some(at);
    }

    pub fn default_address(&self) -> Option<&Address> {
        self.addresses
            .iter()
            .find(|a| a.is_default)
            .or_else(|| self.addresses.first())
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
