use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use storefront_core::{Amount, Entity};

storefront_core::typed_id!(ProductId, "ProductId");

/// Availability flag derived from the general stock quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    InStock,
    OutOfStock,
}

/// Product as seen by checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    /// List price in whole currency units.
    pub price: Amount,
    /// Discount percentage (`0..=100`).
    pub discount: u32,
    pub images: Vec<String>,
    #[serde(default)]
    pub images_by_color: BTreeMap<String, Vec<String>>,
    /// Optional per-size stock. An entry of 0 (or no entry) means "not tracked
    /// separately" and reservations fall through to `stock_quantity`.
    #[serde(default)]
    pub stock_by_size: BTreeMap<String, u32>,
    pub stock_quantity: u32,
    pub stock_status: StockStatus,
    /// Set when an operator forced the status; restocking then leaves it alone.
    #[serde(default)]
    pub stock_status_forced: bool,
}

impl Product {
    pub fn new(sku: impl Into<String>, name: impl Into<String>, price: Amount, stock_quantity: u32) -> Self {
        let mut product = Self {
            id: ProductId::generate(),
            sku: sku.into().to_uppercase(),
            name: name.into(),
            price,
            discount: 0,
            images: Vec::new(),
            images_by_color: BTreeMap::new(),
            stock_by_size: BTreeMap::new(),
            stock_quantity,
            stock_status: StockStatus::OutOfStock,
            stock_status_forced: false,
        };
        product.refresh_stock_status();
        product
    }

    pub fn with_discount(mut self, discount: u32) -> Self {
        self.discount = discount.min(100);
        self
    }

    pub fn with_size_stock(mut self, size: impl Into<String>, quantity: u32) -> Self {
        self.stock_by_size.insert(size.into(), quantity);
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.images.push(url.into());
        self
    }

    /// Size-specific count, if it is tracked (present and > 0).
    pub fn tracked_size_stock(&self, size: Option<&str>) -> Option<u32> {
        size.and_then(|s| self.stock_by_size.get(s))
            .copied()
            .filter(|qty| *qty > 0)
    }

    /// Image to snapshot on an order line: first color image, else first image.
    pub fn image_for(&self, color: Option<&str>) -> Option<String> {
        color
            .and_then(|c| self.images_by_color.get(c))
            .and_then(|imgs| imgs.first())
            .or_else(|| self.images.first())
            .cloned()
    }

    /// Operator override of the availability flag.
    pub fn force_stock_status(&mut self, status: StockStatus) {
        self.stock_status = status;
        self.stock_status_forced = true;
    }

    /// Re-derive the availability flag after a stock change.
    ///
    /// Reaching 0 always flips to `OutOfStock`. Restocking flips back to
    /// `InStock` only when the status was not forced by an operator.
    pub fn refresh_stock_status(&mut self) {
        if self.stock_quantity == 0 {
            self.stock_status = StockStatus::OutOfStock;
        } else if self.stock_status == StockStatus::OutOfStock && !self.stock_status_forced {
            self.stock_status = StockStatus::InStock;
        }
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
