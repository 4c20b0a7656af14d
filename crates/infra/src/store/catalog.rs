//! Products, coupons and store settings as checkout reads them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use storefront_catalog::coupon::normalize_code;
use storefront_catalog::{Coupon, Product, ProductId, StoreSettings};

use super::{map_sqlx_error, poisoned, StoreError};

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError>;

    /// Case-insensitive code lookup.
    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError>;

    async fn upsert_coupon(&self, coupon: &Coupon) -> Result<(), StoreError>;

    /// Atomically increment `used_count` if the coupon is active and has uses
    /// left. Returns whether the redemption happened.
    async fn redeem_coupon(&self, code: &str) -> Result<bool, StoreError>;

    async fn settings(&self) -> Result<StoreSettings, StoreError>;

    async fn save_settings(&self, settings: &StoreSettings) -> Result<(), StoreError>;
}

/// In-memory catalog. Products sit behind one mutex so the inventory ledger
/// can check and decrement under a single guard.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    pub(crate) products: Mutex<HashMap<ProductId, Product>>,
    coupons: RwLock<HashMap<String, Coupon>>,
    settings: RwLock<StoreSettings>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let products = self.products.lock().map_err(|_| poisoned())?;
        Ok(products.get(&id).cloned())
    }

    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut products = self.products.lock().map_err(|_| poisoned())?;
        products.insert(product.id, product.clone());
        Ok(())
    }

    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        let coupons = self.coupons.read().map_err(|_| poisoned())?;
        Ok(coupons.get(&normalize_code(code)).cloned())
    }

    async fn upsert_coupon(&self, coupon: &Coupon) -> Result<(), StoreError> {
        let mut coupons = self.coupons.write().map_err(|_| poisoned())?;
        coupons.insert(normalize_code(&coupon.code), coupon.clone());
        Ok(())
    }

    async fn redeem_coupon(&self, code: &str) -> Result<bool, StoreError> {
        let mut coupons = self.coupons.write().map_err(|_| poisoned())?;
        match coupons.get_mut(&normalize_code(code)) {
            Some(c) if c.is_active && c.has_uses_left() => {
                c.used_count += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn settings(&self) -> Result<StoreSettings, StoreError> {
        Ok(self.settings.read().map_err(|_| poisoned())?.clone())
    }

    async fn save_settings(&self, settings: &StoreSettings) -> Result<(), StoreError> {
        *self.settings.write().map_err(|_| poisoned())? = settings.clone();
        Ok(())
    }
}

/// Postgres catalog: one JSONB document per product/coupon, one settings row.
#[derive(Debug, Clone)]
pub struct PostgresCatalog {
    pub(crate) pool: Arc<PgPool>,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

pub(crate) fn decode_doc<T: serde::de::DeserializeOwned>(row: &sqlx::postgres::PgRow) -> Result<T, StoreError> {
    let data: serde_json::Value = row
        .try_get("data")
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    serde_json::from_value(data).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub(crate) fn encode_doc<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[async_trait]
impl CatalogStore for PostgresCatalog {
    #[instrument(skip(self), err)]
    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query("SELECT data FROM products WHERE id = $1")
            .bind(id.aggregate_id().as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("product", e))?;
        row.as_ref().map(decode_doc).transpose()
    }

    #[instrument(skip(self, product), fields(sku = %product.sku), err)]
    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, sku, data) VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET sku = EXCLUDED.sku, data = EXCLUDED.data, updated_at = now()
            "#,
        )
        .bind(product.id.aggregate_id().as_uuid())
        .bind(&product.sku)
        .bind(encode_doc(product)?)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_product", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        let row = sqlx::query("SELECT data FROM coupons WHERE code = $1")
            .bind(normalize_code(code))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("coupon_by_code", e))?;
        row.as_ref().map(decode_doc).transpose()
    }

    #[instrument(skip(self, coupon), fields(code = %coupon.code), err)]
    async fn upsert_coupon(&self, coupon: &Coupon) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO coupons (code, data) VALUES ($1, $2)
            ON CONFLICT (code) DO UPDATE SET data = EXCLUDED.data, updated_at = now()
            "#,
        )
        .bind(normalize_code(&coupon.code))
        .bind(encode_doc(coupon)?)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_coupon", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn redeem_coupon(&self, code: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE coupons
            SET data = jsonb_set(data, '{used_count}', to_jsonb((data->>'used_count')::bigint + 1)),
                updated_at = now()
            WHERE code = $1
              AND (data->>'is_active')::boolean
              AND (jsonb_typeof(data->'usage_limit') IS DISTINCT FROM 'number'
                   OR (data->>'used_count')::bigint < (data->>'usage_limit')::bigint)
            "#,
        )
        .bind(normalize_code(code))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("redeem_coupon", e))?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), err)]
    async fn settings(&self) -> Result<StoreSettings, StoreError> {
        let row = sqlx::query("SELECT data FROM settings WHERE id = 1")
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("settings", e))?;
        Ok(row.as_ref().map(decode_doc).transpose()?.unwrap_or_default())
    }

    #[instrument(skip(self, settings), err)]
    async fn save_settings(&self, settings: &StoreSettings) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO settings (id, data) VALUES (1, $1) ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(encode_doc(settings)?)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_settings", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use storefront_catalog::DiscountType;

    #[tokio::test]
    async fn coupon_lookup_is_case_insensitive() {
        let catalog = InMemoryCatalog::new();
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        catalog
            .upsert_coupon(&Coupon::new("save10", DiscountType::Percentage, 10, at))
            .await
            .unwrap();
        assert!(catalog.coupon_by_code("SAVE10").await.unwrap().is_some());
        assert!(catalog.coupon_by_code(" Save10 ").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn redeem_stops_at_usage_limit() {
        let catalog = InMemoryCatalog::new();
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut coupon = Coupon::new("ONCE", DiscountType::Flat, 50, at);
        coupon.usage_limit = Some(1);
        catalog.upsert_coupon(&coupon).await.unwrap();

        assert!(catalog.redeem_coupon("once").await.unwrap());
        assert!(!catalog.redeem_coupon("once").await.unwrap());
        assert!(!catalog.redeem_coupon("missing").await.unwrap());
        assert_eq!(catalog.coupon_by_code("ONCE").await.unwrap().unwrap().used_count, 1);
    }

    #[tokio::test]
    async fn settings_default_until_saved() {
        let catalog = InMemoryCatalog::new();
        assert_eq!(catalog.settings().await.unwrap(), StoreSettings::default());

        let custom = StoreSettings { cod_enabled: false, ..StoreSettings::default() };
        catalog.save_settings(&custom).await.unwrap();
        assert!(!catalog.settings().await.unwrap().cod_enabled);
    }
}
