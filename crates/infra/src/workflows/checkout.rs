use chrono::{DateTime, Utc};
use tracing::{info, warn};

use storefront_catalog::{Coupon, Product, ProductId, StoreSettings};
use storefront_core::Amount;
use storefront_customers::{Customer, CustomerId};
use storefront_inventory::StockDebit;
use storefront_payments::{Gateway, OpenPayment, Payment, PaymentCommand, PaymentId};
use storefront_pricing::{evaluate_coupon, price_cart, CartLine, CouponOutcome, CouponRejection, CouponRequest, PricedCart};
use storefront_sales::{
    AddressInput, LineItem, LineItemId, Order, OrderCommand, OrderId, OrderTotals, PaymentMethod, PlaceOrder,
    ShippingAddress,
};

use super::{Storefront, WorkflowError, WorkflowResult};
use crate::ledger::{release_all, reserve_all, LineReservation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub size: Option<String>,
    pub color: Option<String>,
    /// Unit price sent by the storefront; wins over the list price.
    pub price: Option<Amount>,
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// Authenticated customer, if any. Guests are resolved by email.
    pub customer_id: Option<CustomerId>,
    pub items: Vec<CheckoutItem>,
    pub shipping_address: AddressInput,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    pub order: Order,
    /// Absent only if the companion payment record could not be written; a
    /// later intent creates it.
    pub payment: Option<Payment>,
    pub coupon: CouponOutcome,
}

/// Coupon check result with an explicit reason on rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouponCheck {
    Valid { code: String, discount: Amount },
    Invalid { code: String, rejection: CouponRejection },
}

fn validate_items(items: &[CheckoutItem]) -> WorkflowResult<()> {
    if items.is_empty() {
        return Err(WorkflowError::validation("Order must contain at least one item"));
    }
    for (idx, item) in items.iter().enumerate() {
        if item.quantity == 0 {
            return Err(WorkflowError::validation(format!("Item {}: quantity must be at least 1", idx + 1)));
        }
    }
    Ok(())
}

fn line_items(priced: &PricedCart, items: &[CheckoutItem], products: &[Product], debits: &[StockDebit]) -> Vec<LineItem> {
    priced
        .lines
        .iter()
        .zip(items)
        .zip(products)
        .zip(debits)
        .map(|(((line, item), product), debit)| LineItem {
            line_id: LineItemId::generate(),
            product_id: product.id,
            name: product.name.clone(),
            sku: product.sku.clone(),
            image: product.image_for(item.color.as_deref()),
            price: line.price,
            discount: line.discount,
            unit_price: line.unit_price,
            quantity: line.quantity,
            size: item.size.clone(),
            color: item.color.clone(),
            reserved_from: debit.source.clone(),
        })
        .collect()
}

impl Storefront {
    /// Price, reserve and place an order together with its pending payment.
    ///
    /// Stock is reserved all-or-nothing before anything is persisted. An
    /// ineligible coupon never fails checkout; the receipt reports it.
    pub async fn create_order(&self, request: CheckoutRequest) -> WorkflowResult<CheckoutReceipt> {
        validate_items(&request.items)?;
        if request.payment_method == PaymentMethod::Wallet {
            return Err(WorkflowError::validation("Payment method must be COD or ONLINE"));
        }
        let shipping_address = ShippingAddress::from_input(request.shipping_address.clone())?;

        let settings = self.catalog.settings().await?;
        if request.payment_method == PaymentMethod::Cod && !settings.cod_enabled {
            return Err(WorkflowError::validation("Cash on delivery is not available"));
        }

        let now = Utc::now();
        let customer = self.resolve_customer(request.customer_id, &shipping_address, now).await?;

        let mut products = Vec::with_capacity(request.items.len());
        for (idx, item) in request.items.iter().enumerate() {
            let product = self
                .catalog
                .product(item.product_id)
                .await?
                .ok_or_else(|| WorkflowError::NotFound(format!("Item {}: product {} not found", idx + 1, item.product_id)))?;
            products.push(product);
        }

        let coupon_code = request.coupon_code.as_deref().map(str::trim).filter(|c| !c.is_empty());
        let coupon = match coupon_code {
            Some(code) => self.catalog.coupon_by_code(code).await?,
            None => None,
        };
        let mut priced = self.price(&request.items, &products, &settings, coupon_code, coupon.as_ref(), &customer, now);

        let reservations: Vec<LineReservation> = request
            .items
            .iter()
            .map(|item| LineReservation {
                product_id: item.product_id,
                size: item.size.clone(),
                quantity: item.quantity,
            })
            .collect();
        let debits = reserve_all(self.ledger.as_ref(), &reservations).await?;

        if let CouponOutcome::Applied { code, .. } = &priced.coupon {
            let code = code.clone();
            match self.catalog.redeem_coupon(&code).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(coupon = %code, "coupon usage limit reached at redemption, pricing without it");
                    priced = self.price(&request.items, &products, &settings, None, None, &customer, now);
                    priced.coupon = CouponOutcome::NotApplied { code, rejection: CouponRejection::UsageLimitReached };
                }
                Err(e) => {
                    release_all(self.ledger.as_ref(), &debits).await;
                    return Err(e.into());
                }
            }
        }

        let order_number = match self.sequence.next_order_number().await {
            Ok(n) => n,
            Err(e) => {
                release_all(self.ledger.as_ref(), &debits).await;
                warn_redeemed_coupon(&priced, &e);
                return Err(e.into());
            }
        };

        let order_id = OrderId::generate();
        let place = PlaceOrder {
            order_id,
            order_number: order_number.clone(),
            customer_id: customer.id,
            items: line_items(&priced, &request.items, &products, &debits),
            shipping_address,
            totals: OrderTotals {
                subtotal: priced.subtotal,
                shipping_charges: priced.shipping,
                discount: priced.discount,
                tax: priced.tax,
                total: priced.total,
            },
            coupon_code: priced.coupon.applied_code().map(str::to_string),
            payment_method: request.payment_method,
            notes: request.notes.clone().filter(|n| !n.trim().is_empty()),
            occurred_at: now,
        };

        let placed = match self
            .orders
            .create(order_id.aggregate_id(), OrderCommand::PlaceOrder(place), |id| Order::empty(OrderId::new(id)))
            .await
        {
            Ok(placed) => placed.aggregate,
            Err(e) => {
                release_all(self.ledger.as_ref(), &debits).await;
                warn_redeemed_coupon(&priced, &e);
                return Err(e.into());
            }
        };
        info!(
            order_number = %order_number,
            total = placed.total(),
            payment_method = ?request.payment_method,
            coupon = ?placed.coupon_code(),
            "order placed"
        );

        let payment_id = PaymentId::generate();
        let payment = match self
            .payments
            .create(
                payment_id.aggregate_id(),
                PaymentCommand::OpenPayment(OpenPayment {
                    payment_id,
                    order_id,
                    amount: placed.total(),
                    method: request.payment_method,
                    gateway: Gateway::for_method(request.payment_method),
                    occurred_at: now,
                }),
                |id| Payment::empty(PaymentId::new(id)),
            )
            .await
        {
            Ok(d) => Some(d.aggregate),
            Err(e) => {
                warn!(order_number = %order_number, error = %e, "failed to open payment record");
                None
            }
        };

        if let Err(e) = self.customers.record_order(customer.id, placed.total(), now).await {
            warn!(order_number = %order_number, error = %e, "failed to update customer aggregates");
        }

        Ok(CheckoutReceipt { order: placed, payment, coupon: priced.coupon })
    }

    /// Evaluate a coupon against a cart subtotal without redeeming it.
    pub async fn validate_coupon(
        &self,
        code: &str,
        subtotal: Amount,
        total_quantity: u32,
        customer_id: Option<CustomerId>,
    ) -> WorkflowResult<CouponCheck> {
        let code = code.trim();
        if code.is_empty() {
            return Err(WorkflowError::validation("Coupon code is required"));
        }
        let coupon = self.catalog.coupon_by_code(code).await?;
        let customer_has_orders = match customer_id {
            Some(id) => self.customers.get(id).await?.is_some_and(|c| c.has_ordered()),
            None => false,
        };
        let request = CouponRequest { subtotal, total_quantity: total_quantity.max(1), customer_has_orders, now: Utc::now() };
        let code = code.to_uppercase();
        Ok(match evaluate_coupon(coupon.as_ref(), &request) {
            Ok(discount) => CouponCheck::Valid { code, discount },
            Err(rejection) => CouponCheck::Invalid { code, rejection },
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn price(
        &self,
        items: &[CheckoutItem],
        products: &[Product],
        settings: &StoreSettings,
        coupon_code: Option<&str>,
        coupon: Option<&Coupon>,
        customer: &Customer,
        now: DateTime<Utc>,
    ) -> PricedCart {
        let lines: Vec<CartLine<'_>> = items
            .iter()
            .zip(products)
            .map(|(item, product)| CartLine { product, quantity: item.quantity, price_override: item.price })
            .collect();
        price_cart(&lines, settings, coupon_code, coupon, customer.has_ordered(), now)
    }

    /// The authenticated customer, else the guest record for the address email.
    async fn resolve_customer(
        &self,
        customer_id: Option<CustomerId>,
        address: &ShippingAddress,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Customer> {
        if let Some(id) = customer_id {
            if let Some(customer) = self.customers.get(id).await? {
                return Ok(customer);
            }
            warn!(customer_id = %id, "token customer unknown, falling back to email");
        }

        if let Some(existing) = self.customers.find_by_email(&address.email).await? {
            return Ok(existing);
        }

        let phone = Some(address.phone.clone());
        let guest = Customer::guest(&address.first_name, &address.last_name, &address.email, phone, now);
        match self.customers.create(&guest).await {
            Ok(()) => Ok(guest),
            // Lost a race with a concurrent checkout for the same email.
            Err(crate::store::StoreError::AlreadyExists(_)) => self
                .customers
                .find_by_email(&address.email)
                .await?
                .ok_or_else(|| WorkflowError::Internal("guest customer vanished".into())),
            Err(e) => Err(e.into()),
        }
    }
}

/// Redemption is not rolled back, so a failed placement keeps the coupon's use.
fn warn_redeemed_coupon(priced: &PricedCart, error: &dyn std::fmt::Display) {
    if let Some(code) = priced.coupon.applied_code() {
        warn!(coupon = code, error = %error, "order not saved after coupon redemption, usage count stays incremented");
    }
}
