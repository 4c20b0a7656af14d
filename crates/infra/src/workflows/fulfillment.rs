use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use storefront_customers::CustomerId;
use storefront_fulfillment::{
    build_create_order, choose_courier, courier_options, ensure_shippable, normalize_pincode, parcel_weight_kg,
    tracking_number, ShipmentSnapshot,
};
use storefront_sales::{AdoptTracking, Order, OrderCommand, OrderId, PaymentMethod, RecordExternalShipment};

use super::{Storefront, WorkflowError, WorkflowResult};
use crate::external::{CourierError, ServiceabilityQuery};
use crate::jobs::Job;

#[derive(Debug, Clone)]
pub struct ShipmentOutcome {
    /// An AWB was adopted during this call (or was already present).
    pub assigned: bool,
    pub order: Order,
}

impl Storefront {
    /// Hand an order to the courier aggregator and try to get an AWB.
    ///
    /// The external order is created at most once. Assignment is attempted
    /// through the create response, auto-assignment, then the serviceable
    /// courier list; when all of those come back empty a delayed re-fetch is
    /// queued. `settle_delay` is waited after a fresh create before assigning.
    pub async fn create_shipment(
        &self,
        order_id: OrderId,
        courier_id: Option<&str>,
        settle_delay: Duration,
    ) -> WorkflowResult<ShipmentOutcome> {
        let mut order = self.load_order(order_id).await?;
        ensure_shippable(&order)?;
        if order.shipment().has_tracking() {
            return Ok(ShipmentOutcome { assigned: true, order });
        }

        let mut just_created = false;
        if !order.shipment().is_handed_over() {
            let payload = build_create_order(&order, self.courier.pickup_location())?;
            let response = self.courier.create_order(&payload).await?;
            let snapshot = ShipmentSnapshot::from_response(&response);
            if snapshot.external_order_id.is_none() {
                return Err(WorkflowError::Upstream {
                    service: "courier",
                    status: None,
                    body: "create order response carried no order id".into(),
                });
            }

            order = self
                .orders
                .dispatch::<Order>(
                    order_id.aggregate_id(),
                    OrderCommand::RecordExternalShipment(RecordExternalShipment {
                        order_id,
                        external_order_id: snapshot.external_order_id.clone(),
                        external_shipment_id: snapshot.external_shipment_id.clone(),
                        occurred_at: Utc::now(),
                    }),
                )
                .await?
                .aggregate;
            info!(
                order_number = order.order_number(),
                external_order_id = ?snapshot.external_order_id,
                external_shipment_id = ?snapshot.external_shipment_id,
                "courier order created"
            );
            just_created = true;

            if let Some(awb) = snapshot.tracking_number {
                let order = self.adopt(order_id, awb, snapshot.carrier).await?;
                return Ok(ShipmentOutcome { assigned: true, order });
            }
        }

        if let Some(shipment_id) = order.shipment().external_shipment_id.clone() {
            if just_created && !settle_delay.is_zero() {
                tokio::time::sleep(settle_delay).await;
            }
            if let Some((awb, carrier)) = self.assign(&order, &shipment_id, courier_id).await {
                let order = self.adopt(order_id, awb, carrier).await?;
                return Ok(ShipmentOutcome { assigned: true, order });
            }
        } else {
            warn!(order_number = order.order_number(), "courier order has no shipment id, cannot assign");
        }

        self.enqueue(Job::refetch_shipment(order_id).delayed(self.settings.shipment_refetch_delay), &order);
        Ok(ShipmentOutcome { assigned: false, order })
    }

    /// Auto-assign, then the preferred or first serviceable courier. Every
    /// failure here is soft.
    async fn assign(&self, order: &Order, shipment_id: &str, preferred: Option<&str>) -> Option<(String, Option<String>)> {
        match self.courier.assign_awb(shipment_id, None).await {
            Ok(doc) => {
                if let Some(awb) = tracking_number(&doc) {
                    return Some((awb, ShipmentSnapshot::from_response(&doc).carrier));
                }
                debug!(order_number = order.order_number(), "auto assignment returned no awb");
            }
            Err(e) => warn!(order_number = order.order_number(), error = %e, "auto assignment failed"),
        }

        let pickup = self.courier.pickup_postcode().to_string();
        let delivery = order
            .shipping_address()
            .map(|a| normalize_pincode(&a.pincode, &pickup))
            .unwrap_or_else(|| pickup.clone());
        let query = ServiceabilityQuery {
            pickup_postcode: pickup,
            delivery_postcode: delivery,
            weight_kg: parcel_weight_kg(order.total_quantity()),
            cod: order.payment_method() == PaymentMethod::Cod,
        };
        let options = match self.courier.serviceability(&query).await {
            Ok(doc) => courier_options(&doc),
            Err(e) => {
                warn!(order_number = order.order_number(), error = %e, "serviceability lookup failed");
                return None;
            }
        };
        let Some(choice) = choose_courier(&options, preferred) else {
            info!(order_number = order.order_number(), pincode = %query.delivery_postcode, "no serviceable courier");
            return None;
        };

        match self.courier.assign_awb(shipment_id, Some(&choice.id)).await {
            Ok(doc) => {
                let awb = tracking_number(&doc)?;
                let carrier = ShipmentSnapshot::from_response(&doc).carrier.or_else(|| choice.name.clone());
                Some((awb, carrier))
            }
            Err(e) => {
                warn!(order_number = order.order_number(), courier_id = %choice.id, error = %e, "courier assignment failed");
                None
            }
        }
    }

    async fn adopt(&self, order_id: OrderId, awb: String, carrier: Option<String>) -> WorkflowResult<Order> {
        let dispatched = self
            .orders
            .dispatch::<Order>(
                order_id.aggregate_id(),
                OrderCommand::AdoptTracking(AdoptTracking {
                    order_id,
                    tracking_number: awb,
                    carrier,
                    occurred_at: Utc::now(),
                }),
            )
            .await?;
        if dispatched.changed() {
            let order = &dispatched.aggregate;
            info!(
                order_number = order.order_number(),
                awb = ?order.shipment().tracking_number,
                carrier = ?order.shipment().carrier,
                status = %order.status(),
                "tracking number adopted"
            );
        }
        Ok(dispatched.aggregate)
    }

    /// Fetch the courier's copy of an order, by external id and then by
    /// order number.
    async fn lookup_external(&self, order: &Order) -> Result<Option<Value>, CourierError> {
        let keys = [order.shipment().external_order_id.clone(), Some(order.order_number().to_string())];
        for key in keys.into_iter().flatten() {
            if let Some(doc) = self.courier.get_order(&key).await? {
                return Ok(Some(doc));
            }
        }
        Ok(None)
    }

    /// Pick up an AWB the aggregator assigned since the last look. Never
    /// fails; on any problem the order comes back unchanged.
    pub async fn reconcile(&self, order: Order) -> Order {
        if order.shipment().has_tracking() || !order.shipment().is_handed_over() {
            return order;
        }
        let doc = match self.lookup_external(&order).await {
            Ok(Some(doc)) => doc,
            Ok(None) => return order,
            Err(e) => {
                warn!(order_number = order.order_number(), error = %e, "tracking reconciliation failed");
                return order;
            }
        };
        let snapshot = ShipmentSnapshot::from_response(&doc);
        let Some(awb) = snapshot.tracking_number else {
            return order;
        };
        match self.adopt(order.id_typed(), awb, snapshot.carrier).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!(order_number = order.order_number(), error = %e, "could not adopt reconciled tracking number");
                order
            }
        }
    }

    /// Deferred re-fetch. `Ok(false)` means still no AWB.
    pub async fn refetch_shipment(&self, order_id: OrderId) -> WorkflowResult<bool> {
        let order = self.load_order(order_id).await?;
        if order.shipment().has_tracking() {
            return Ok(true);
        }
        if !order.shipment().is_handed_over() {
            return Err(WorkflowError::validation("Order has not been sent to the courier"));
        }
        let Some(doc) = self.lookup_external(&order).await? else {
            return Ok(false);
        };
        let snapshot = ShipmentSnapshot::from_response(&doc);
        match snapshot.tracking_number {
            Some(awb) => {
                self.adopt(order_id, awb, snapshot.carrier).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Admin reconciliation that reports failures instead of hiding them.
    pub async fn sync_tracking(&self, order_id: OrderId) -> WorkflowResult<Order> {
        let order = self.load_order(order_id).await?;
        if !order.shipment().is_handed_over() {
            return Err(WorkflowError::validation("Order has not been sent to the courier"));
        }
        if order.shipment().has_tracking() {
            return Ok(order);
        }
        let doc = self.lookup_external(&order).await?.ok_or_else(|| WorkflowError::Upstream {
            service: "courier",
            status: None,
            body: format!("courier has no order {}", order.order_number()),
        })?;
        let snapshot = ShipmentSnapshot::from_response(&doc);
        match snapshot.tracking_number {
            Some(awb) => self.adopt(order_id, awb, snapshot.carrier).await,
            None => Ok(order),
        }
    }

    pub async fn track(&self, awb: &str) -> WorkflowResult<Value> {
        let awb = awb.trim();
        if awb.is_empty() {
            return Err(WorkflowError::validation("AWB is required"));
        }
        Ok(self.courier.track_awb(awb).await?)
    }

    pub async fn track_order(&self, order_id: OrderId, requester: Option<CustomerId>) -> WorkflowResult<Value> {
        let order = self.get_order(order_id, requester).await?;
        let awb = order
            .shipment()
            .tracking_number
            .clone()
            .ok_or_else(|| WorkflowError::NotFound("No tracking number for this order".into()))?;
        self.track(&awb).await
    }
}
