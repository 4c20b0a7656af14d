use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use storefront_events::{EventBus, EventEnvelope, Subscription};
use storefront_payments::PaymentEvent;
use storefront_returns::{ReturnEvent, ReturnId, ReturnRequest};
use storefront_sales::{Order, OrderEvent, OrderId, OrderStatus, PaymentMethod};

use super::{NotifyError, Notifier};
use crate::store::{AggregateStore, StoreError};

/// What a bus event asks the notifier to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Admin "new order" plus customer confirmation.
    OrderConfirmed { order_id: OrderId },
    StatusChanged { order_id: OrderId, from: OrderStatus, to: OrderStatus },
    ReturnUpdated { return_id: ReturnId },
}

/// Map one event to the notice it triggers, if any.
///
/// COD orders are confirmed at placement; online orders once the gateway
/// payment succeeds.
pub fn route(envelope: &EventEnvelope<JsonValue>) -> Result<Option<Notice>, serde_json::Error> {
    let notice = match envelope.aggregate_type() {
        "sales.order" => match envelope.decode::<OrderEvent>()? {
            OrderEvent::OrderPlaced(e) if e.payment_method == PaymentMethod::Cod => {
                Some(Notice::OrderConfirmed { order_id: e.order_id })
            }
            OrderEvent::StatusChanged(e) => Some(Notice::StatusChanged {
                order_id: e.order_id,
                from: e.from,
                to: e.to,
            }),
            _ => None,
        },
        "payments.payment" => match envelope.decode::<PaymentEvent>()? {
            PaymentEvent::PaymentSucceeded(e) if e.method != PaymentMethod::Cod => {
                Some(Notice::OrderConfirmed { order_id: e.order_id })
            }
            _ => None,
        },
        "returns.return" => match envelope.decode::<ReturnEvent>()? {
            ReturnEvent::ReturnApproved(e) => Some(Notice::ReturnUpdated { return_id: e.return_id }),
            ReturnEvent::ReturnRejected(e) => Some(Notice::ReturnUpdated { return_id: e.return_id }),
            ReturnEvent::RefundUpdated(e) => Some(Notice::ReturnUpdated { return_id: e.return_id }),
            ReturnEvent::ReturnRequested(_) => None,
        },
        _ => None,
    };
    Ok(notice)
}

#[derive(Debug, thiserror::Error)]
enum DeliveryError {
    #[error("{0} not found")]
    Missing(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Handle to stop and join the notification thread.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request shutdown and wait for the thread to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Subscribes to the bus and turns order, payment and return events into
/// notifications. Failures are logged and never reach the request that
/// produced the event.
#[derive(Debug)]
pub struct NotificationWorker;

impl NotificationWorker {
    /// `runtime` drives the async store lookups from the worker thread.
    pub fn spawn<B, OS, RS, N>(bus: B, orders: OS, returns: RS, notifier: N, runtime: Handle) -> io::Result<WorkerHandle>
    where
        B: EventBus<EventEnvelope<JsonValue>> + 'static,
        OS: AggregateStore<Order> + 'static,
        RS: AggregateStore<ReturnRequest> + 'static,
        N: Notifier + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe();

        let join = thread::Builder::new()
            .name("notification-worker".to_string())
            .spawn(move || {
                let ctx = Delivery { orders, returns, notifier, runtime };
                worker_loop(sub, shutdown_rx, &ctx);
            })?;

        Ok(WorkerHandle { shutdown: shutdown_tx, join: Some(join) })
    }
}

struct Delivery<OS, RS, N> {
    orders: OS,
    returns: RS,
    notifier: N,
    runtime: Handle,
}

impl<OS, RS, N> Delivery<OS, RS, N>
where
    OS: AggregateStore<Order>,
    RS: AggregateStore<ReturnRequest>,
    N: Notifier,
{
    fn order(&self, id: OrderId) -> Result<Order, DeliveryError> {
        self.runtime
            .block_on(self.orders.load(id.aggregate_id()))?
            .ok_or(DeliveryError::Missing("order"))
    }

    fn deliver(&self, notice: &Notice) -> Result<(), DeliveryError> {
        match notice {
            Notice::OrderConfirmed { order_id } => {
                let order = self.order(*order_id)?;
                // The customer copy still goes out when the admin address is missing.
                if let Err(e) = self.notifier.new_order_admin(&order) {
                    warn!(order_number = order.order_number(), error = %e, "admin order notification failed");
                }
                self.notifier.order_confirmation_customer(&order)?;
            }
            Notice::StatusChanged { order_id, from, to } => {
                let order = self.order(*order_id)?;
                self.notifier.order_status_changed(&order, *from, *to)?;
            }
            Notice::ReturnUpdated { return_id } => {
                let request = self
                    .runtime
                    .block_on(self.returns.load(return_id.aggregate_id()))?
                    .ok_or(DeliveryError::Missing("return request"))?;
                self.notifier.return_status_changed(&request)?;
            }
        }
        Ok(())
    }
}

fn worker_loop<OS, RS, N>(sub: Subscription<EventEnvelope<JsonValue>>, shutdown_rx: mpsc::Receiver<()>, ctx: &Delivery<OS, RS, N>)
where
    OS: AggregateStore<Order>,
    RS: AggregateStore<ReturnRequest>,
    N: Notifier,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(envelope) => match route(&envelope) {
                Ok(Some(notice)) => {
                    debug!(event_type = envelope.event_type(), ?notice, "delivering notification");
                    if let Err(e) = ctx.deliver(&notice) {
                        warn!(event_type = envelope.event_type(), error = %e, "notification failed");
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(event_type = envelope.event_type(), error = %e, "undecodable event payload"),
            },
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use chrono::Utc;
    use storefront_core::{Aggregate, AggregateRoot, ExpectedVersion};
    use storefront_events::InMemoryEventBus;
    use storefront_sales::{OrderCommand, UpdateStatus};

    use crate::store::InMemoryAggregateStore;
    use crate::test_support::placed_order;

    #[derive(Default, Clone)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Recorder {
        fn sent(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Notifier for Recorder {
        fn new_order_admin(&self, order: &Order) -> Result<(), NotifyError> {
            self.0.lock().unwrap().push(format!("admin:{}", order.order_number()));
            Ok(())
        }

        fn order_confirmation_customer(&self, order: &Order) -> Result<(), NotifyError> {
            self.0.lock().unwrap().push(format!("confirm:{}", order.order_number()));
            Ok(())
        }

        fn order_status_changed(&self, _order: &Order, from: OrderStatus, to: OrderStatus) -> Result<(), NotifyError> {
            self.0.lock().unwrap().push(format!("status:{from}->{to}"));
            Ok(())
        }

        fn return_status_changed(&self, request: &ReturnRequest) -> Result<(), NotifyError> {
            self.0.lock().unwrap().push(format!("return:{}", request.return_number()));
            Ok(())
        }
    }

    fn envelopes(order: &Order, events: &[OrderEvent]) -> Vec<EventEnvelope<JsonValue>> {
        events
            .iter()
            .enumerate()
            .map(|(i, e)| EventEnvelope::from_typed(order.id().aggregate_id(), "sales.order", i as u64 + 1, e).unwrap())
            .collect()
    }

    #[test]
    fn cod_placement_confirms_but_online_waits_for_payment() {
        let cod = placed_order(PaymentMethod::Cod);
        let placed = OrderEvent::OrderPlaced(placed_event(&cod));
        let env = &envelopes(&cod, &[placed])[0];
        assert_eq!(route(env).unwrap(), Some(Notice::OrderConfirmed { order_id: cod.id_typed() }));

        let online = placed_order(PaymentMethod::Online);
        let placed = OrderEvent::OrderPlaced(placed_event(&online));
        let env = &envelopes(&online, &[placed])[0];
        assert_eq!(route(env).unwrap(), None);
    }

    #[test]
    fn unknown_aggregates_are_ignored() {
        let env = EventEnvelope::new(
            uuid::Uuid::now_v7(),
            storefront_core::AggregateId::new(),
            "catalog.product",
            1,
            "catalog.product.updated",
            Utc::now(),
            serde_json::json!({}),
        );
        assert_eq!(route(&env).unwrap(), None);
    }

    fn placed_event(order: &Order) -> storefront_sales::OrderPlaced {
        storefront_sales::OrderPlaced {
            order_id: order.id_typed(),
            order_number: order.order_number().to_string(),
            customer_id: order.customer_id().unwrap(),
            items: order.items().to_vec(),
            shipping_address: order.shipping_address().cloned().unwrap(),
            totals: *order.totals(),
            coupon_code: None,
            payment_method: order.payment_method(),
            notes: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn worker_sends_confirmation_and_status_notices() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let bus = Arc::new(InMemoryEventBus::<EventEnvelope<JsonValue>>::new());
        let orders = Arc::new(InMemoryAggregateStore::<Order>::new());
        let returns = Arc::new(InMemoryAggregateStore::<ReturnRequest>::new());
        let recorder = Recorder::default();

        let mut order = placed_order(PaymentMethod::Cod);
        let mut events = vec![OrderEvent::OrderPlaced(placed_event(&order))];
        events.extend(
            order
                .execute(&OrderCommand::UpdateStatus(UpdateStatus::to(
                    order.id_typed(),
                    OrderStatus::Confirmed,
                    Utc::now(),
                )))
                .unwrap(),
        );
        rt.block_on(orders.save(&order, ExpectedVersion::Any)).unwrap();

        let handle =
            NotificationWorker::spawn(bus.clone(), orders, returns, recorder.clone(), rt.handle().clone()).unwrap();
        for env in envelopes(&order, &events) {
            bus.publish(env).unwrap();
        }

        for _ in 0..100 {
            if recorder.sent().len() == 3 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        handle.shutdown();

        assert_eq!(
            recorder.sent(),
            vec![
                "admin:ORD17000000000000001".to_string(),
                "confirm:ORD17000000000000001".to_string(),
                "status:PENDING->CONFIRMED".to_string(),
            ]
        );
    }
}
