use std::sync::Arc;

use tracing::{info, warn};

use super::{RefundOutcome, Storefront, WorkflowError};
use crate::jobs::{Job, JobExecutor, JobKind, JobResult, JobStore, OrderJob, ShipmentJob};

fn failed(job: &Job, error: WorkflowError) -> JobResult {
    if error.is_retryable() {
        JobResult::Failure(error.to_string())
    } else {
        warn!(job_id = %job.id, kind = %job.kind, error = %error, "job cannot succeed, giving up");
        JobResult::Fatal(error.to_string())
    }
}

/// Wire the storefront's background work into `executor`.
pub fn register_job_handlers<S>(executor: &mut JobExecutor<S>, storefront: Arc<Storefront>)
where
    S: JobStore + 'static,
{
    let sf = storefront.clone();
    executor.register_handler(JobKind::CreateShipment, move |job| {
        let sf = sf.clone();
        async move {
            let payload: ShipmentJob = match job.payload_as() {
                Ok(p) => p,
                Err(e) => return JobResult::Fatal(e),
            };
            let delay = sf.settings().shipment_refetch_delay;
            match sf.create_shipment(payload.order_id, payload.courier_id.as_deref(), delay).await {
                Ok(outcome) => {
                    info!(order_number = outcome.order.order_number(), assigned = outcome.assigned, "shipment job done");
                    JobResult::Success
                }
                Err(e) => failed(&job, e),
            }
        }
    });

    let sf = storefront.clone();
    executor.register_handler(JobKind::RefetchShipment, move |job| {
        let sf = sf.clone();
        async move {
            let payload: OrderJob = match job.payload_as() {
                Ok(p) => p,
                Err(e) => return JobResult::Fatal(e),
            };
            match sf.refetch_shipment(payload.order_id).await {
                Ok(true) => JobResult::Success,
                Ok(false) => JobResult::Failure("tracking not yet assigned".into()),
                Err(e) => failed(&job, e),
            }
        }
    });

    executor.register_handler(JobKind::Refund, move |job| {
        let sf = storefront.clone();
        async move {
            let payload: OrderJob = match job.payload_as() {
                Ok(p) => p,
                Err(e) => return JobResult::Fatal(e),
            };
            match sf.refund_order(payload.order_id).await {
                Ok(RefundOutcome::Refunded { amount, .. }) => {
                    info!(order_id = %payload.order_id, amount, "automatic refund done");
                    JobResult::Success
                }
                Ok(RefundOutcome::Skipped(_)) => JobResult::Success,
                Err(e) => failed(&job, e),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use serde_json::json;
    use storefront_sales::{OrderStatus, PaymentMethod, PaymentStatus};

    use crate::jobs::{InMemoryJobStore, JobStatus, RetryPolicy};
    use crate::workflows::fakes::{signature, FakeCourier, Harness};
    use crate::workflows::PaymentVerification;

    #[tokio::test]
    async fn confirmation_job_creates_and_ships() {
        let h = Harness::new();
        FakeCourier::set(&h.courier.auto_assign, json!({"response": {"data": {"awb_code": "AWB900"}}}));
        let order = h.place_order(PaymentMethod::Cod).await;
        h.advance(&order, OrderStatus::Confirmed).await;

        let storefront = Arc::new(h.storefront);
        let mut executor = JobExecutor::new(storefront.jobs().clone());
        register_job_handlers(&mut executor, storefront.clone());
        assert_eq!(executor.run_ready().await, 1);

        let order = storefront.get_order(order.id_typed(), None).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Shipped);
        assert_eq!(order.shipment().tracking_number.as_deref(), Some("AWB900"));
    }

    #[tokio::test]
    async fn refund_job_retries_until_gateway_recovers() {
        let h = Harness::new();
        let order = h.place_order(PaymentMethod::Online).await;
        let intent = h.storefront.create_intent(order.id_typed(), None).await.unwrap();
        h.storefront
            .verify_payment(PaymentVerification {
                order_id: Some(order.id_typed()),
                gateway_order_id: intent.gateway_order_id.clone(),
                gateway_payment_id: "pay_9".into(),
                signature: signature(&intent.gateway_order_id, "pay_9"),
            })
            .await
            .unwrap();
        h.gateway.fail_refunds.store(true, Ordering::SeqCst);
        h.advance(&order, OrderStatus::Cancelled).await;
        let queued = h.storefront.jobs().claim_next().unwrap().unwrap();
        assert_eq!(queued.kind, JobKind::Refund);

        // Same job on a store with an immediate retry so the test needs no sleeps.
        let jobs = InMemoryJobStore::arc();
        jobs.enqueue(Job::refund(order.id_typed()).with_retry_policy(RetryPolicy::fixed(3, Duration::ZERO)))
            .unwrap();
        let gateway = h.gateway.clone();
        let storefront = Arc::new(h.storefront);
        let mut executor = JobExecutor::new(jobs.clone());
        register_job_handlers(&mut executor, storefront.clone());

        let first = executor.execute(jobs.claim_next().unwrap().unwrap()).await;
        assert!(matches!(first.status, JobStatus::Failed { .. }));
        let now = storefront.get_order(order.id_typed(), None).await.unwrap();
        assert_eq!(now.status(), OrderStatus::Cancelled);
        assert_eq!(now.payment_status(), PaymentStatus::Paid);

        gateway.fail_refunds.store(false, Ordering::SeqCst);
        assert_eq!(executor.run_ready().await, 1);
        let now = storefront.get_order(order.id_typed(), None).await.unwrap();
        assert_eq!(now.payment_status(), PaymentStatus::Refunded);
        assert_eq!(gateway.refund_count(), 1);
    }

    #[tokio::test]
    async fn refetch_job_fails_softly_while_awb_is_missing() {
        let h = Harness::new();
        let order = h.place_order(PaymentMethod::Cod).await;
        h.advance(&order, OrderStatus::Confirmed).await;
        h.storefront.jobs().claim_next().unwrap();
        h.storefront.create_shipment(order.id_typed(), None, Duration::ZERO).await.unwrap();

        let courier = h.courier.clone();
        let storefront = Arc::new(h.storefront);
        let jobs = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(jobs.clone());
        register_job_handlers(&mut executor, storefront.clone());

        jobs.enqueue(Job::refetch_shipment(order.id_typed()).with_retry_policy(RetryPolicy::fixed(2, Duration::ZERO)))
            .unwrap();
        let first = executor.execute(jobs.claim_next().unwrap().unwrap()).await;
        assert!(matches!(first.status, JobStatus::Failed { ref error, .. } if error == "tracking not yet assigned"));

        courier.know_order("9001", json!({"awb_code": "AWB901"}));
        assert_eq!(executor.run_ready().await, 1);
        let order = storefront.get_order(order.id_typed(), None).await.unwrap();
        assert_eq!(order.shipment().tracking_number.as_deref(), Some("AWB901"));
    }

    #[tokio::test]
    async fn shipping_a_missing_order_is_fatal() {
        let h = Harness::new();
        let storefront = Arc::new(h.storefront);
        let jobs = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(jobs.clone());
        register_job_handlers(&mut executor, storefront);

        jobs.enqueue(Job::create_shipment(storefront_sales::OrderId::generate(), None)).unwrap();
        executor.run_ready().await;
        let dead = jobs.list_dead_letters(10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].job.attempt, 1);
    }
}
