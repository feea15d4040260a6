use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use tripcar_booking::{
    AvailabilityChecker, BookingManager, BookingQueries, NewBooking, PaymentIntentIssuer, PaymentOrchestrator,
    PaymentReconciler, ReconcileOutcome, TestModeGateway,
};
use tripcar_core::identity::Contact;
use tripcar_core::payment::{
    ConfirmRequest, GatewayConfirmation, PaymentEvent, PaymentEventKind, PaymentGateway, PaymentIntent,
};
use tripcar_core::repository::{AnomalyRepository, BookingRepository};
use tripcar_core::{Booking, BookingStatus, CoreError, CoreResult, PaymentStatus, Vehicle, VehicleStatus};
use tripcar_shared::{DomainEvent, Masked};
use tripcar_store::{EventPublisher, MemoryDedupStore, MemoryStore};

const OWNER: &str = "owner-1";
const RENTER: &str = "renter-1";
const RATE: i64 = 50_000;

struct Harness {
    store: Arc<MemoryStore>,
    publisher: Arc<EventPublisher>,
    vehicle: Vehicle,
    manager: BookingManager,
    issuer: PaymentIntentIssuer,
    reconciler: Arc<PaymentReconciler>,
    queries: BookingQueries,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(EventPublisher::new(64));
        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            owner_id: OWNER.to_string(),
            model: "Ioniq 5".to_string(),
            plate_number: "34나5678".to_string(),
            daily_rate: RATE,
            status: VehicleStatus::Listable,
            available_from: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            available_until: Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).unwrap(),
            airport_location: "Jeju International Airport".to_string(),
        };
        store.add_vehicle(vehicle.clone()).unwrap();
        store
            .add_contact(RENTER, Contact { name: "Kim Renter".to_string(), phone: Some(Masked("010-1111-2222".to_string())) })
            .unwrap();
        store
            .add_contact(OWNER, Contact { name: "Lee Owner".to_string(), phone: None })
            .unwrap();

        let manager = BookingManager::new(store.clone(), store.clone(), publisher.clone());
        let issuer = PaymentIntentIssuer::new(store.clone(), store.clone(), "https://tripcar.test/");
        let reconciler = Arc::new(PaymentReconciler::new(
            store.clone(),
            store.clone(),
            Arc::new(MemoryDedupStore::new()),
            publisher.clone(),
            Duration::from_secs(3600),
        ));
        let queries = BookingQueries::new(store.clone(), store.clone(), store.clone());

        Self { store, publisher, vehicle, manager, issuer, reconciler, queries }
    }

    fn orchestrator(&self, gateway: Arc<dyn PaymentGateway>) -> PaymentOrchestrator {
        PaymentOrchestrator::new(gateway, self.reconciler.clone(), self.store.clone())
    }

    async fn request(&self, renter: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> CoreResult<Booking> {
        self.manager
            .create(NewBooking {
                vehicle_id: self.vehicle.id,
                renter_id: renter.to_string(),
                start,
                end,
                pickup_location: Some("Terminal 1".to_string()),
                return_location: None,
            })
            .await
    }

    async fn approved_with_intent(&self) -> (Booking, PaymentIntent) {
        let booking = self.request(RENTER, day(1), day(3)).await.unwrap();
        self.manager.approve(booking.id, OWNER).await.unwrap();
        let intent = self.issuer.issue_intent(booking.id, RENTER).await.unwrap();
        (booking, intent)
    }

    async fn booking(&self, id: Uuid) -> Booking {
        self.store.get_booking(id).await.unwrap().unwrap()
    }
}

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, d, 10, 0, 0).unwrap()
}

fn webhook(order_ref: &str, kind: PaymentEventKind, amount: Option<i64>, occurred_at: DateTime<Utc>) -> PaymentEvent {
    PaymentEvent {
        order_ref: order_ref.to_string(),
        transaction_key: "tx_abc".to_string(),
        kind,
        amount,
        occurred_at,
        approved_at: None,
    }
}

struct DecliningGateway;

#[async_trait]
impl PaymentGateway for DecliningGateway {
    async fn confirm(&self, _request: &ConfirmRequest) -> CoreResult<GatewayConfirmation> {
        Err(CoreError::PaymentDeclined("REJECT_CARD_COMPANY: declined".to_string()))
    }
}

// ---- Availability ----

#[tokio::test]
async fn test_availability_rejects_empty_and_inverted_ranges() {
    let h = Harness::new();
    let checker = AvailabilityChecker::new(h.store.clone());

    assert!(matches!(
        checker.is_available(h.vehicle.id, day(3), day(3), None).await,
        Err(CoreError::InvalidRange(_))
    ));
    assert!(matches!(
        checker.is_available(h.vehicle.id, day(5), day(2), None).await,
        Err(CoreError::InvalidRange(_))
    ));
}

#[tokio::test]
async fn test_only_approved_bookings_block_availability() {
    let h = Harness::new();
    let checker = AvailabilityChecker::new(h.store.clone());
    let pending = h.request("renter-a", day(1), day(5)).await.unwrap();
    let rejected = h.request("renter-b", day(6), day(9)).await.unwrap();
    h.manager.reject(rejected.id, OWNER).await.unwrap();

    assert!(checker.is_available(h.vehicle.id, day(2), day(4), None).await.unwrap());
    assert!(checker.is_available(h.vehicle.id, day(7), day(8), None).await.unwrap());

    h.manager.approve(pending.id, OWNER).await.unwrap();
    assert!(!checker.is_available(h.vehicle.id, day(2), day(4), None).await.unwrap());
}

#[tokio::test]
async fn test_availability_excludes_own_booking_and_allows_touching_ranges() {
    let h = Harness::new();
    let checker = AvailabilityChecker::new(h.store.clone());
    let booking = h.request(RENTER, day(3), day(5)).await.unwrap();
    h.manager.approve(booking.id, OWNER).await.unwrap();

    assert!(!checker.is_available(h.vehicle.id, day(3), day(5), None).await.unwrap());
    assert!(checker.is_available(h.vehicle.id, day(3), day(5), Some(booking.id)).await.unwrap());
    assert!(!checker.is_available(h.vehicle.id, day(3), day(5), Some(Uuid::new_v4())).await.unwrap());

    assert!(checker.is_available(h.vehicle.id, day(1), day(3), None).await.unwrap());
    assert!(checker.is_available(h.vehicle.id, day(5), day(7), None).await.unwrap());
}

// ---- Lifecycle ----

#[tokio::test]
async fn test_price_is_days_times_rate() {
    let h = Harness::new();
    let two_days = h.request(RENTER, day(1), day(3)).await.unwrap();
    assert_eq!(two_days.total_price, 100_000);
    assert_eq!(two_days.status, BookingStatus::Pending);
    assert_eq!(two_days.payment_status, PaymentStatus::Unpaid);

    let three_hours = h
        .request(RENTER, day(10), Utc.with_ymd_and_hms(2025, 6, 10, 13, 0, 0).unwrap())
        .await
        .unwrap();
    assert_eq!(three_hours.total_price, 50_000);
}

#[tokio::test]
async fn test_create_validation() {
    let h = Harness::new();

    assert!(matches!(h.request(RENTER, day(3), day(3)).await, Err(CoreError::InvalidRange(_))));
    let outside = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
    assert!(matches!(h.request(RENTER, day(3), outside).await, Err(CoreError::InvalidRange(_))));

    let missing = h
        .manager
        .create(NewBooking {
            vehicle_id: Uuid::new_v4(),
            renter_id: RENTER.to_string(),
            start: day(1),
            end: day(2),
            pickup_location: None,
            return_location: None,
        })
        .await;
    assert!(matches!(missing, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_self_booking_is_forbidden_and_stores_nothing() {
    let h = Harness::new();
    assert!(matches!(h.request(OWNER, day(1), day(3)).await, Err(CoreError::Forbidden(_))));
    assert_eq!(h.store.booking_count().unwrap(), 0);
}

#[tokio::test]
async fn test_unlistable_vehicle_rejects_requests() {
    let h = Harness::new();
    let mut parked = h.vehicle.clone();
    parked.status = VehicleStatus::Unavailable;
    h.store.add_vehicle(parked).unwrap();

    assert!(matches!(h.request(RENTER, day(1), day(3)).await, Err(CoreError::InvalidState(_))));
}

#[tokio::test]
async fn test_create_over_approved_range_conflicts() {
    let h = Harness::new();
    let a = h.request(RENTER, day(1), day(5)).await.unwrap();
    h.manager.approve(a.id, OWNER).await.unwrap();

    assert!(matches!(h.request("renter-2", day(4), day(6)).await, Err(CoreError::Conflict(_))));
    // Touching ranges do not overlap.
    assert!(h.request("renter-2", day(5), day(6)).await.is_ok());
}

#[tokio::test]
async fn test_approval_cascades_to_overlapping_pending_only() {
    let h = Harness::new();
    let a = h.request("renter-a", day(1), day(5)).await.unwrap();
    let b = h.request("renter-b", day(3), day(7)).await.unwrap();
    let c = h.request("renter-c", day(10), day(12)).await.unwrap();
    let mut events = h.publisher.subscribe();

    let outcome = h.manager.approve(a.id, OWNER).await.unwrap();

    assert_eq!(outcome.booking.status, BookingStatus::Approved);
    assert_eq!(outcome.auto_rejected, vec![b.id]);
    assert!(outcome.warnings.is_empty());
    assert_eq!(h.booking(b.id).await.status, BookingStatus::Rejected);
    assert_eq!(h.booking(c.id).await.status, BookingStatus::Pending);

    let first = events.recv().await.unwrap();
    let second = events.recv().await.unwrap();
    assert!(matches!(first, DomainEvent::BookingStatusChanged(ref e) if e.booking_id == a.id && e.to == "approved"));
    assert!(matches!(second, DomainEvent::BookingStatusChanged(ref e) if e.booking_id == b.id && e.actor_id.is_none()));
}

#[tokio::test]
async fn test_failed_cascade_keeps_approval_and_sweep_repairs_it() {
    let h = Harness::new();
    let a = h.request("renter-a", day(1), day(5)).await.unwrap();
    let b = h.request("renter-b", day(3), day(7)).await.unwrap();

    h.store.set_cascade_failure(true).unwrap();
    let outcome = h.manager.approve(a.id, OWNER).await.unwrap();
    assert_eq!(outcome.booking.status, BookingStatus::Approved);
    assert!(outcome.auto_rejected.is_empty());
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(h.booking(b.id).await.status, BookingStatus::Pending);

    h.store.set_cascade_failure(false).unwrap();
    assert_eq!(h.manager.sweep_competing_pending().await.unwrap(), 1);
    assert_eq!(h.booking(b.id).await.status, BookingStatus::Rejected);
    assert_eq!(h.manager.sweep_competing_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_overlapping_approvals_admit_one() {
    let h = Harness::new();
    let a = h.request("renter-a", day(1), day(5)).await.unwrap();
    let b = h.request("renter-b", day(3), day(7)).await.unwrap();

    let (ra, rb) = tokio::join!(h.manager.approve(a.id, OWNER), h.manager.approve(b.id, OWNER));
    assert_eq!([ra.is_ok(), rb.is_ok()].iter().filter(|ok| **ok).count(), 1);

    let approved = h
        .store
        .list_overlapping(h.vehicle.id, &a.range(), BookingStatus::Approved)
        .await
        .unwrap();
    assert_eq!(approved.len(), 1);
}

#[tokio::test]
async fn test_concurrent_creates_both_stay_pending() {
    let h = Harness::new();
    let (a, b) = tokio::join!(
        h.request("renter-a", day(1), day(5)),
        h.request("renter-b", day(2), day(6))
    );
    assert_eq!(a.unwrap().status, BookingStatus::Pending);
    assert_eq!(b.unwrap().status, BookingStatus::Pending);
    assert_eq!(h.store.booking_count().unwrap(), 2);
}

#[tokio::test]
async fn test_transitions_are_strict_and_authorized() {
    let h = Harness::new();
    let a = h.request(RENTER, day(1), day(3)).await.unwrap();

    assert!(matches!(h.manager.approve(a.id, "someone-else").await, Err(CoreError::Forbidden(_))));
    assert!(matches!(h.manager.approve(Uuid::new_v4(), OWNER).await, Err(CoreError::NotFound(_))));

    h.manager.approve(a.id, OWNER).await.unwrap();
    assert!(matches!(h.manager.approve(a.id, OWNER).await, Err(CoreError::InvalidState(_))));
    assert!(matches!(h.manager.reject(a.id, OWNER).await, Err(CoreError::InvalidState(_))));
    assert!(matches!(h.manager.cancel(a.id, OWNER).await, Err(CoreError::Forbidden(_))));

    let cancelled = h.manager.cancel(a.id, RENTER).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert!(matches!(h.manager.cancel(a.id, RENTER).await, Err(CoreError::InvalidState(_))));
}

#[tokio::test]
async fn test_reject_pending_request() {
    let h = Harness::new();
    let a = h.request(RENTER, day(1), day(3)).await.unwrap();
    let rejected = h.manager.reject(a.id, OWNER).await.unwrap();
    assert_eq!(rejected.status, BookingStatus::Rejected);
    assert!(matches!(h.manager.reject(a.id, OWNER).await, Err(CoreError::InvalidState(_))));
}

#[tokio::test]
async fn test_paid_booking_cannot_be_cancelled_but_can_be_completed() {
    let h = Harness::new();
    let (booking, intent) = h.approved_with_intent().await;
    assert!(matches!(h.manager.complete(booking.id, OWNER).await, Err(CoreError::InvalidState(_))));

    h.orchestrator(Arc::new(TestModeGateway))
        .confirm_payment("pay_1", &intent.order_ref, intent.amount)
        .await
        .unwrap();

    assert!(matches!(h.manager.cancel(booking.id, RENTER).await, Err(CoreError::InvalidState(_))));
    let completed = h.manager.complete(booking.id, OWNER).await.unwrap();
    assert_eq!(completed.status, BookingStatus::Completed);
    assert_eq!(completed.payment_status, PaymentStatus::Paid);
}

// ---- Payment intents ----

#[tokio::test]
async fn test_intent_binds_order_ref_and_redirects() {
    let h = Harness::new();
    let (booking, intent) = h.approved_with_intent().await;

    assert_eq!(intent.booking_id, booking.id);
    assert_eq!(intent.amount, 100_000);
    assert_eq!(intent.order_name, "Ioniq 5 rental");
    assert_eq!(
        intent.success_url,
        format!("https://tripcar.test/payments/success?orderId={}&bookingId={}", intent.order_ref, booking.id)
    );
    assert!(intent.fail_url.starts_with("https://tripcar.test/payments/fail?"));
    assert_eq!(h.booking(booking.id).await.order_ref.as_deref(), Some(intent.order_ref.as_str()));
}

#[tokio::test]
async fn test_intent_preconditions() {
    let h = Harness::new();
    let pending = h.request(RENTER, day(1), day(3)).await.unwrap();
    assert!(matches!(h.issuer.issue_intent(pending.id, RENTER).await, Err(CoreError::InvalidState(_))));

    h.manager.approve(pending.id, OWNER).await.unwrap();
    assert!(matches!(h.issuer.issue_intent(pending.id, "renter-2").await, Err(CoreError::Forbidden(_))));

    let intent = h.issuer.issue_intent(pending.id, RENTER).await.unwrap();
    h.orchestrator(Arc::new(TestModeGateway))
        .confirm_payment("pay_1", &intent.order_ref, intent.amount)
        .await
        .unwrap();
    assert!(matches!(h.issuer.issue_intent(pending.id, RENTER).await, Err(CoreError::AlreadyPaid)));
}

#[tokio::test]
async fn test_reissued_intent_makes_previous_ref_stale() {
    let h = Harness::new();
    let (booking, first) = h.approved_with_intent().await;
    let second = h.issuer.issue_intent(booking.id, RENTER).await.unwrap();
    assert_ne!(first.order_ref, second.order_ref);

    let stale = h
        .reconciler
        .reconcile(&webhook(&first.order_ref, PaymentEventKind::Completed, Some(100_000), day(1)))
        .await;
    assert!(matches!(stale, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_new_attempt_after_failed_payment() {
    let h = Harness::new();
    let (booking, first) = h.approved_with_intent().await;
    let orchestrator = h.orchestrator(Arc::new(TestModeGateway));

    let failed = orchestrator.report_failure(&first.order_ref, RENTER, "PAY_PROCESS_CANCELED", "user closed").await.unwrap();
    assert_eq!(failed.payment_status, PaymentStatus::Failed);

    let retry = h.issuer.issue_intent(booking.id, RENTER).await.unwrap();
    assert_eq!(h.booking(booking.id).await.payment_status, PaymentStatus::Unpaid);

    orchestrator.confirm_payment("pay_2", &retry.order_ref, retry.amount).await.unwrap();
    assert_eq!(h.booking(booking.id).await.payment_status, PaymentStatus::Paid);
}

// ---- Confirm ----

#[tokio::test]
async fn test_test_mode_confirm_marks_paid_with_tagged_key() {
    let h = Harness::new();
    let (booking, intent) = h.approved_with_intent().await;

    let confirmed = h
        .orchestrator(Arc::new(TestModeGateway))
        .confirm_payment("pay_1", &intent.order_ref, intent.amount)
        .await
        .unwrap();
    assert_eq!(confirmed.booking_id, booking.id);

    let stored = h.booking(booking.id).await;
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(stored.payment_key.as_deref(), Some("TEST_pay_1"));
    assert!(stored.approved_at.is_some());
}

#[tokio::test]
async fn test_confirm_with_wrong_amount_leaves_unpaid() {
    let h = Harness::new();
    let (booking, intent) = h.approved_with_intent().await;

    let result = h
        .orchestrator(Arc::new(TestModeGateway))
        .confirm_payment("pay_1", &intent.order_ref, intent.amount - 1)
        .await;
    assert_eq!(result, Err(CoreError::AmountMismatch { expected: 100_000, actual: 99_999 }));
    assert_eq!(h.booking(booking.id).await.payment_status, PaymentStatus::Unpaid);
}

#[tokio::test]
async fn test_declined_confirm_leaves_unpaid() {
    let h = Harness::new();
    let (booking, intent) = h.approved_with_intent().await;

    let result = h
        .orchestrator(Arc::new(DecliningGateway))
        .confirm_payment("pay_1", &intent.order_ref, intent.amount)
        .await;
    assert!(matches!(result, Err(CoreError::PaymentDeclined(_))));
    assert_eq!(h.booking(booking.id).await.payment_status, PaymentStatus::Unpaid);
}

#[tokio::test]
async fn test_repeated_confirm_is_success() {
    let h = Harness::new();
    let (booking, intent) = h.approved_with_intent().await;
    let orchestrator = h.orchestrator(Arc::new(TestModeGateway));

    orchestrator.confirm_payment("pay_1", &intent.order_ref, intent.amount).await.unwrap();
    let again = orchestrator.confirm_payment("pay_1", &intent.order_ref, intent.amount).await.unwrap();
    assert_eq!(again.booking_id, booking.id);
}

// ---- Reconciliation ----

#[tokio::test]
async fn test_duplicate_webhook_applies_once() {
    let h = Harness::new();
    let (booking, intent) = h.approved_with_intent().await;
    let event = webhook(&intent.order_ref, PaymentEventKind::Completed, Some(100_000), day(1));
    let mut events = h.publisher.subscribe();

    let first = h.reconciler.reconcile(&event).await.unwrap();
    let second = h.reconciler.reconcile(&event).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.outcome, ReconcileOutcome::Applied);
    assert_eq!(first.payment_status, PaymentStatus::Paid);
    assert_eq!(h.booking(booking.id).await.payment_key.as_deref(), Some("tx_abc"));

    assert!(matches!(events.recv().await.unwrap(), DomainEvent::PaymentReconciled(_)));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_concurrent_duplicate_webhooks_agree() {
    let h = Harness::new();
    let (_, intent) = h.approved_with_intent().await;
    let event = webhook(&intent.order_ref, PaymentEventKind::Completed, None, day(1));

    let (a, b) = tokio::join!(h.reconciler.reconcile(&event), h.reconciler.reconcile(&event));
    assert_eq!(a.unwrap(), b.unwrap());
}

#[tokio::test]
async fn test_redelivery_with_new_timestamp_converges() {
    let h = Harness::new();
    let (_, intent) = h.approved_with_intent().await;

    h.reconciler
        .reconcile(&webhook(&intent.order_ref, PaymentEventKind::Completed, Some(100_000), day(1)))
        .await
        .unwrap();
    let later = h
        .reconciler
        .reconcile(&webhook(&intent.order_ref, PaymentEventKind::Completed, Some(100_000), day(2)))
        .await
        .unwrap();
    assert_eq!(later.outcome, ReconcileOutcome::AlreadyConverged);
}

#[tokio::test]
async fn test_paid_is_never_downgraded() {
    let h = Harness::new();
    let (booking, intent) = h.approved_with_intent().await;

    h.reconciler
        .reconcile(&webhook(&intent.order_ref, PaymentEventKind::Completed, Some(100_000), day(1)))
        .await
        .unwrap();

    for (kind, at) in [(PaymentEventKind::Canceled, day(2)), (PaymentEventKind::Expired, day(3))] {
        let late = h.reconciler.reconcile(&webhook(&intent.order_ref, kind, Some(100_000), at)).await.unwrap();
        assert_eq!(late.outcome, ReconcileOutcome::ConflictRecorded);
        assert_eq!(late.payment_status, PaymentStatus::Paid);
    }
    let reported = h
        .orchestrator(Arc::new(TestModeGateway))
        .report_failure(&intent.order_ref, RENTER, "USER_CANCEL", "closed the window")
        .await
        .unwrap();
    assert_eq!(reported.outcome, ReconcileOutcome::ConflictRecorded);

    assert_eq!(h.booking(booking.id).await.payment_status, PaymentStatus::Paid);
    let anomalies = h.store.list_anomalies(10).await.unwrap();
    assert_eq!(anomalies.len(), 3);
    assert!(anomalies.iter().all(|a| a.booking_id == booking.id && a.current_status == PaymentStatus::Paid));
}

#[tokio::test]
async fn test_only_renter_can_report_checkout_failure() {
    let h = Harness::new();
    let (booking, intent) = h.approved_with_intent().await;
    let orchestrator = h.orchestrator(Arc::new(TestModeGateway));

    for actor in ["someone-else", OWNER] {
        let result = orchestrator.report_failure(&intent.order_ref, actor, "USER_CANCEL", "").await;
        assert!(matches!(result, Err(CoreError::Forbidden(_))));
    }
    assert_eq!(h.booking(booking.id).await.payment_status, PaymentStatus::Unpaid);
    assert!(h.store.list_anomalies(10).await.unwrap().is_empty());

    let missing = orchestrator.report_failure("ORDER_missing", RENTER, "USER_CANCEL", "").await;
    assert!(matches!(missing, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_failed_is_never_upgraded() {
    let h = Harness::new();
    let (booking, intent) = h.approved_with_intent().await;

    h.reconciler
        .reconcile(&webhook(&intent.order_ref, PaymentEventKind::Aborted, None, day(1)))
        .await
        .unwrap();
    let late = h
        .reconciler
        .reconcile(&webhook(&intent.order_ref, PaymentEventKind::Completed, Some(100_000), day(2)))
        .await
        .unwrap();

    assert_eq!(late.outcome, ReconcileOutcome::ConflictRecorded);
    assert_eq!(h.booking(booking.id).await.payment_status, PaymentStatus::Failed);
}

#[tokio::test]
async fn test_webhook_amount_mismatch_is_not_remembered() {
    let h = Harness::new();
    let (booking, intent) = h.approved_with_intent().await;
    let mut event = webhook(&intent.order_ref, PaymentEventKind::Completed, Some(1), day(1));

    assert!(matches!(h.reconciler.reconcile(&event).await, Err(CoreError::AmountMismatch { .. })));
    assert_eq!(h.booking(booking.id).await.payment_status, PaymentStatus::Unpaid);

    event.amount = Some(100_000);
    let applied = h.reconciler.reconcile(&event).await.unwrap();
    assert_eq!(applied.outcome, ReconcileOutcome::Applied);
}

#[tokio::test]
async fn test_awaiting_deposit_changes_nothing() {
    let h = Harness::new();
    let (booking, intent) = h.approved_with_intent().await;

    let info = h
        .reconciler
        .reconcile(&webhook(&intent.order_ref, PaymentEventKind::AwaitingDeposit, None, day(1)))
        .await
        .unwrap();
    assert_eq!(info.outcome, ReconcileOutcome::Informational);
    assert_eq!(h.booking(booking.id).await.payment_status, PaymentStatus::Unpaid);
}

#[tokio::test]
async fn test_deposit_notice_with_wrong_amount_is_a_mismatch() {
    let h = Harness::new();
    let (booking, intent) = h.approved_with_intent().await;

    let result = h
        .reconciler
        .reconcile(&webhook(&intent.order_ref, PaymentEventKind::AwaitingDeposit, Some(1), day(1)))
        .await;
    assert!(matches!(result, Err(CoreError::AmountMismatch { expected: 100_000, actual: 1 })));
    assert_eq!(h.booking(booking.id).await.payment_status, PaymentStatus::Unpaid);
}

#[tokio::test]
async fn test_gateway_approval_time_wins_over_occurrence() {
    let h = Harness::new();
    let (booking, intent) = h.approved_with_intent().await;
    let approved_at = Utc.with_ymd_and_hms(2025, 5, 20, 9, 30, 0).unwrap();
    let mut event = webhook(&intent.order_ref, PaymentEventKind::Completed, None, day(1));
    event.approved_at = Some(approved_at);

    h.reconciler.reconcile(&event).await.unwrap();
    assert_eq!(h.booking(booking.id).await.approved_at, Some(approved_at));
}

#[tokio::test]
async fn test_completion_for_cancelled_booking_is_an_anomaly() {
    let h = Harness::new();
    let (booking, intent) = h.approved_with_intent().await;
    h.manager.cancel(booking.id, RENTER).await.unwrap();

    let late = h
        .reconciler
        .reconcile(&webhook(&intent.order_ref, PaymentEventKind::Completed, Some(100_000), day(1)))
        .await
        .unwrap();
    assert_eq!(late.outcome, ReconcileOutcome::ConflictRecorded);
    assert_eq!(h.booking(booking.id).await.payment_status, PaymentStatus::Unpaid);
}

// ---- Queries ----

#[tokio::test]
async fn test_detail_shows_counterpart_to_each_party() {
    let h = Harness::new();
    let booking = h.request(RENTER, day(1), day(3)).await.unwrap();

    let as_owner = h.queries.booking_detail(booking.id, OWNER).await.unwrap();
    assert_eq!(as_owner.counterpart.name, "Kim Renter");
    assert_eq!(as_owner.rental_days, 2);

    let as_renter = h.queries.booking_detail(booking.id, RENTER).await.unwrap();
    assert_eq!(as_renter.counterpart.name, "Lee Owner");

    assert!(matches!(h.queries.booking_detail(booking.id, "stranger").await, Err(CoreError::Forbidden(_))));
    assert!(matches!(h.queries.payment_info(booking.id, "stranger").await, Err(CoreError::Forbidden(_))));
}

#[tokio::test]
async fn test_lists_and_profile_stats() {
    let h = Harness::new();
    let (booking, intent) = h.approved_with_intent().await;
    h.request(RENTER, day(10), day(11)).await.unwrap();
    h.orchestrator(Arc::new(TestModeGateway))
        .confirm_payment("pay_1", &intent.order_ref, intent.amount)
        .await
        .unwrap();

    assert_eq!(h.queries.my_bookings(RENTER).await.unwrap().len(), 2);
    let orders = h.queries.my_orders(RENTER).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].booking.id, booking.id);

    let received = h.queries.received_bookings(OWNER).await.unwrap();
    assert_eq!(received.len(), 2);
    assert!(received.iter().all(|r| r.renter.name == "Kim Renter"));

    let info = h.queries.payment_info(booking.id, RENTER).await.unwrap();
    assert_eq!(info.payment_status, PaymentStatus::Paid);
    assert_eq!(info.order_ref.as_deref(), Some(intent.order_ref.as_str()));

    let stats = h.queries.profile_stats(RENTER).await.unwrap();
    assert_eq!(stats.paid_orders, 1);
    assert_eq!(stats.paid_total, 100_000);
    assert_eq!(stats.active_bookings, 2);
    assert_eq!(stats.registered_vehicles, 0);
    assert_eq!(h.queries.profile_stats(OWNER).await.unwrap().registered_vehicles, 1);
}
