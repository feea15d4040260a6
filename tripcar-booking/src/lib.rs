pub mod availability;
pub mod pricing;
pub mod manager;
pub mod intent;
pub mod reconciler;
pub mod orchestrator;
pub mod queries;

pub use availability::AvailabilityChecker;
pub use manager::{ApprovalOutcome, BookingManager, NewBooking};
pub use intent::PaymentIntentIssuer;
pub use reconciler::{PaymentReconciler, ReconcileOutcome, Reconciliation};
pub use orchestrator::{ConfirmedPayment, PaymentOrchestrator, TestModeGateway};
pub use queries::BookingQueries;
