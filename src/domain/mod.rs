pub mod facilitator;
pub mod payment;
pub mod transaction;

pub use facilitator::{Facilitator, FacilitatorStatus, NetworkStats, NetworkStatus};
pub use payment::{NewPaymentRequest, PaymentMethod, PaymentOutcome, PaymentRequest, PaymentStatus};
pub use transaction::{TransactionPatch, TransactionRecord, TxKind, TxStatus};
