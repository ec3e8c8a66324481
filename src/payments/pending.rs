use super::intent::{PaymentIntent, PaymentTarget};
use nostr_types::{MilliSatoshi, Unixtime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where a tracked payment is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Waiting out the undo window, not yet sent
    Delayed,
    Pending,
    Confirmed,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Confirmed | PaymentStatus::Failed)
    }
}

/// One recipient's share of an in-flight zap
#[derive(Clone)]
pub struct PendingPayment {
    pub internal_id: String,

    /// Shared by every record created from the same intent
    pub batch: String,

    pub intent: Arc<dyn PaymentIntent>,
    pub target: PaymentTarget,
    pub recipient: String,
    pub amount: MilliSatoshi,
    pub invoice: Option<String>,
    pub status: PaymentStatus,
    pub created_at: Unixtime,
}

impl std::fmt::Debug for PendingPayment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingPayment")
            .field("internal_id", &self.internal_id)
            .field("batch", &self.batch)
            .field("target", &self.target)
            .field("recipient", &self.recipient)
            .field("amount", &self.amount.0)
            .field("invoice", &self.invoice)
            .field("status", &self.status)
            .finish()
    }
}

/// A random id for a tracked payment
pub fn new_internal_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

/// How an invoice was matched to a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceMatch {
    /// The record for that recipient
    Exact(String),

    /// No record for that recipient was waiting, so the first record still
    /// waiting got it. In a real multi-recipient zap this can pin the invoice on
    /// the wrong split.
    Fallback(String),
}

impl InvoiceMatch {
    pub fn internal_id(&self) -> &str {
        match self {
            InvoiceMatch::Exact(id) => id,
            InvoiceMatch::Fallback(id) => id,
        }
    }
}

/// Attach `invoice` to one of the `batch` records that has no invoice yet.
/// Returns None if every record in the batch already has one.
pub fn assign_invoice(
    records: &mut [PendingPayment],
    batch: &str,
    recipient: &str,
    invoice: &str,
) -> Option<InvoiceMatch> {
    let waiting = |p: &PendingPayment| p.batch == batch && p.invoice.is_none();

    if let Some(p) = records
        .iter_mut()
        .find(|p| waiting(p) && p.recipient == recipient)
    {
        p.invoice = Some(invoice.to_owned());
        return Some(InvoiceMatch::Exact(p.internal_id.clone()));
    }

    if let Some(p) = records.iter_mut().find(|p| waiting(p)) {
        p.invoice = Some(invoice.to_owned());
        return Some(InvoiceMatch::Fallback(p.internal_id.clone()));
    }

    None
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;
    use crate::payments::intent::PaymentNotification;
    use async_trait::async_trait;
    use tokio::sync::broadcast;

    struct Inert;

    #[async_trait]
    impl PaymentIntent for Inert {
        fn target(&self) -> PaymentTarget {
            PaymentTarget::User("bob".to_owned())
        }
        fn amount(&self) -> MilliSatoshi {
            MilliSatoshi(1000)
        }
        fn subscribe(&self) -> broadcast::Receiver<PaymentNotification> {
            broadcast::channel(1).1
        }
        async fn dispatch(&self) -> Result<(), Error> {
            Ok(())
        }
    }

    fn record(id: &str, batch: &str, recipient: &str) -> PendingPayment {
        PendingPayment {
            internal_id: id.to_owned(),
            batch: batch.to_owned(),
            intent: Arc::new(Inert),
            target: PaymentTarget::User("bob".to_owned()),
            recipient: recipient.to_owned(),
            amount: MilliSatoshi(1000),
            invoice: None,
            status: PaymentStatus::Pending,
            created_at: Unixtime(0),
        }
    }

    #[test]
    fn test_exact_match_preferred() {
        let mut records = vec![record("1", "b", "alice"), record("2", "b", "bob")];
        let m = assign_invoice(&mut records, "b", "bob", "lnbc-bob");
        assert_eq!(m, Some(InvoiceMatch::Exact("2".to_owned())));
        assert_eq!(records[1].invoice.as_deref(), Some("lnbc-bob"));
        assert!(records[0].invoice.is_none());
    }

    // Known approximation: an invoice for a recipient we have no record for lands
    // on the first record still waiting, whoever it belongs to.
    #[test]
    fn test_fallback_to_first_unmatched() {
        let mut records = vec![record("1", "b", "alice"), record("2", "b", "bob")];
        let m = assign_invoice(&mut records, "b", "carol", "lnbc-carol");
        assert_eq!(m, Some(InvoiceMatch::Fallback("1".to_owned())));
        assert_eq!(records[0].invoice.as_deref(), Some("lnbc-carol"));

        // alice's real invoice now has nowhere exact to go, so bob gets it
        let m = assign_invoice(&mut records, "b", "alice", "lnbc-alice");
        assert_eq!(m, Some(InvoiceMatch::Fallback("2".to_owned())));

        assert_eq!(assign_invoice(&mut records, "b", "bob", "lnbc-bob"), None);
    }

    #[test]
    fn test_other_batches_untouched() {
        let mut records = vec![record("1", "other", "bob"), record("2", "b", "alice")];
        let m = assign_invoice(&mut records, "b", "bob", "lnbc");
        assert_eq!(m.as_ref().map(|m| m.internal_id()), Some("2"));
        assert!(records[0].invoice.is_none());
    }

    #[test]
    fn test_internal_ids_unique() {
        let a = new_internal_id();
        let b = new_internal_id();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_terminal() {
        assert!(!PaymentStatus::Delayed.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Confirmed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
    }
}
