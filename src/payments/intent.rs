use crate::error::Error;
use async_trait::async_trait;
use nostr_types::MilliSatoshi;
use std::collections::HashMap;
use tokio::sync::broadcast;

/// What is being zapped
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PaymentTarget {
    /// A content item, paid to its author unless the intent splits it
    Event { id: String, author: String },

    /// A person directly
    User(String),
}

impl PaymentTarget {
    /// The key pending payments are filed under
    pub fn id(&self) -> &str {
        match self {
            PaymentTarget::Event { id, .. } => id,
            PaymentTarget::User(pubkey) => pubkey,
        }
    }

    /// Who gets paid when nobody says otherwise
    pub fn recipient(&self) -> &str {
        match self {
            PaymentTarget::Event { author, .. } => author,
            PaymentTarget::User(pubkey) => pubkey,
        }
    }
}

/// One recipient's share of a zap
#[derive(Debug, Clone)]
pub struct PaymentSplit {
    pub recipient: String,
    pub amount: MilliSatoshi,
}

/// Results reported per recipient when a payment finishes
pub type CompletionResults = HashMap<String, Result<(), String>>;

/// Things a payment intent announces while it is in flight
#[derive(Debug, Clone)]
pub enum PaymentNotification {
    /// An invoice was issued for one recipient
    Invoice { recipient: String, invoice: String },

    /// The payment is done, one way or another
    Complete(CompletionResults),
}

/// An outgoing zap as the wallet layer presents it.
///
/// Implementations must hand out receivers from `subscribe` that see every
/// notification sent after the call, so subscribing before `dispatch` misses nothing.
#[async_trait]
pub trait PaymentIntent: Send + Sync {
    fn target(&self) -> PaymentTarget;

    fn amount(&self) -> MilliSatoshi;

    fn comment(&self) -> Option<String> {
        None
    }

    /// How the amount is divided. Empty means a single recipient.
    fn splits(&self) -> Vec<PaymentSplit> {
        Vec::new()
    }

    fn subscribe(&self) -> broadcast::Receiver<PaymentNotification>;

    /// Start paying. Returning Ok only means the payment is under way; the
    /// outcome arrives as a [PaymentNotification::Complete].
    async fn dispatch(&self) -> Result<(), Error>;
}
