#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]

//! Engagement aggregation and pending zap tracking for nostr clients.
//!
//! [ReactionStore] folds a stream of events (which may repeat and may arrive in any
//! order) into per-item statistics. [PaymentStore] follows zaps from the moment the
//! user asks for them until the wallet reports back.

pub mod error;
pub mod event;
pub mod metrics;
pub mod payments;
pub mod reactions;
pub mod settings;
pub mod status;
pub mod tags;

pub use error::{Error, ErrorKind};
pub use event::{Event, Tag};
pub use metrics::{CountingMetrics, Metrics, NoMetrics};
pub use payments::{
    PaymentIntent, PaymentNotification, PaymentStatus, PaymentStore, PaymentTarget,
    PendingPayment,
};
pub use reactions::{CurrentUser, ReactionStats, ReactionStore};
pub use settings::{ReactionCounting, Settings};
pub use status::{Notifier, RecentFailures};
pub use tags::{RootResolver, TagRootResolver};
