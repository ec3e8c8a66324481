mod intent;
pub use intent::{
    CompletionResults, PaymentIntent, PaymentNotification, PaymentSplit, PaymentTarget,
};

mod pending;
pub use pending::{assign_invoice, new_internal_id, InvoiceMatch, PaymentStatus, PendingPayment};

use crate::error::{Error, ErrorKind};
use crate::metrics::Metrics;
use crate::settings::Settings;
use crate::status::Notifier;
use nostr_types::Unixtime;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot};

/// Pending payments keyed by target id
pub type PaymentMap = HashMap<String, Vec<PendingPayment>>;

/// What [PaymentStore::add_pending_payment] created
pub struct PendingRegistration {
    pub payments: Vec<PendingPayment>,

    /// Present when the payment was delayed
    pub cancel: Option<CancelHandle>,
}

/// Cancels a delayed payment before it is sent
pub struct CancelHandle {
    batch: String,
    store: PaymentStore,
}

impl CancelHandle {
    /// Returns false if the payment was already sent (or already cancelled)
    pub fn cancel(&self) -> bool {
        self.store.cancel_batch(&self.batch)
    }
}

/// Control state for the records made from one intent. Lives as long as the
/// task that sends the intent.
#[derive(Default)]
struct Batch {
    // Taken by whoever gets there first: cancel, or the delay running out
    cancel: Option<oneshot::Sender<()>>,

    // Tells the sending task nobody is waiting on it anymore
    stop: Option<oneshot::Sender<()>>,

    failure_notified: bool,
}

struct Inner {
    payments: RwLock<Arc<PaymentMap>>,
    batches: Mutex<HashMap<String, Batch>>,
    delay: Duration,
    grace: Duration,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<dyn Metrics>,
}

/// Tracks zaps from the moment the user asks for them until they resolve.
///
/// Cheap to clone; clones share the same payments.
#[derive(Clone)]
pub struct PaymentStore {
    inner: Arc<Inner>,
}

impl PaymentStore {
    pub fn new(
        settings: &Settings,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<dyn Metrics>,
    ) -> PaymentStore {
        PaymentStore {
            inner: Arc::new(Inner {
                payments: RwLock::new(Arc::new(HashMap::new())),
                batches: Mutex::new(HashMap::new()),
                delay: settings.payment_delay(),
                grace: settings.payment_grace(),
                notifier,
                metrics,
            }),
        }
    }

    /// Start tracking a zap. `initial_status` is [PaymentStatus::Delayed] to hold the
    /// zap back for the undo window, or [PaymentStatus::Pending] to send it now.
    ///
    /// One record is made per split. An intent without splits gets one record, paid
    /// to `recipient` or else the target's own recipient.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add_pending_payment(
        &self,
        intent: Arc<dyn PaymentIntent>,
        recipient: Option<String>,
        initial_status: PaymentStatus,
    ) -> Result<PendingRegistration, Error> {
        let delayed = match initial_status {
            PaymentStatus::Delayed => true,
            PaymentStatus::Pending => false,
            other => return Err(ErrorKind::InvalidInitialStatus(format!("{:?}", other)).into()),
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => return Err(ErrorKind::NoRuntime.into()),
        };

        let target = intent.target();
        let shares: Vec<(String, nostr_types::MilliSatoshi)> = {
            let splits = intent.splits();
            if splits.is_empty() {
                let recipient = recipient.unwrap_or_else(|| target.recipient().to_owned());
                vec![(recipient, intent.amount())]
            } else {
                splits.into_iter().map(|s| (s.recipient, s.amount)).collect()
            }
        };

        let batch = new_internal_id();
        let now = Unixtime::now();
        let payments: Vec<PendingPayment> = shares
            .into_iter()
            .map(|(recipient, amount)| PendingPayment {
                internal_id: new_internal_id(),
                batch: batch.clone(),
                intent: intent.clone(),
                target: target.clone(),
                recipient,
                amount,
                invoice: None,
                status: initial_status,
                created_at: now,
            })
            .collect();

        self.inner.update(|map| {
            map.entry(target.id().to_owned())
                .or_default()
                .extend(payments.iter().cloned())
        });
        self.inner
            .metrics
            .incr("payments.registered", payments.len() as u64);
        tracing::debug!(
            "Tracking zap {} to {} ({} record(s), {:?})",
            batch,
            target.id(),
            payments.len(),
            initial_status
        );

        // Subscribe before anything can be dispatched so no notification is missed
        let notifications = intent.subscribe();

        let (stop_tx, stop_rx) = oneshot::channel();
        let mut control = Batch {
            stop: Some(stop_tx),
            ..Default::default()
        };

        let cancel = if delayed {
            let (cancel_tx, cancel_rx) = oneshot::channel();
            control.cancel = Some(cancel_tx);
            self.inner.batches.lock().insert(batch.clone(), control);
            let inner = self.inner.clone();
            let task_batch = batch.clone();
            runtime.spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(inner.delay) => {},
                    _ = cancel_rx => {
                        inner.batches.lock().remove(&task_batch);
                        return;
                    }
                }
                if inner.take_cancel(&task_batch).is_none() {
                    inner.batches.lock().remove(&task_batch);
                    return;
                }
                inner.set_batch_status(&task_batch, PaymentStatus::Pending);
                inner.drive(intent, notifications, stop_rx, task_batch).await;
            });
            Some(CancelHandle {
                batch,
                store: self.clone(),
            })
        } else {
            self.inner.batches.lock().insert(batch.clone(), control);
            let inner = self.inner.clone();
            runtime.spawn(async move {
                inner.drive(intent, notifications, stop_rx, batch).await;
            });
            None
        };

        Ok(PendingRegistration { payments, cancel })
    }

    /// Cancel the delayed payment that `internal_id` belongs to. Returns false if
    /// there is no such payment or it was already sent.
    pub fn cancel(&self, internal_id: &str) -> bool {
        match self.inner.find(internal_id) {
            Some(p) => self.cancel_batch(&p.batch),
            None => false,
        }
    }

    fn cancel_batch(&self, batch: &str) -> bool {
        match self.inner.take_cancel(batch) {
            Some(sender) => {
                let _ = sender.send(());
                let removed = self.inner.update(|map| remove_where(map, |p| p.batch == batch));
                self.inner.metrics.incr("payments.cancelled", removed as u64);
                tracing::debug!("Cancelled zap {} before sending", batch);
                true
            }
            None => false,
        }
    }

    /// Resolve one record directly, for wallets that report by callback rather
    /// than through notifications. Unknown or already resolved ids are ignored.
    pub fn complete_payment(&self, internal_id: &str, result: Result<(), String>) -> bool {
        let status = match result {
            Ok(()) => PaymentStatus::Confirmed,
            Err(_) => PaymentStatus::Failed,
        };
        let resolved = self.inner.update(|map| {
            let mut batch = None;
            for p in map.values_mut().flat_map(|v| v.iter_mut()) {
                if p.internal_id == internal_id && !p.status.is_terminal() {
                    p.status = status;
                    batch = Some(p.batch.clone());
                    break;
                }
            }
            let batch = batch?;
            let live = map
                .values()
                .flat_map(|v| v.iter())
                .any(|p| p.batch == batch && !p.status.is_terminal());
            Some((batch, live))
        });
        let (batch, live) = match resolved {
            Some(r) => r,
            None => {
                tracing::debug!("Completion for unknown payment {}", internal_id);
                return false;
            }
        };

        if !live {
            self.inner.stop_batch(&batch);
        }

        self.inner.count_outcome(status, 1);
        if let Err(e) = result {
            self.inner.notify_failure(&batch, &e);
        }

        let ids = vec![internal_id.to_owned()];
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) if !self.inner.grace.is_zero() => {
                let inner = self.inner.clone();
                runtime.spawn(async move { inner.retire(ids).await });
            }
            _ => self.inner.remove_ids(&ids),
        }
        true
    }

    pub fn pending_for(&self, target_id: &str) -> Vec<PendingPayment> {
        self.inner
            .payments
            .read()
            .get(target_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get(&self, internal_id: &str) -> Option<PendingPayment> {
        self.inner.find(internal_id)
    }

    pub fn snapshot(&self) -> Arc<PaymentMap> {
        self.inner.payments.read().clone()
    }

    /// Msats still expected to land on `target_id`, for showing optimistic totals
    pub fn total_pending_msats(&self, target_id: &str) -> u64 {
        self.inner
            .payments
            .read()
            .get(target_id)
            .map(|v| {
                v.iter()
                    .filter(|p| p.status != PaymentStatus::Failed)
                    .fold(0u64, |total, p| total.saturating_add(p.amount.0))
            })
            .unwrap_or(0)
    }
}

fn remove_where<F: Fn(&PendingPayment) -> bool>(map: &mut PaymentMap, f: F) -> usize {
    let mut removed = 0;
    for list in map.values_mut() {
        let before = list.len();
        list.retain(|p| !f(p));
        removed += before - list.len();
    }
    map.retain(|_, list| !list.is_empty());
    removed
}

impl Inner {
    // Copy-on-write: anyone holding a snapshot keeps the map they were given
    fn update<R, F: FnOnce(&mut PaymentMap) -> R>(&self, f: F) -> R {
        let mut payments = self.payments.write();
        f(Arc::make_mut(&mut payments))
    }

    fn find(&self, internal_id: &str) -> Option<PendingPayment> {
        self.payments
            .read()
            .values()
            .flat_map(|v| v.iter())
            .find(|p| p.internal_id == internal_id)
            .cloned()
    }

    /// Move the batch's unresolved records to `status`, returning the ids changed
    fn set_batch_status(&self, batch: &str, status: PaymentStatus) -> Vec<String> {
        self.update(|map| {
            let mut changed = Vec::new();
            for p in map.values_mut().flat_map(|v| v.iter_mut()) {
                if p.batch == batch && !p.status.is_terminal() {
                    p.status = status;
                    changed.push(p.internal_id.clone());
                }
            }
            changed
        })
    }

    fn take_cancel(&self, batch: &str) -> Option<oneshot::Sender<()>> {
        self.batches
            .lock()
            .get_mut(batch)
            .and_then(|b| b.cancel.take())
    }

    // Nothing in the batch is left to send or wait for
    fn stop_batch(&self, batch: &str) {
        let mut batches = self.batches.lock();
        if let Some(control) = batches.get_mut(batch) {
            // dropping the sender ends a delay that has not run out yet
            control.cancel = None;
            if let Some(stop) = control.stop.take() {
                let _ = stop.send(());
            }
        }
    }

    // One failure message per intent, however its records resolve
    fn notify_failure(&self, batch: &str, reason: &str) {
        let first = match self.batches.lock().get_mut(batch) {
            Some(control) => !std::mem::replace(&mut control.failure_notified, true),
            None => true,
        };
        if first {
            self.notifier.notify(format!("Zap failed: {}", reason));
        }
    }

    fn count_outcome(&self, status: PaymentStatus, n: u64) {
        match status {
            PaymentStatus::Confirmed => self.metrics.incr("payments.confirmed", n),
            PaymentStatus::Failed => self.metrics.incr("payments.failed", n),
            _ => {}
        }
    }

    /// Send the payment and follow it until its first completion, or until every
    /// record has been resolved some other way
    async fn drive(
        self: Arc<Self>,
        intent: Arc<dyn PaymentIntent>,
        mut notifications: broadcast::Receiver<PaymentNotification>,
        mut stop: oneshot::Receiver<()>,
        batch: String,
    ) {
        self.metrics.incr("payments.dispatched", 1);
        tracing::info!("Sending zap {} to {}", batch, intent.target().id());

        let dispatch = intent.dispatch();
        tokio::pin!(dispatch);
        let mut dispatched = false;

        let resolved = loop {
            tokio::select! {
                result = &mut dispatch, if !dispatched => {
                    dispatched = true;
                    if let Err(e) = result {
                        tracing::warn!("Zap {} could not be sent: {}", batch, e);
                        break self.fail_batch(&batch, &e.kind.to_string());
                    }
                }
                _ = &mut stop => {
                    tracing::debug!("Zap {} was resolved by callback", batch);
                    break Vec::new();
                }
                notification = notifications.recv() => match notification {
                    Ok(PaymentNotification::Invoice { recipient, invoice }) => {
                        self.record_invoice(&batch, &recipient, &invoice);
                    }
                    Ok(PaymentNotification::Complete(results)) => {
                        // Only the first completion counts
                        break self.complete_batch(&batch, results);
                    }
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("Zap {} missed {} notifications", batch, n);
                    }
                    Err(RecvError::Closed) => {
                        // The intent went away without completing
                        if !dispatched {
                            dispatched = true;
                            if let Err(e) = (&mut dispatch).await {
                                break self.fail_batch(&batch, &e.kind.to_string());
                            }
                        }
                        tracing::warn!("Zap {} ended without completing", batch);
                        break self.fail_batch(&batch, "payment ended without a result");
                    }
                }
            }
        };

        // Every record is resolved now
        self.batches.lock().remove(&batch);

        // The wallet may still be working after it reported; let it finish
        let lingering = async move {
            if !dispatched {
                if let Err(e) = dispatch.await {
                    tracing::debug!("Zap dispatch ended after resolving: {}", e);
                }
            }
        };
        tokio::join!(lingering, self.retire(resolved));
    }

    fn record_invoice(&self, batch: &str, recipient: &str, invoice: &str) {
        let matched = self.update(|map| {
            map.values_mut()
                .find_map(|list| assign_invoice(list, batch, recipient, invoice))
        });
        match matched {
            Some(InvoiceMatch::Exact(id)) => {
                tracing::debug!("Invoice for {} matched payment {}", recipient, id);
            }
            Some(InvoiceMatch::Fallback(id)) => {
                tracing::warn!(
                    "No payment waiting for recipient {}, gave its invoice to {}",
                    recipient,
                    id
                );
                self.metrics.incr("payments.invoice_fallback", 1);
            }
            None => {
                tracing::debug!("Invoice for {} has no payment waiting", recipient);
            }
        }
    }

    /// Resolve the batch's open records from a completion. Returns the ids resolved.
    fn complete_batch(&self, batch: &str, results: CompletionResults) -> Vec<String> {
        let overall_error: Option<String> = results.values().find_map(|r| r.clone().err());

        let (resolved, first_error) = self.update(|map| {
            let mut resolved: Vec<(String, PaymentStatus)> = Vec::new();
            let mut first_error: Option<String> = None;
            for p in map.values_mut().flat_map(|v| v.iter_mut()) {
                if p.batch != batch || p.status.is_terminal() {
                    continue;
                }
                // A recipient missing from the results follows the overall outcome
                let outcome = match results.get(&p.recipient) {
                    Some(r) => r.clone(),
                    None => match &overall_error {
                        Some(e) => Err(e.clone()),
                        None => Ok(()),
                    },
                };
                p.status = match outcome {
                    Ok(()) => PaymentStatus::Confirmed,
                    Err(e) => {
                        first_error.get_or_insert(e);
                        PaymentStatus::Failed
                    }
                };
                resolved.push((p.internal_id.clone(), p.status));
            }
            (resolved, first_error)
        });

        if resolved.is_empty() {
            // cancelled or resolved by callback in the meantime
            tracing::debug!("Completion for zap {} found nothing to resolve", batch);
            return Vec::new();
        }

        for (_, status) in &resolved {
            self.count_outcome(*status, 1);
        }
        match first_error {
            Some(e) => {
                tracing::warn!("Zap {} failed: {}", batch, e);
                self.notify_failure(batch, &e);
            }
            None => tracing::info!("Zap {} confirmed", batch),
        }

        resolved.into_iter().map(|(id, _)| id).collect()
    }

    /// Fail the batch's open records. Returns the ids failed.
    fn fail_batch(&self, batch: &str, reason: &str) -> Vec<String> {
        let failed = self.set_batch_status(batch, PaymentStatus::Failed);
        if failed.is_empty() {
            return failed;
        }
        self.count_outcome(PaymentStatus::Failed, failed.len() as u64);
        self.notify_failure(batch, reason);
        failed
    }

    /// Leave resolved records visible for the grace period, then drop them
    async fn retire(&self, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        if !self.grace.is_zero() {
            tokio::time::sleep(self.grace).await;
        }
        self.remove_ids(&ids);
    }

    fn remove_ids(&self, ids: &[String]) {
        self.update(|map| remove_where(map, |p| ids.contains(&p.internal_id)));
    }
}
