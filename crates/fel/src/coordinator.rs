//! FEL processing sessions.
//!
//! Each submission gets a slot in a table keyed by invoice id. A slot owns a
//! `watch` channel carrying the `ProcessingSession` snapshot and a `Notify`
//! used to stop the polling task. Slots are reserved before the submission
//! is awaited, so two callers can never both submit the same invoice.
//!
//! Cancelling only stops the local loop. The authority may still decide the
//! document afterwards, so a cancelled invoice is parked until `reconcile`
//! has seen its real status.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, watch};
use tokio::time::{self, Instant, MissedTickBehavior};

use mercaderp_invoicing::{FelErrorCode, FelStatus, FiscalInvoice, InvoiceId, is_valid_tax_id};

use crate::config::{ConfigError, FelConfig};
use crate::error::FelError;
use crate::session::ProcessingSession;
use crate::transport::{FelRequest, FelTransport, TransportError};

/// Read side of a session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    invoice_id: InvoiceId,
    updates: watch::Receiver<ProcessingSession>,
}

impl SessionHandle {
    pub fn invoice_id(&self) -> InvoiceId {
        self.invoice_id
    }

    pub fn current(&self) -> ProcessingSession {
        self.updates.borrow().clone()
    }

    /// Wait for the next snapshot. `None` once the session is discarded.
    pub async fn changed(&mut self) -> Option<ProcessingSession> {
        self.updates.changed().await.ok()?;
        Some(self.updates.borrow_and_update().clone())
    }

    /// Wait until the session stops running (decided, failed or cancelled).
    pub async fn settled(&mut self) -> ProcessingSession {
        loop {
            {
                let session = self.updates.borrow_and_update();
                if !session.is_running() {
                    return session.clone();
                }
            }
            if self.updates.changed().await.is_err() {
                return self.current();
            }
        }
    }
}

/// Result of a submission or retry.
#[derive(Debug, Clone)]
pub struct Submission {
    /// The authority's view right after the request was accepted.
    pub invoice: FiscalInvoice,
    pub session: SessionHandle,
}

#[derive(Debug, Clone)]
struct Run {
    invoice_id: InvoiceId,
    generation: u64,
    updates: Arc<watch::Sender<ProcessingSession>>,
    cancel: Arc<Notify>,
}

impl Run {
    fn handle(&self) -> SessionHandle {
        SessionHandle {
            invoice_id: self.invoice_id,
            updates: self.updates.subscribe(),
        }
    }

    /// Apply `change` unless the session was cancelled. Returns whether it applied.
    fn publish(&self, change: impl FnOnce(&mut ProcessingSession)) -> bool {
        self.updates.send_if_modified(|session| {
            if session.cancelled {
                return false;
            }
            change(session);
            true
        })
    }
}

#[derive(Debug)]
struct Slot {
    run: Run,
    active: bool,
}

struct Inner<T> {
    transport: Arc<T>,
    config: FelConfig,
    slots: Mutex<HashMap<InvoiceId, Slot>>,
    parked: Mutex<HashSet<InvoiceId>>,
    generations: AtomicU64,
}

impl<T: FelTransport> Inner<T> {
    fn slots(&self) -> MutexGuard<'_, HashMap<InvoiceId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn parked(&self) -> MutexGuard<'_, HashSet<InvoiceId>> {
        self.parked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reserve(&self, invoice_id: InvoiceId) -> Result<Run, FelError> {
        let mut slots = self.slots();
        if slots.get(&invoice_id).is_some_and(|slot| slot.active) {
            return Err(FelError::AlreadyProcessing(invoice_id));
        }
        let (updates, _) = watch::channel(ProcessingSession::new(invoice_id));
        let run = Run {
            invoice_id,
            generation: self.generations.fetch_add(1, Ordering::Relaxed),
            updates: Arc::new(updates),
            cancel: Arc::new(Notify::new()),
        };
        slots.insert(invoice_id, Slot { run: run.clone(), active: true });
        Ok(run)
    }

    /// Drop a reservation whose request never reached the authority.
    fn release(&self, run: &Run) {
        let mut slots = self.slots();
        if slots.get(&run.invoice_id).is_some_and(|slot| slot.run.generation == run.generation) {
            slots.remove(&run.invoice_id);
        }
    }

    fn settle(&self, run: &Run, invoice: FiscalInvoice) {
        tracing::info!(
            invoice_id = %run.invoice_id,
            status = %invoice.status(),
            attempt = invoice.fel.attempts,
            error_code = invoice.fel.error_code.as_ref().map(|c| c.as_str()).unwrap_or(""),
            "fel session settled"
        );
        // observers woken by the final snapshot must find the slot free
        if let Some(slot) = self.slots().get_mut(&run.invoice_id) {
            if slot.run.generation == run.generation {
                slot.active = false;
            }
        }
        run.publish(|session| session.finish(invoice));
    }
}

/// Drives FEL submissions against the authority, one session per invoice.
pub struct FelCoordinator<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for FelCoordinator<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: FelTransport> FelCoordinator<T> {
    /// Fails if the timings in `config` are inconsistent.
    pub fn new(transport: Arc<T>, config: FelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                config,
                slots: Mutex::new(HashMap::new()),
                parked: Mutex::new(HashSet::new()),
                generations: AtomicU64::new(0),
            }),
        })
    }

    pub fn config(&self) -> &FelConfig {
        &self.inner.config
    }

    /// Submit an invoice and start watching it.
    ///
    /// Refused with `AlreadyProcessing` while another session for the same
    /// invoice is running; use `attach` to observe that one instead.
    pub async fn create_fel_invoice(&self, request: FelRequest) -> Result<Submission, FelError> {
        let invoice_id = request.invoice_id;
        if !is_valid_tax_id(&request.client_tax_id) {
            return Err(FelError::NotEligible(format!(
                "NIT {:?} cannot receive an electronic invoice",
                request.client_tax_id.trim()
            )));
        }
        if request.total == 0 {
            return Err(FelError::NotEligible("invoice total must be greater than zero".to_string()));
        }
        self.ensure_reconciled(invoice_id).await?;

        let run = self.inner.reserve(invoice_id)?;
        tracing::info!(
            invoice_id = %invoice_id,
            invoice_number = %request.invoice_number,
            "submitting fel invoice"
        );
        let submitted = self.inner.transport.submit(&request).await;
        self.launch(run, submitted)
    }

    /// Resubmit a failed invoice.
    ///
    /// The authority is asked first: an authorized document is never
    /// resubmitted, and a document it is still working on (after a local
    /// timeout) is watched again without spending an attempt.
    pub async fn retry_fel(&self, invoice_id: InvoiceId) -> Result<Submission, FelError> {
        self.ensure_reconciled(invoice_id).await?;
        if self.inner.slots().get(&invoice_id).is_some_and(|slot| slot.active) {
            return Err(FelError::AlreadyProcessing(invoice_id));
        }

        let current = self.inner.transport.poll_status(invoice_id).await?;
        current.validate()?;
        if current.status() == FelStatus::Authorized {
            return Err(FelError::AlreadyAuthorized(invoice_id));
        }
        if current.status().is_in_flight() {
            let run = self.inner.reserve(invoice_id)?;
            tracing::info!(
                invoice_id = %invoice_id,
                status = %current.status(),
                "authority still working on the document; resuming status polling"
            );
            return self.launch(run, Ok(current));
        }

        current
            .check_retry()
            .map_err(|err| FelError::RetryNotAllowed(err.to_string()))?;
        let run = self.inner.reserve(invoice_id)?;
        tracing::info!(
            invoice_id = %invoice_id,
            attempt = current.fel.attempts + 1,
            max_attempts = current.fel.max_attempts,
            "resubmitting fel invoice"
        );
        let resubmitted = self.inner.transport.resubmit(invoice_id).await;
        self.launch(run, resubmitted)
    }

    /// Stop watching a running session.
    ///
    /// Local only: the authority is not told. The invoice is parked until
    /// `reconcile` observes its real status.
    pub fn cancel_process(&self, invoice_id: InvoiceId) -> Result<ProcessingSession, FelError> {
        let run = {
            let mut slots = self.inner.slots();
            match slots.get(&invoice_id) {
                None => return Err(FelError::NoSession(invoice_id)),
                Some(slot) if !slot.active => return Err(FelError::Finished(invoice_id)),
                Some(_) => {}
            }
            match slots.remove(&invoice_id) {
                Some(slot) => slot.run,
                None => return Err(FelError::NoSession(invoice_id)),
            }
        };
        run.updates.send_modify(|session| {
            session.cancelled = true;
            session.estimated_time_left_secs = None;
        });
        run.cancel.notify_one();
        self.inner.parked().insert(invoice_id);
        tracing::info!(invoice_id = %invoice_id, "fel session cancelled locally; parked for reconciliation");
        Ok(run.updates.borrow().clone())
    }

    /// Forget a finished session.
    pub fn reset(&self, invoice_id: InvoiceId) -> Result<(), FelError> {
        let mut slots = self.inner.slots();
        match slots.get(&invoice_id) {
            None => Err(FelError::NoSession(invoice_id)),
            Some(slot) if slot.active => Err(FelError::StillProcessing(invoice_id)),
            Some(_) => {
                slots.remove(&invoice_id);
                Ok(())
            }
        }
    }

    pub fn attach(&self, invoice_id: InvoiceId) -> Option<SessionHandle> {
        self.inner.slots().get(&invoice_id).map(|slot| slot.run.handle())
    }

    pub fn session(&self, invoice_id: InvoiceId) -> Option<ProcessingSession> {
        self.inner
            .slots()
            .get(&invoice_id)
            .map(|slot| slot.run.updates.borrow().clone())
    }

    /// Invoices cancelled locally whose remote outcome is not known yet.
    pub fn parked(&self) -> Vec<InvoiceId> {
        self.inner.parked().iter().copied().collect()
    }

    /// Fetch the authority's status for an invoice and unpark it once the
    /// authority is no longer working on it. `None` means the authority
    /// never received the document.
    pub async fn reconcile(&self, invoice_id: InvoiceId) -> Result<Option<FiscalInvoice>, FelError> {
        let invoice = match self.inner.transport.poll_status(invoice_id).await {
            Ok(invoice) => invoice,
            Err(TransportError::NotFound(_)) => {
                self.inner.parked().remove(&invoice_id);
                tracing::info!(invoice_id = %invoice_id, "authority has no record; unparked");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        invoice.validate()?;
        if !invoice.status().is_in_flight() {
            self.inner.parked().remove(&invoice_id);
        }
        tracing::debug!(invoice_id = %invoice_id, status = %invoice.status(), "reconciled fel invoice");
        Ok(Some(invoice))
    }

    /// Reconcile every parked invoice.
    pub async fn reconcile_parked(&self) -> Vec<(InvoiceId, Result<Option<FiscalInvoice>, FelError>)> {
        let mut outcomes = Vec::new();
        for invoice_id in self.parked() {
            outcomes.push((invoice_id, self.reconcile(invoice_id).await));
        }
        outcomes
    }

    /// Rendered document of an authorized invoice.
    pub async fn download_document(&self, invoice_id: InvoiceId) -> Result<Vec<u8>, FelError> {
        let invoice = self.inner.transport.poll_status(invoice_id).await?;
        if invoice.status() != FelStatus::Authorized {
            return Err(FelError::NotAuthorized(invoice_id));
        }
        Ok(self.inner.transport.download_document(invoice_id).await?)
    }

    async fn ensure_reconciled(&self, invoice_id: InvoiceId) -> Result<(), FelError> {
        if !self.inner.parked().contains(&invoice_id) {
            return Ok(());
        }
        match self.reconcile(invoice_id).await? {
            Some(invoice) if invoice.status().is_in_flight() => {
                Err(FelError::AwaitingReconciliation(invoice_id))
            }
            Some(invoice) if invoice.status() == FelStatus::Authorized => {
                Err(FelError::AlreadyAuthorized(invoice_id))
            }
            _ => Ok(()),
        }
    }

    fn launch(
        &self,
        run: Run,
        accepted: Result<FiscalInvoice, TransportError>,
    ) -> Result<Submission, FelError> {
        let invoice = match accepted
            .map_err(FelError::from)
            .and_then(|invoice| invoice.validate().map(|()| invoice).map_err(FelError::from))
        {
            Ok(invoice) => invoice,
            Err(err) => {
                tracing::warn!(invoice_id = %run.invoice_id, error = %err, "fel submission failed");
                self.inner.release(&run);
                return Err(err);
            }
        };

        let session = run.handle();
        let expected = self.inner.config.expected_duration;
        if !run.publish(|session| session.submitted(invoice.clone(), expected)) {
            // cancelled while the request was in flight
            return Ok(Submission { invoice, session });
        }
        if invoice.status().is_in_flight() {
            tokio::spawn(drive(Arc::clone(&self.inner), run, invoice.clone()));
        } else {
            self.inner.settle(&run, invoice.clone());
        }
        Ok(Submission { invoice, session })
    }
}

type PendingPoll<'a> = Pin<Box<dyn Future<Output = Result<FiscalInvoice, TransportError>> + Send + 'a>>;

async fn next_poll(poll: &mut Option<PendingPoll<'_>>) -> Result<FiscalInvoice, TransportError> {
    match poll.as_mut() {
        Some(pending) => pending.await,
        None => std::future::pending().await,
    }
}

async fn drive<T: FelTransport>(inner: Arc<Inner<T>>, run: Run, mut last_known: FiscalInvoice) {
    let config = &inner.config;
    let started = Instant::now();
    let deadline = started + config.timeout;
    let mut ticker = time::interval(config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_poll = started;
    let mut poll: Option<PendingPoll<'_>> = None;
    let mut failures = 0u32;

    loop {
        let polled = tokio::select! {
            biased;
            _ = run.cancel.notified() => return,
            _ = time::sleep_until(deadline) => {
                tracing::warn!(
                    invoice_id = %run.invoice_id,
                    poll_outstanding = poll.is_some(),
                    "no decision from the authority before the timeout"
                );
                let message = format!("no decision from the authority within {}s", config.timeout.as_secs());
                if let Err(err) = last_known.mark_failed(FelStatus::Timeout, FelErrorCode::ConnectionTimeout, message) {
                    tracing::error!(invoice_id = %run.invoice_id, error = %err, "could not record timeout");
                }
                inner.settle(&run, last_known);
                return;
            }
            polled = next_poll(&mut poll) => polled,
            _ = ticker.tick() => {
                let now = Instant::now();
                if !run.publish(|session| session.tick(now.duration_since(started), config.expected_duration)) {
                    return;
                }
                if poll.is_none() && now.duration_since(last_poll) >= config.poll_interval {
                    last_poll = now;
                    poll = Some(inner.transport.poll_status(run.invoice_id));
                }
                continue;
            }
        };
        poll = None;

        let polled = polled
            .map_err(FelError::from)
            .and_then(|invoice| invoice.validate().map(|()| invoice).map_err(FelError::from));

        match polled {
            Ok(invoice) if invoice.status().is_in_flight() => {
                failures = 0;
                last_known = invoice.clone();
                if !run.publish(|session| session.observe(invoice)) {
                    return;
                }
            }
            Ok(invoice) => {
                inner.settle(&run, invoice);
                return;
            }
            Err(err) => {
                failures += 1;
                tracing::warn!(
                    invoice_id = %run.invoice_id,
                    failures,
                    max_failures = config.max_poll_failures,
                    error = %err,
                    "fel status poll failed"
                );
                if failures >= config.max_poll_failures {
                    let message = format!("status poll failed {failures} times in a row: {err}");
                    if let Err(err) =
                        last_known.mark_failed(FelStatus::Error, FelErrorCode::ConnectionTimeout, message)
                    {
                        tracing::error!(invoice_id = %run.invoice_id, error = %err, "could not record poll failure");
                    }
                    inner.settle(&run, last_known);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use mercaderp_core::AggregateId;
    use mercaderp_invoicing::RecoveryKind;

    use crate::transport::{InMemoryFelTransport, ScriptedOutcome};

    type Coordinator = FelCoordinator<InMemoryFelTransport>;

    fn setup() -> (Arc<InMemoryFelTransport>, Coordinator) {
        let transport = Arc::new(InMemoryFelTransport::new());
        let coordinator = FelCoordinator::new(Arc::clone(&transport), FelConfig::default()).unwrap();
        (transport, coordinator)
    }

    fn request(max_attempts: u32) -> FelRequest {
        FelRequest {
            invoice_id: InvoiceId::new(AggregateId::new()),
            invoice_number: "FAC-2024-0001".to_string(),
            client_tax_id: "4455667-1".to_string(),
            total: 875_50,
            max_attempts,
        }
    }

    fn kinds(session: &ProcessingSession) -> Vec<RecoveryKind> {
        session
            .error_report()
            .map(|report| report.actions.iter().map(|a| a.kind).collect())
            .unwrap_or_default()
    }

    #[tokio::test(start_paused = true)]
    async fn authorized_flow_reaches_full_progress() {
        let (transport, coordinator) = setup();
        let req = request(3);
        let id = req.invoice_id;
        transport.script(id, [ScriptedOutcome::Processing, ScriptedOutcome::Authorize]);

        let mut submission = coordinator.create_fel_invoice(req).await.unwrap();
        assert_eq!(submission.invoice.fel.attempts, 1);
        assert_eq!(submission.session.current().progress, 10);

        let done = submission.session.settled().await;
        assert_eq!(done.status, FelStatus::Authorized);
        assert_eq!(done.progress, 100);
        assert_eq!(done.attempt, 1);
        assert_eq!(done.eta_display(), "--");
        assert!(done.invoice.as_ref().and_then(|i| i.fel.uuid.clone()).is_some());
        assert_eq!(coordinator.session(id).map(|s| s.status), Some(FelStatus::Authorized));

        let document = coordinator.download_document(id).await.unwrap();
        assert!(!document.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_monotonic_while_running() {
        let (transport, coordinator) = setup();
        let req = request(3);
        transport.script(
            req.invoice_id,
            [ScriptedOutcome::Processing, ScriptedOutcome::Processing, ScriptedOutcome::Authorize],
        );

        let mut handle = coordinator.create_fel_invoice(req).await.unwrap().session;
        let mut last = handle.current().progress;
        while let Some(session) = handle.changed().await {
            assert!(session.progress >= last, "{} < {}", session.progress, last);
            last = session.progress;
            if !session.is_running() {
                break;
            }
        }
        assert_eq!(last, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_offers_client_fix_first() {
        let (transport, coordinator) = setup();
        let req = request(3);
        transport.script(
            req.invoice_id,
            [ScriptedOutcome::fail(FelStatus::Rejected, FelErrorCode::InvalidNit, "NIT no registrado")],
        );

        let done = coordinator.create_fel_invoice(req).await.unwrap().session.settled().await;
        assert_eq!(done.status, FelStatus::Rejected);
        assert_eq!(done.progress, 100);
        assert_eq!(done.error.as_deref(), Some("NIT no registrado"));
        assert_eq!(
            kinds(&done),
            vec![RecoveryKind::EditClient, RecoveryKind::Retry, RecoveryKind::Receipt]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn silence_ends_in_timeout_at_the_ceiling() {
        let (transport, coordinator) = setup();
        let req = request(3);
        let id = req.invoice_id;
        let started = Instant::now();

        let done = coordinator.create_fel_invoice(req).await.unwrap().session.settled().await;
        assert_eq!(done.status, FelStatus::Timeout);
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert!(done.progress < 100);
        let report = done.error_report().unwrap();
        assert_eq!(report.error_code, "connection_timeout");
        assert_eq!(kinds(&done), vec![RecoveryKind::Retry, RecoveryKind::Receipt]);

        // the authority was still working: retry resumes watching, no new attempt
        let mut resumed = coordinator.retry_fel(id).await.unwrap();
        assert_eq!(resumed.invoice.fel.attempts, 1);
        assert_eq!(transport.submissions(id), 1);
        transport.script(id, [ScriptedOutcome::Authorize]);
        assert_eq!(resumed.session.settled().await.status, FelStatus::Authorized);
    }

    #[tokio::test(start_paused = true)]
    async fn second_submission_is_refused_while_running() {
        let (transport, coordinator) = setup();
        let req = request(3);
        let id = req.invoice_id;

        coordinator.create_fel_invoice(req.clone()).await.unwrap();
        assert!(matches!(
            coordinator.create_fel_invoice(req).await,
            Err(FelError::AlreadyProcessing(got)) if got == id
        ));
        assert!(matches!(coordinator.retry_fel(id).await, Err(FelError::AlreadyProcessing(_))));
        assert!(matches!(coordinator.reset(id), Err(FelError::StillProcessing(_))));
        assert!(coordinator.attach(id).is_some_and(|h| h.current().is_running()));
        assert_eq!(transport.submissions(id), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_freezes_session_and_parks_invoice() {
        let (transport, coordinator) = setup();
        let req = request(3);
        let id = req.invoice_id;

        let handle = coordinator.create_fel_invoice(req.clone()).await.unwrap().session;
        time::sleep(Duration::from_secs(5)).await;

        let frozen = coordinator.cancel_process(id).unwrap();
        assert!(frozen.cancelled);
        assert!(frozen.progress > 10);
        assert_eq!(coordinator.parked(), vec![id]);
        assert!(coordinator.session(id).is_none());

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(handle.current(), frozen);
        assert!(matches!(coordinator.cancel_process(id), Err(FelError::NoSession(_))));

        // authority still pending: no new submission
        assert!(matches!(
            coordinator.create_fel_invoice(req).await,
            Err(FelError::AwaitingReconciliation(_))
        ));
        assert_eq!(transport.submissions(id), 1);

        transport.script(id, [ScriptedOutcome::Authorize]);
        assert!(matches!(coordinator.retry_fel(id).await, Err(FelError::AlreadyAuthorized(_))));
        assert!(coordinator.parked().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded_by_max_attempts() {
        let (transport, coordinator) = setup();
        let req = request(2);
        let id = req.invoice_id;
        let server_error = || ScriptedOutcome::fail(FelStatus::Error, FelErrorCode::ServerError, "HTTP 502");

        transport.script(id, [server_error()]);
        let first = coordinator.create_fel_invoice(req).await.unwrap().session.settled().await;
        assert_eq!(first.status, FelStatus::Error);
        assert_eq!(first.attempt, 1);
        assert_eq!(kinds(&first), vec![RecoveryKind::Retry, RecoveryKind::Receipt]);

        let mut retried = coordinator.retry_fel(id).await.unwrap();
        assert_eq!(retried.invoice.fel.attempts, 2);
        assert_eq!(retried.session.current().status, FelStatus::Pending);
        transport.script(id, [server_error()]);
        let second = retried.session.settled().await;
        assert_eq!(second.status, FelStatus::Error);
        assert_eq!(second.attempt, 2);
        assert_eq!(second.error_report().map(|r| r.attempts_remaining), Some(0));
        assert_eq!(kinds(&second), vec![RecoveryKind::Receipt]);

        assert!(matches!(coordinator.retry_fel(id).await, Err(FelError::RetryNotAllowed(_))));
        assert_eq!(transport.submissions(id), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_error_can_succeed() {
        let (transport, coordinator) = setup();
        let req = request(3);
        let id = req.invoice_id;
        transport.script(
            id,
            [ScriptedOutcome::fail(FelStatus::Error, FelErrorCode::ConnectionTimeout, "gateway timeout")],
        );
        coordinator.create_fel_invoice(req).await.unwrap().session.settled().await;

        let mut retried = coordinator.retry_fel(id).await.unwrap();
        transport.script(id, [ScriptedOutcome::Authorize]);
        let done = retried.session.settled().await;
        assert_eq!(done.status, FelStatus::Authorized);
        assert_eq!(done.attempt, 2);
        assert!(done.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_document_is_never_retried() {
        let (transport, coordinator) = setup();
        let req = request(3);
        let id = req.invoice_id;
        transport.script(
            id,
            [ScriptedOutcome::fail(FelStatus::Rejected, FelErrorCode::DuplicateDocument, "DTE duplicado")],
        );

        let done = coordinator.create_fel_invoice(req).await.unwrap().session.settled().await;
        assert_eq!(kinds(&done), vec![RecoveryKind::ContactSupport]);
        assert!(matches!(coordinator.retry_fel(id).await, Err(FelError::RetryNotAllowed(_))));
        assert_eq!(transport.submissions(id), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_failures_are_tolerated_up_to_the_limit() {
        let (transport, coordinator) = setup();
        let req = request(3);
        transport.script(
            req.invoice_id,
            [
                ScriptedOutcome::PollError("connection reset".into()),
                ScriptedOutcome::PollError("connection reset".into()),
                ScriptedOutcome::Authorize,
            ],
        );
        let done = coordinator.create_fel_invoice(req).await.unwrap().session.settled().await;
        assert_eq!(done.status, FelStatus::Authorized);

        let req = request(3);
        transport.script(
            req.invoice_id,
            (0..3).map(|_| ScriptedOutcome::PollError("no route to host".into())),
        );
        let done = coordinator.create_fel_invoice(req).await.unwrap().session.settled().await;
        assert_eq!(done.status, FelStatus::Error);
        assert_eq!(
            done.invoice.and_then(|i| i.fel.error_code),
            Some(FelErrorCode::ConnectionTimeout)
        );
        assert!(done.error.is_some_and(|e| e.contains("3 times")));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_submission_releases_the_slot() {
        let (transport, coordinator) = setup();
        let req = request(3);
        let id = req.invoice_id;
        transport.fail_next_submit(TransportError::Network("dns failure".into()));

        assert!(matches!(
            coordinator.create_fel_invoice(req.clone()).await,
            Err(FelError::Transport(TransportError::Network(_)))
        ));
        assert!(coordinator.session(id).is_none());
        assert!(coordinator.create_fel_invoice(req).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_only_finished_sessions() {
        let (transport, coordinator) = setup();
        let req = request(3);
        let id = req.invoice_id;
        assert!(matches!(coordinator.reset(id), Err(FelError::NoSession(_))));

        transport.script(id, [ScriptedOutcome::Authorize]);
        coordinator.create_fel_invoice(req).await.unwrap().session.settled().await;
        assert!(matches!(coordinator.cancel_process(id), Err(FelError::Finished(_))));
        coordinator.reset(id).unwrap();
        assert!(coordinator.session(id).is_none());
        assert!(coordinator.attach(id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_nit_never_reaches_the_authority() {
        let (transport, coordinator) = setup();
        let mut req = request(3);
        req.client_tax_id = "C/F".to_string();
        let id = req.invoice_id;

        assert!(matches!(coordinator.create_fel_invoice(req).await, Err(FelError::NotEligible(_))));
        assert_eq!(transport.submissions(id), 0);
        assert!(matches!(coordinator.download_document(id).await, Err(FelError::Transport(_))));
    }

    /// In-memory authority that can hold submissions at a gate or never
    /// answer a status poll.
    #[derive(Default)]
    struct HeldTransport {
        authority: InMemoryFelTransport,
        gate: Option<Notify>,
        stall_polls: bool,
    }

    impl HeldTransport {
        fn gating_submits() -> Self {
            Self { gate: Some(Notify::new()), ..Self::default() }
        }

        fn stalling_polls() -> Self {
            Self { stall_polls: true, ..Self::default() }
        }

        fn open_gate(&self) {
            if let Some(gate) = &self.gate {
                gate.notify_one();
            }
        }
    }

    #[async_trait::async_trait]
    impl FelTransport for HeldTransport {
        async fn submit(&self, request: &FelRequest) -> Result<FiscalInvoice, TransportError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.authority.submit(request).await
        }

        async fn resubmit(&self, invoice_id: InvoiceId) -> Result<FiscalInvoice, TransportError> {
            self.authority.resubmit(invoice_id).await
        }

        async fn poll_status(&self, invoice_id: InvoiceId) -> Result<FiscalInvoice, TransportError> {
            if self.stall_polls {
                std::future::pending::<()>().await;
            }
            self.authority.poll_status(invoice_id).await
        }

        async fn download_document(&self, invoice_id: InvoiceId) -> Result<Vec<u8>, TransportError> {
            self.authority.download_document(invoice_id).await
        }
    }

    async fn wait_for_reservation<T: FelTransport>(coordinator: &FelCoordinator<T>, id: InvoiceId) {
        while coordinator.session(id).is_none() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_poll_still_times_out_and_keeps_ticking() {
        let transport = Arc::new(HeldTransport::stalling_polls());
        let coordinator = FelCoordinator::new(Arc::clone(&transport), FelConfig::default()).unwrap();
        let started = Instant::now();

        let mut handle = coordinator.create_fel_invoice(request(3)).await.unwrap().session;
        time::sleep(Duration::from_secs(20)).await;
        let midway = handle.current();
        assert!(midway.is_running());
        assert!(midway.time_elapsed_secs >= 19);
        assert!(midway.progress > 60);

        let done = time::timeout(Duration::from_secs(120), handle.settled())
            .await
            .expect("session settles at the ceiling");
        assert_eq!(done.status, FelStatus::Timeout);
        assert!(started.elapsed() < Duration::from_secs(61));
        assert_eq!(done.error_report().map(|r| r.error_code), Some("connection_timeout".to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn settled_session_can_be_reset_right_away() {
        let transport = Arc::new(InMemoryFelTransport::new());
        let config = FelConfig::default()
            .with_tick_interval(Duration::from_millis(1))
            .with_poll_interval(Duration::from_millis(1))
            .with_timeout(Duration::from_secs(5));
        let coordinator = FelCoordinator::new(Arc::clone(&transport), config).unwrap();

        for _ in 0..100 {
            let req = request(3);
            let id = req.invoice_id;
            transport.script(id, [ScriptedOutcome::Authorize]);
            let done = coordinator.create_fel_invoice(req).await.unwrap().session.settled().await;
            assert_eq!(done.status, FelStatus::Authorized);
            coordinator.reset(id).unwrap();
        }
    }

    #[test]
    fn inconsistent_timings_are_rejected_at_construction() {
        let transport = Arc::new(InMemoryFelTransport::new());
        let config = FelConfig::default().with_tick_interval(Duration::ZERO);
        assert!(matches!(
            FelCoordinator::new(transport, config),
            Err(ConfigError::Zero { var: "FEL_TICK_INTERVAL_MS" })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_submission_never_starts_polling() {
        let transport = Arc::new(HeldTransport::gating_submits());
        let coordinator = FelCoordinator::new(Arc::clone(&transport), FelConfig::default()).unwrap();
        let req = request(3);
        let id = req.invoice_id;

        let pending = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.create_fel_invoice(req).await }
        });
        wait_for_reservation(&coordinator, id).await;

        let frozen = coordinator.cancel_process(id).unwrap();
        assert!(frozen.cancelled);
        transport.open_gate();

        let submission = pending.await.unwrap().unwrap();
        assert_eq!(submission.session.current(), frozen);
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(submission.session.current(), frozen);
        assert_eq!(submission.session.current().progress, 0);

        // the document did reach the authority, which is still working on it
        assert_eq!(transport.authority.submissions(id), 1);
        assert_eq!(coordinator.parked(), vec![id]);
        assert!(matches!(
            coordinator.retry_fel(id).await,
            Err(FelError::AwaitingReconciliation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_to_the_authority_unparks_and_allows_resubmission() {
        let transport = Arc::new(HeldTransport::gating_submits());
        let coordinator = FelCoordinator::new(Arc::clone(&transport), FelConfig::default()).unwrap();
        let req = request(3);
        let id = req.invoice_id;
        transport.authority.fail_next_submit(TransportError::Network("socket closed".into()));

        let pending = tokio::spawn({
            let coordinator = coordinator.clone();
            let req = req.clone();
            async move { coordinator.create_fel_invoice(req).await }
        });
        wait_for_reservation(&coordinator, id).await;
        coordinator.cancel_process(id).unwrap();
        transport.open_gate();

        assert!(matches!(
            pending.await.unwrap(),
            Err(FelError::Transport(TransportError::Network(_)))
        ));
        assert_eq!(coordinator.parked(), vec![id]);

        assert!(coordinator.reconcile(id).await.unwrap().is_none());
        assert!(coordinator.parked().is_empty());

        transport.open_gate();
        let submission = coordinator.create_fel_invoice(req).await.unwrap();
        assert!(submission.session.current().is_running());
        assert_eq!(transport.authority.submissions(id), 1);
    }
}
