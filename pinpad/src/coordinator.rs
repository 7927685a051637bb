//! Transaction Coordinator
//!
//! Drives one authorization at a time through the terminal gate:
//!
//! ```text
//! authorize ─► slot free? ─► (probe if suspect) ─► bridge ─► classify
//!                                                              │
//!            ┌─────────────────────────────────────────────────┤
//!            ▼                    ▼                            ▼
//!   approved + two-phase      denied                    cancelled / plain
//!   hold (before return)   undo stranded pendency          return
//! ```
//!
//! Authorizations are never retried here.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, instrument, warn};

use shared::payment::{
    AuthorizationOutcome, AuthorizationRequest, OutcomeStatus, OutcomeWarning, Resolution,
};

use crate::classify::classify_authorization;
use crate::config::ConfirmationPolicy;
use crate::error::{TerminalError, TerminalResult};
use crate::record::{OperationKind, OperationRecord};
use crate::resolver::ConfirmationResolver;
use crate::terminal::{Session, Terminal};

/// Transaction Coordinator
#[derive(Debug)]
pub struct TransactionCoordinator {
    terminal: Arc<Terminal>,
    resolver: Arc<ConfirmationResolver>,
    policy: ConfirmationPolicy,
    /// Set when an authorization went unanswered; the device may hold a
    /// pendency nobody has seen
    suspect: AtomicBool,
}

impl TransactionCoordinator {
    pub fn new(
        terminal: Arc<Terminal>,
        resolver: Arc<ConfirmationResolver>,
        policy: ConfirmationPolicy,
    ) -> Self {
        Self {
            terminal,
            resolver,
            policy,
            suspect: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> ConfirmationPolicy {
        self.policy
    }

    /// Whether the last authorization ended without a reply
    pub fn is_suspect(&self) -> bool {
        self.suspect.load(Ordering::Acquire)
    }

    /// Run one authorization
    ///
    /// Fails fast with `PendingConfirmationExists` while a pendency is held.
    /// Denials, user cancellations and transport failures come back as
    /// outcomes.
    #[instrument(skip_all, fields(order_id = %request.order_id, amount = request.amount_minor_units, method = %request.method))]
    pub async fn authorize(
        &self,
        request: &AuthorizationRequest,
    ) -> TerminalResult<AuthorizationOutcome> {
        request.validate()?;
        // Checked before queueing on the gate and again once inside it
        self.resolver.blocked()?;

        let session = self.terminal.session().await;
        self.resolver.blocked()?;

        if self.is_suspect() {
            if let Some(outcome) = self.probe_after_timeout(&session, request).await? {
                return Ok(outcome);
            }
        }

        self.terminal.record(OperationRecord::submitted(request));
        let reply = match session.authorize(request).await {
            Ok(reply) => reply,
            Err(e) => return Ok(self.unanswered(request, e)),
        };

        let mut outcome = classify_authorization(request, reply);
        self.terminal
            .record(OperationRecord::outcome(OperationKind::OutcomeReceived, &outcome));
        info!(summary = %outcome.summary(), "Authorization finished");

        if outcome.needs_confirmation() {
            self.hold_outcome(&session, &mut outcome).await?;
        } else if outcome.status == OutcomeStatus::Denied {
            match self.resolver.undo_stranded_in(&session).await {
                Some(Ok(decision)) => outcome.stranded_undo = Some(decision),
                Some(Err(_)) => outcome.add_warning(OutcomeWarning::StrandedUndoFailed),
                None => {}
            }
        }

        Ok(outcome)
    }

    /// Hold the pendency before the caller sees the approval
    async fn hold_outcome(
        &self,
        session: &Session<'_>,
        outcome: &mut AuthorizationOutcome,
    ) -> TerminalResult<()> {
        let pending = self.resolver.hold(outcome)?;
        if pending.identity.is_degraded() {
            outcome.add_warning(OutcomeWarning::DegradedIdentifier);
        }

        if self.policy == ConfirmationPolicy::Automatic {
            match self
                .resolver
                .resolve_in(session, Resolution::ConfirmedAutomatic)
                .await
            {
                Ok(decision) => outcome.confirmation = Some(decision),
                Err(e) => {
                    // Still held; the operator can retry or undo
                    warn!(order_id = %outcome.order_id, error = %e, "Automatic confirmation failed");
                    outcome.add_warning(OutcomeWarning::AutoConfirmationFailed);
                }
            }
        }
        Ok(())
    }

    /// Probe the device before submitting after an unanswered authorization
    ///
    /// `Ok(Some(outcome))` means the probe itself went unanswered.
    async fn probe_after_timeout(
        &self,
        session: &Session<'_>,
        request: &AuthorizationRequest,
    ) -> TerminalResult<Option<AuthorizationOutcome>> {
        match self.resolver.adopt_reported_in(session).await {
            Ok(Some(pending)) => Err(TerminalError::PendingConfirmationExists {
                blocking_id: pending.display_id(),
            }),
            Ok(None) => {
                self.suspect.store(false, Ordering::Release);
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "Terminal still unresponsive, not submitting");
                let outcome = AuthorizationOutcome::transport_error(
                    &request.order_id,
                    request.amount_minor_units,
                    request.method,
                    e.to_string(),
                );
                self.terminal
                    .record(OperationRecord::outcome(OperationKind::OutcomeReceived, &outcome));
                Ok(Some(outcome))
            }
        }
    }

    fn unanswered(&self, request: &AuthorizationRequest, error: TerminalError) -> AuthorizationOutcome {
        self.suspect.store(true, Ordering::Release);
        warn!(error = %error, "Authorization unanswered; device state unknown");
        let outcome = AuthorizationOutcome::transport_error(
            &request.order_id,
            request.amount_minor_units,
            request.method,
            error.to_string(),
        );
        self.terminal
            .record(OperationRecord::outcome(OperationKind::OutcomeReceived, &outcome));
        outcome
    }
}
