//! Cancellation Coordinator
//!
//! Reverses a settled transaction identified by the caller. History of
//! approved transactions is the caller's business.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use shared::payment::{AuthorizationOutcome, CancellationRequest, OutcomeWarning, Resolution};

use crate::classify::classify_cancellation;
use crate::error::TerminalResult;
use crate::record::{OperationKind, OperationRecord};
use crate::resolver::ConfirmationResolver;
use crate::terminal::{Session, Terminal};

/// Cancellation Coordinator
#[derive(Debug)]
pub struct CancellationCoordinator {
    terminal: Arc<Terminal>,
    resolver: Arc<ConfirmationResolver>,
}

impl CancellationCoordinator {
    pub fn new(terminal: Arc<Terminal>, resolver: Arc<ConfirmationResolver>) -> Self {
        Self { terminal, resolver }
    }

    /// Reverse one settled transaction
    ///
    /// A refused reversal is `Ok` with a denied outcome; only transport
    /// failures are errors, and those are safe to retry.
    #[instrument(skip_all, fields(order_id = %request.order_id, nsu = %request.nsu))]
    pub async fn cancel(&self, request: &CancellationRequest) -> TerminalResult<AuthorizationOutcome> {
        // The terminal takes no new work while a pendency is open
        self.resolver.blocked()?;
        let session = self.terminal.session().await;
        self.resolver.blocked()?;

        self.terminal.record(OperationRecord::cancellation(request));
        let reply = session.cancel_settled(request).await?;

        let mut outcome = classify_cancellation(request, reply);
        self.terminal
            .record(OperationRecord::outcome(OperationKind::CancellationResult, &outcome));
        info!(summary = %outcome.summary(), "Cancellation finished");

        // Some hosts capture reversals in two phases as well
        if outcome.needs_confirmation() {
            self.confirm_reversal(&session, &mut outcome).await;
        }
        Ok(outcome)
    }

    /// The host already approved the reversal; a failed confirmation leaves
    /// the pendency held and shows up as a warning on the outcome.
    async fn confirm_reversal(&self, session: &Session<'_>, outcome: &mut AuthorizationOutcome) {
        let pending = match self.resolver.hold(outcome) {
            Ok(pending) => pending,
            Err(e) => {
                warn!(order_id = %outcome.order_id, error = %e, "Could not hold reversal pendency");
                outcome.add_warning(OutcomeWarning::AutoConfirmationFailed);
                return;
            }
        };
        if pending.identity.is_degraded() {
            outcome.add_warning(OutcomeWarning::DegradedIdentifier);
        }

        match self
            .resolver
            .resolve_in(session, Resolution::ConfirmedAutomatic)
            .await
        {
            Ok(decision) => outcome.confirmation = Some(decision),
            Err(e) => {
                warn!(order_id = %outcome.order_id, error = %e, "Reversal confirmation failed");
                outcome.add_warning(OutcomeWarning::AutoConfirmationFailed);
            }
        }
    }
}
