//! Confirmation Resolver
//!
//! Owns the single pending-confirmation slot. Two-phase approvals are held
//! here until a confirm / undo round trip succeeds; nothing else may clear
//! the slot.
//!
//! Besides the blocking slot the resolver keeps one *stranded* record: a
//! pendency the operator chose to leave open. It does not block new
//! authorizations but it is never forgotten either. The coordinator undoes
//! it when the next authorization is denied.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use shared::payment::{
    AuthorizationOutcome, ConfirmationDecision, ConfirmationIdentity, PendingConfirmation,
    Resolution,
};
use shared::util::now_millis;

use crate::error::{TerminalError, TerminalResult};
use crate::record::{OperationKind, OperationRecord};
use crate::terminal::{Session, Terminal};

#[derive(Debug, Clone)]
struct Held {
    pending: PendingConfirmation,
    /// Resolution already sent for this pendency, if any
    dispatched: Option<Resolution>,
}

impl Held {
    fn new(pending: PendingConfirmation) -> Self {
        Self {
            pending,
            dispatched: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Blocking,
    Stranded,
}

#[derive(Debug, Default)]
struct ResolverState {
    held: Option<Held>,
    stranded: Option<Held>,
}

impl ResolverState {
    /// Resolution target: the blocking slot first, then the stranded record
    fn target_mut(&mut self) -> Option<(Slot, &mut Held)> {
        if self.held.is_some() {
            return self.held.as_mut().map(|h| (Slot::Blocking, h));
        }
        self.stranded.as_mut().map(|h| (Slot::Stranded, h))
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut Option<Held> {
        match slot {
            Slot::Blocking => &mut self.held,
            Slot::Stranded => &mut self.stranded,
        }
    }
}

/// Confirmation Resolver
#[derive(Debug)]
pub struct ConfirmationResolver {
    terminal: Arc<Terminal>,
    state: Mutex<ResolverState>,
}

impl ConfirmationResolver {
    pub fn new(terminal: Arc<Terminal>) -> Self {
        Self {
            terminal,
            state: Mutex::new(ResolverState::default()),
        }
    }

    /// The pendency blocking new authorizations
    pub fn pending(&self) -> Option<PendingConfirmation> {
        self.state.lock().held.as_ref().map(|h| h.pending.clone())
    }

    /// The pendency left open by the operator
    pub fn stranded(&self) -> Option<PendingConfirmation> {
        self.state.lock().stranded.as_ref().map(|h| h.pending.clone())
    }

    /// Identifier of the blocking pendency, for `PendingConfirmationExists`
    pub fn blocking_id(&self) -> Option<String> {
        self.state
            .lock()
            .held
            .as_ref()
            .map(|h| h.pending.display_id())
    }

    pub(crate) fn blocked(&self) -> TerminalResult<()> {
        match self.blocking_id() {
            Some(blocking_id) => Err(TerminalError::PendingConfirmationExists { blocking_id }),
            None => Ok(()),
        }
    }

    /// Create the pendency for a confirmation-requiring approval
    pub fn hold(&self, outcome: &AuthorizationOutcome) -> TerminalResult<PendingConfirmation> {
        if !outcome.needs_confirmation() {
            return Err(TerminalError::NotConfirmable {
                order_id: outcome.order_id.clone(),
            });
        }

        let pending = PendingConfirmation::from_outcome(outcome);
        {
            let mut state = self.state.lock();
            if let Some(held) = &state.held {
                return Err(TerminalError::AlreadyHeld {
                    held_id: held.pending.display_id(),
                });
            }
            state.held = Some(Held::new(pending.clone()));
        }

        if pending.identity.is_degraded() {
            warn!(
                order_id = %outcome.order_id,
                identity = %pending.identity,
                "Approval requires confirmation but the terminal sent no confirmation id"
            );
        }
        info!(order_id = %outcome.order_id, identity = %pending.identity, "Pendency held");
        self.terminal
            .record(OperationRecord::pendency(OperationKind::PendencyCreated, &pending));
        Ok(pending)
    }

    /// Send a confirm / undo decision for the outstanding pendency
    ///
    /// The slot is cleared only when the terminal acknowledges. Retry freely
    /// on error, with the same resolution.
    pub async fn resolve(&self, resolution: Resolution) -> TerminalResult<ConfirmationDecision> {
        let session = self.terminal.session().await;
        self.resolve_in(&session, resolution).await
    }

    /// Hold (if not yet held) and confirm right away
    pub async fn auto_resolve(
        &self,
        outcome: &AuthorizationOutcome,
    ) -> TerminalResult<ConfirmationDecision> {
        let session = self.terminal.session().await;
        self.auto_resolve_in(&session, outcome).await
    }

    pub(crate) async fn auto_resolve_in(
        &self,
        session: &Session<'_>,
        outcome: &AuthorizationOutcome,
    ) -> TerminalResult<ConfirmationDecision> {
        let already_held = {
            let state = self.state.lock();
            state.held.as_ref().is_some_and(|h| {
                h.pending.order_id.as_deref() == Some(outcome.order_id.as_str())
            })
        };
        if !already_held {
            self.hold(outcome)?;
        }
        self.resolve_in(session, Resolution::ConfirmedAutomatic).await
    }

    #[instrument(skip(self, session))]
    pub(crate) async fn resolve_in(
        &self,
        session: &Session<'_>,
        resolution: Resolution,
    ) -> TerminalResult<ConfirmationDecision> {
        let (slot, pending) = {
            let mut state = self.state.lock();
            let Some((slot, held)) = state.target_mut() else {
                return Err(TerminalError::NothingPending);
            };
            if let Some(dispatched) = held.dispatched {
                if dispatched != resolution {
                    return Err(TerminalError::ConflictingResolution {
                        id: held.pending.display_id(),
                        dispatched,
                        requested: resolution,
                    });
                }
            }
            held.dispatched = Some(resolution);
            (slot, held.pending.clone())
        };

        let result = session
            .resolve_pendency(pending.identity.key(), resolution)
            .await;

        match result {
            Ok(()) => {
                {
                    let mut state = self.state.lock();
                    let entry = state.slot_mut(slot);
                    if entry
                        .as_ref()
                        .is_some_and(|h| h.pending.identity == pending.identity)
                    {
                        *entry = None;
                    }
                }
                info!(identity = %pending.identity, %resolution, "Pendency resolved");
                self.terminal.record(
                    OperationRecord::pendency(OperationKind::PendencyResolved, &pending)
                        .with_resolution(resolution),
                );
                Ok(ConfirmationDecision {
                    identity: pending.identity,
                    resolution,
                    order_id: pending.order_id,
                    decided_at: now_millis(),
                })
            }
            Err(e) => {
                // A refusal means the decision was not taken; a transport
                // failure may have been, so it stays dispatched.
                if matches!(e, TerminalError::Rejected { .. }) {
                    let mut state = self.state.lock();
                    if let Some(held) = state.slot_mut(slot).as_mut() {
                        held.dispatched = None;
                    }
                }
                warn!(identity = %pending.identity, %resolution, error = %e, "Pendency resolution failed");
                self.terminal.record(
                    OperationRecord::pendency(OperationKind::PendencyResolutionFailed, &pending)
                        .with_resolution(resolution)
                        .with_detail(e.to_string()),
                );
                Err(e)
            }
        }
    }

    /// Ask the terminal for a pendency left by a previous run
    ///
    /// Returns the pendency iff the terminal reports one. A stranded record
    /// naming the same transaction moves back into the blocking slot.
    ///
    /// The blocking slot is never replaced: a report matching the held
    /// pendency returns it (with the terminal's confirmation id when the
    /// hold only had a fallback), a different one fails with `AlreadyHeld`.
    pub async fn recover_from_cold_start(&self) -> TerminalResult<Option<PendingConfirmation>> {
        let session = self.terminal.session().await;
        let probe = session.query_pendency().await?;
        if !probe.exists {
            info!("No pendency on the terminal");
            return Ok(None);
        }

        let reported = PendingConfirmation::from_probe(&probe);
        let pending = {
            let mut state = self.state.lock();
            if let Some(held) = state.held.as_mut() {
                if !same_transaction(&held.pending, &reported) {
                    warn!(
                        held = %held.pending.identity,
                        reported = %reported.identity,
                        "Terminal reports a different pendency than the one held"
                    );
                    return Err(TerminalError::AlreadyHeld {
                        held_id: held.pending.display_id(),
                    });
                }
                if held.pending.identity.is_degraded() && !reported.identity.is_degraded() {
                    info!(
                        from = %held.pending.identity,
                        to = %reported.identity,
                        "Held pendency identified by the terminal"
                    );
                    held.pending.identity = reported.identity;
                    if held.pending.nsu.is_none() {
                        held.pending.nsu = reported.nsu;
                    }
                }
                return Ok(Some(held.pending.clone()));
            }
            let pending = match state.stranded.take() {
                Some(stranded) if same_transaction(&stranded.pending, &reported) => {
                    stranded.pending
                }
                other => {
                    state.stranded = other;
                    reported
                }
            };
            state.held = Some(Held::new(pending.clone()));
            pending
        };

        warn!(identity = %pending.identity, "Recovered pendency from the terminal");
        self.terminal
            .record(OperationRecord::pendency(OperationKind::PendencyRecovered, &pending));
        Ok(Some(pending))
    }

    /// Probe after a lost reply; adopts a pendency the terminal holds unless
    /// it is the stranded one
    pub(crate) async fn adopt_reported_in(
        &self,
        session: &Session<'_>,
    ) -> TerminalResult<Option<PendingConfirmation>> {
        let probe = session.query_pendency().await?;
        if !probe.exists {
            return Ok(None);
        }
        let reported = PendingConfirmation::from_probe(&probe);
        {
            let mut state = self.state.lock();
            if state
                .stranded
                .as_ref()
                .is_some_and(|s| same_transaction(&s.pending, &reported))
            {
                return Ok(None);
            }
            if state.held.is_none() {
                state.held = Some(Held::new(reported.clone()));
            }
        }
        warn!(identity = %reported.identity, "Terminal holds a pendency from an unanswered authorization");
        self.terminal
            .record(OperationRecord::pendency(OperationKind::PendencyRecovered, &reported));
        Ok(Some(reported))
    }

    /// Park the blocking pendency so the next authorization can run
    pub fn leave_pending(&self) -> TerminalResult<PendingConfirmation> {
        let pending = {
            let mut state = self.state.lock();
            if let Some(stranded) = &state.stranded {
                return Err(TerminalError::StrandedPendencyExists {
                    stranded_id: stranded.pending.display_id(),
                });
            }
            let held = state.held.take().ok_or(TerminalError::NothingPending)?;
            let pending = held.pending.clone();
            state.stranded = Some(held);
            pending
        };
        info!(identity = %pending.identity, "Pendency left open by the operator");
        self.terminal
            .record(OperationRecord::pendency(OperationKind::PendencyStranded, &pending));
        Ok(pending)
    }

    /// Undo the stranded pendency, if there is one
    ///
    /// Without a captured identity the undo is sent by intent alone.
    pub(crate) async fn undo_stranded_in(
        &self,
        session: &Session<'_>,
    ) -> Option<TerminalResult<ConfirmationDecision>> {
        let pending = self.stranded()?;
        let resolution = Resolution::UndoneManual;
        let result = session
            .resolve_pendency(pending.identity.key(), resolution)
            .await;

        Some(match result {
            Ok(()) => {
                {
                    let mut state = self.state.lock();
                    if state
                        .stranded
                        .as_ref()
                        .is_some_and(|s| s.pending.identity == pending.identity)
                    {
                        state.stranded = None;
                    }
                }
                info!(identity = %pending.identity, "Stranded pendency undone");
                self.terminal.record(
                    OperationRecord::pendency(OperationKind::PendencyResolved, &pending)
                        .with_resolution(resolution)
                        .with_detail("automatic undo after denial"),
                );
                Ok(ConfirmationDecision {
                    identity: pending.identity,
                    resolution,
                    order_id: pending.order_id,
                    decided_at: now_millis(),
                })
            }
            Err(e) => {
                warn!(identity = %pending.identity, error = %e, "Could not undo stranded pendency");
                self.terminal.record(
                    OperationRecord::pendency(OperationKind::PendencyResolutionFailed, &pending)
                        .with_resolution(resolution)
                        .with_detail(e.to_string()),
                );
                Err(e)
            }
        })
    }
}

/// An unidentified local record matches whatever the terminal reports
fn same_transaction(local: &PendingConfirmation, reported: &PendingConfirmation) -> bool {
    match (&local.identity, &reported.identity) {
        (ConfirmationIdentity::Unknown, _) => true,
        (a, b) if a == b => true,
        _ => match (&local.nsu, &reported.nsu) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Deadlines;
    use crate::record::MemorySink;
    use crate::simulator::{ResolveScript, SimulatedTerminal};
    use shared::payment::{OutcomeStatus, PaymentMethod, PendencyProbe};

    fn approved(order_id: &str, confirmation_id: Option<&str>, nsu: Option<&str>) -> AuthorizationOutcome {
        let mut outcome =
            AuthorizationOutcome::transport_error(order_id, 1000, PaymentMethod::Credit, "");
        outcome.status = OutcomeStatus::Approved;
        outcome.reason = None;
        outcome.requires_confirmation = true;
        outcome.confirmation_id = confirmation_id.map(str::to_string);
        outcome.nsu = nsu.map(str::to_string);
        outcome
    }

    fn setup() -> (Arc<SimulatedTerminal>, Arc<MemorySink>, ConfirmationResolver) {
        let sim = Arc::new(SimulatedTerminal::new());
        let sink = Arc::new(MemorySink::new());
        let terminal = Arc::new(Terminal::new(
            sim.clone(),
            Deadlines::uniform(1_000),
            sink.clone(),
        ));
        (sim, sink, ConfirmationResolver::new(terminal))
    }

    #[tokio::test]
    async fn test_hold_rejects_second_pendency() {
        let (_sim, _sink, resolver) = setup();
        resolver.hold(&approved("a", Some("X1"), None)).unwrap();

        let err = resolver.hold(&approved("b", Some("X2"), None)).unwrap_err();
        assert_eq!(
            err,
            TerminalError::AlreadyHeld {
                held_id: "X1".to_string()
            }
        );
        assert_eq!(resolver.blocking_id().as_deref(), Some("X1"));
    }

    #[tokio::test]
    async fn test_hold_rejects_plain_outcome() {
        let (_sim, _sink, resolver) = setup();
        let mut outcome = approved("a", Some("X1"), None);
        outcome.requires_confirmation = false;
        assert!(matches!(
            resolver.hold(&outcome),
            Err(TerminalError::NotConfirmable { .. })
        ));
        assert!(resolver.pending().is_none());
    }

    #[tokio::test]
    async fn test_resolve_clears_slot_and_records() {
        let (sim, sink, resolver) = setup();
        sim.set_device_pendency(Some("X1"), None);
        resolver.hold(&approved("a", Some("X1"), None)).unwrap();

        let decision = resolver.resolve(Resolution::ConfirmedManual).await.unwrap();
        assert_eq!(decision.identity.key(), Some("X1"));
        assert_eq!(decision.order_id.as_deref(), Some("a"));
        assert!(resolver.pending().is_none());
        assert_eq!(
            sink.kinds(),
            vec![OperationKind::PendencyCreated, OperationKind::PendencyResolved]
        );
    }

    #[tokio::test]
    async fn test_resolve_with_nothing_pending() {
        let (_sim, _sink, resolver) = setup();
        assert_eq!(
            resolver.resolve(Resolution::ConfirmedManual).await.unwrap_err(),
            TerminalError::NothingPending
        );
    }

    #[tokio::test]
    async fn test_nsu_fallback_identity() {
        let (sim, _sink, resolver) = setup();
        sim.set_device_pendency(None, Some("000777"));
        let pending = resolver.hold(&approved("a", None, Some("000777"))).unwrap();
        assert_eq!(pending.identity, ConfirmationIdentity::Nsu("000777".to_string()));

        resolver.resolve(Resolution::ConfirmedManual).await.unwrap();
        assert!(resolver.pending().is_none());
        assert_eq!(
            sim.decisions(),
            vec![(Some("000777".to_string()), Resolution::ConfirmedManual)]
        );
    }

    #[tokio::test]
    async fn test_rejected_resolution_keeps_slot_and_allows_other_intent() {
        let (sim, _sink, resolver) = setup();
        // terminal holds a different transaction
        sim.set_device_pendency(Some("OTHER"), None);
        resolver.hold(&approved("a", Some("X1"), None)).unwrap();

        let err = resolver.resolve(Resolution::ConfirmedManual).await.unwrap_err();
        assert!(matches!(err, TerminalError::Rejected { .. }));
        assert_eq!(resolver.blocking_id().as_deref(), Some("X1"));

        // the refusal did not count as a dispatched decision
        let err = resolver.resolve(Resolution::UndoneManual).await.unwrap_err();
        assert!(matches!(err, TerminalError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_leave_pending_moves_to_stranded() {
        let (_sim, sink, resolver) = setup();
        resolver.hold(&approved("a", Some("P33"), None)).unwrap();

        let left = resolver.leave_pending().unwrap();
        assert_eq!(left.display_id(), "P33");
        assert!(resolver.pending().is_none());
        assert_eq!(resolver.stranded().unwrap().display_id(), "P33");
        assert_eq!(sink.kinds().last(), Some(&OperationKind::PendencyStranded));

        resolver.hold(&approved("b", Some("P34"), None)).unwrap();
        assert!(matches!(
            resolver.leave_pending(),
            Err(TerminalError::StrandedPendencyExists { .. })
        ));
        assert!(matches!(
            setup().2.leave_pending(),
            Err(TerminalError::NothingPending)
        ));
    }

    #[tokio::test]
    async fn test_resolve_targets_stranded_when_slot_empty() {
        let (sim, _sink, resolver) = setup();
        sim.set_device_pendency(Some("P33"), None);
        resolver.hold(&approved("a", Some("P33"), None)).unwrap();
        resolver.leave_pending().unwrap();

        let decision = resolver.resolve(Resolution::UndoneManual).await.unwrap();
        assert_eq!(decision.identity.key(), Some("P33"));
        assert!(resolver.stranded().is_none());
    }

    #[tokio::test]
    async fn test_cold_start_recovery() {
        let (sim, sink, resolver) = setup();
        assert!(resolver.recover_from_cold_start().await.unwrap().is_none());

        sim.set_device_pendency(Some("R9"), Some("000009"));
        let recovered = resolver.recover_from_cold_start().await.unwrap().unwrap();
        assert!(recovered.recovered);
        assert_eq!(recovered.display_id(), "R9");
        assert_eq!(resolver.blocking_id().as_deref(), Some("R9"));
        assert_eq!(sink.kinds(), vec![OperationKind::PendencyRecovered]);

        // asking again reports the same pendency without a second record
        let again = resolver.recover_from_cold_start().await.unwrap().unwrap();
        assert_eq!(again.identity, recovered.identity);
        assert_eq!(sink.kinds().len(), 1);
    }

    #[tokio::test]
    async fn test_cold_start_reclaims_stranded_record() {
        let (sim, _sink, resolver) = setup();
        resolver.hold(&approved("order-a", Some("P33"), None)).unwrap();
        resolver.leave_pending().unwrap();

        sim.set_device_pendency(Some("P33"), None);
        let recovered = resolver.recover_from_cold_start().await.unwrap().unwrap();
        // the in-process record keeps its order id
        assert_eq!(recovered.order_id.as_deref(), Some("order-a"));
        assert!(resolver.stranded().is_none());
        assert_eq!(resolver.blocking_id().as_deref(), Some("P33"));
    }

    #[tokio::test]
    async fn test_cold_start_never_replaces_held_pendency() {
        let (sim, sink, resolver) = setup();
        resolver.hold(&approved("order-a", Some("X1"), None)).unwrap();

        sim.set_device_pendency(Some("Y9"), Some("000099"));
        let err = resolver.recover_from_cold_start().await.unwrap_err();
        assert_eq!(
            err,
            TerminalError::AlreadyHeld {
                held_id: "X1".to_string()
            }
        );

        let held = resolver.pending().unwrap();
        assert_eq!(held.display_id(), "X1");
        assert_eq!(held.order_id.as_deref(), Some("order-a"));
        assert!(resolver.stranded().is_none());
        assert_eq!(sink.kinds(), vec![OperationKind::PendencyCreated]);
    }

    #[tokio::test]
    async fn test_cold_start_upgrades_nsu_hold_to_confirmation_id() {
        let (sim, sink, resolver) = setup();
        resolver.hold(&approved("order-a", None, Some("000042"))).unwrap();
        sim.push_resolve(ResolveScript::Drop);
        assert!(matches!(
            resolver.resolve(Resolution::ConfirmedManual).await,
            Err(TerminalError::Transport { .. })
        ));

        sim.set_device_pendency(Some("C42"), Some("000042"));
        let recovered = resolver.recover_from_cold_start().await.unwrap().unwrap();
        assert_eq!(recovered.display_id(), "C42");
        assert_eq!(recovered.order_id.as_deref(), Some("order-a"));
        assert!(!recovered.recovered);
        assert_eq!(resolver.blocking_id().as_deref(), Some("C42"));

        // the decision already sent still binds retries
        assert!(matches!(
            resolver.resolve(Resolution::UndoneManual).await,
            Err(TerminalError::ConflictingResolution { .. })
        ));
        assert!(!sink.kinds().contains(&OperationKind::PendencyRecovered));
    }

    #[test]
    fn test_same_transaction() {
        let by_id = |id: &str| PendingConfirmation::from_probe(&PendencyProbe {
            exists: true,
            confirmation_id: Some(id.to_string()),
            fallback_nsu: None,
        });
        let unknown = PendingConfirmation::from_probe(&PendencyProbe {
            exists: true,
            confirmation_id: None,
            fallback_nsu: None,
        });
        assert!(same_transaction(&by_id("A"), &by_id("A")));
        assert!(!same_transaction(&by_id("A"), &by_id("B")));
        assert!(same_transaction(&unknown, &by_id("B")));
    }
}
