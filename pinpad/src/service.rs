//! Terminal service facade
//!
//! Built once per process around the one terminal and shared by reference
//! with whatever drives the screen.

use std::sync::Arc;

use shared::payment::{
    AuthorizationOutcome, AuthorizationRequest, CancellationRequest, ConfirmationDecision,
    PendingConfirmation, ReprintResult, Resolution,
};

use crate::bridge::TerminalBridge;
use crate::cancellation::CancellationCoordinator;
use crate::config::TerminalConfig;
use crate::coordinator::TransactionCoordinator;
use crate::error::TerminalResult;
use crate::record::OperationSink;
use crate::reprint::ReceiptReprintService;
use crate::resolver::ConfirmationResolver;
use crate::terminal::Terminal;

#[derive(Debug, Clone)]
pub struct TerminalService {
    terminal: Arc<Terminal>,
    resolver: Arc<ConfirmationResolver>,
    coordinator: Arc<TransactionCoordinator>,
    cancellation: Arc<CancellationCoordinator>,
    reprint: Arc<ReceiptReprintService>,
    config: TerminalConfig,
}

impl TerminalService {
    pub fn new(
        bridge: Arc<dyn TerminalBridge>,
        config: TerminalConfig,
        sink: Arc<dyn OperationSink>,
    ) -> Self {
        let terminal = Arc::new(Terminal::new(bridge, config.deadlines.clone(), sink));
        let resolver = Arc::new(ConfirmationResolver::new(terminal.clone()));
        let coordinator = Arc::new(TransactionCoordinator::new(
            terminal.clone(),
            resolver.clone(),
            config.confirmation_policy,
        ));
        let cancellation = Arc::new(CancellationCoordinator::new(
            terminal.clone(),
            resolver.clone(),
        ));
        let reprint = Arc::new(ReceiptReprintService::new(terminal.clone()));
        Self {
            terminal,
            resolver,
            coordinator,
            cancellation,
            reprint,
            config,
        }
    }

    pub fn config(&self) -> &TerminalConfig {
        &self.config
    }

    pub fn resolver(&self) -> &ConfirmationResolver {
        &self.resolver
    }

    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    pub fn cancellation(&self) -> &CancellationCoordinator {
        &self.cancellation
    }

    pub fn reprint(&self) -> &ReceiptReprintService {
        &self.reprint
    }

    pub async fn authorize(
        &self,
        request: &AuthorizationRequest,
    ) -> TerminalResult<AuthorizationOutcome> {
        self.coordinator.authorize(request).await
    }

    pub async fn resolve(&self, resolution: Resolution) -> TerminalResult<ConfirmationDecision> {
        self.resolver.resolve(resolution).await
    }

    pub async fn auto_resolve(
        &self,
        outcome: &AuthorizationOutcome,
    ) -> TerminalResult<ConfirmationDecision> {
        self.resolver.auto_resolve(outcome).await
    }

    pub fn leave_pending(&self) -> TerminalResult<PendingConfirmation> {
        self.resolver.leave_pending()
    }

    pub async fn recover_from_cold_start(&self) -> TerminalResult<Option<PendingConfirmation>> {
        self.resolver.recover_from_cold_start().await
    }

    pub async fn cancel(&self, request: &CancellationRequest) -> TerminalResult<AuthorizationOutcome> {
        self.cancellation.cancel(request).await
    }

    pub async fn reprint_last(&self) -> TerminalResult<ReprintResult> {
        self.reprint.reprint_last().await
    }

    pub fn pending(&self) -> Option<PendingConfirmation> {
        self.resolver.pending()
    }

    pub fn stranded(&self) -> Option<PendingConfirmation> {
        self.resolver.stranded()
    }

    pub async fn is_device_ready(&self) -> bool {
        self.terminal.is_device_ready().await
    }
}
