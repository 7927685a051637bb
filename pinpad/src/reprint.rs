//! Receipt Reprint Service

use std::sync::Arc;

use tracing::debug;

use shared::payment::ReprintResult;

use crate::error::TerminalResult;
use crate::terminal::Terminal;

/// Reads the receipts of the last transaction; never touches the
/// pendency slot
#[derive(Debug)]
pub struct ReceiptReprintService {
    terminal: Arc<Terminal>,
}

impl ReceiptReprintService {
    pub fn new(terminal: Arc<Terminal>) -> Self {
        Self { terminal }
    }

    pub async fn reprint_last(&self) -> TerminalResult<ReprintResult> {
        let session = self.terminal.session().await;
        let result = match session.reprint_last().await? {
            Some(receipts) => ReprintResult::Receipts(receipts),
            None => ReprintResult::NothingToReprint,
        };
        debug!(?result, "Reprint");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Deadlines;
    use crate::record::NullSink;
    use crate::simulator::SimulatedTerminal;
    use shared::payment::ReceiptPair;

    #[tokio::test]
    async fn test_nothing_to_reprint() {
        let sim = Arc::new(SimulatedTerminal::new());
        let terminal = Arc::new(Terminal::new(sim, Deadlines::default(), Arc::new(NullSink)));
        let service = ReceiptReprintService::new(terminal);
        assert_eq!(
            service.reprint_last().await.unwrap(),
            ReprintResult::NothingToReprint
        );
    }

    #[tokio::test]
    async fn test_last_receipts() {
        let sim = Arc::new(SimulatedTerminal::new());
        sim.set_last_receipts(Some(ReceiptPair {
            customer_receipt: "VIA CLIENTE".to_string(),
            merchant_receipt: "VIA ESTABELECIMENTO".to_string(),
        }));
        let terminal = Arc::new(Terminal::new(sim, Deadlines::default(), Arc::new(NullSink)));
        let service = ReceiptReprintService::new(terminal);

        match service.reprint_last().await.unwrap() {
            ReprintResult::Receipts(pair) => assert_eq!(pair.customer_receipt, "VIA CLIENTE"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
