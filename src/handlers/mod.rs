//! Built-in envelope handlers.
//!
//! Domain handlers (asset inventory writes, incident sync) live with their
//! owning services; the core ships the audit trail handler that every kind
//! registers as a best-effort wildcard consumer.

use crate::dispatch::{EnvelopeHandler, HandlerError};
use crate::envelope::BusEnvelope;
use async_trait::async_trait;
use tracing::info;

/// Emits one structured audit line per dispatched envelope.
///
/// Durable audit storage is an external collaborator; this handler feeds it
/// through the log pipeline and never fails.
#[derive(Default)]
pub struct AuditTrailHandler;

impl AuditTrailHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EnvelopeHandler for AuditTrailHandler {
    fn name(&self) -> &str {
        "audit-trail"
    }

    async fn handle(&self, envelope: &BusEnvelope) -> Result<(), HandlerError> {
        info!(
            target: "trellis::audit",
            kind = %envelope.kind(),
            event = %envelope.event(),
            source = %envelope.source_key(),
            dedupe_id = %envelope.dedupe_id(),
            received_at = %envelope.received_at().to_rfc3339(),
            "Envelope dispatched"
        );
        Ok(())
    }
}
