//! Envelope dispatch - routes validated envelopes to registered handlers.
//!
//! Handler registration is a plain map built at startup, keyed by
//! `(kind, event)` with a `"*"` event wildcard fallback per kind. Dispatch
//! order follows registration order, so fan-out is deterministic and
//! testable. Retry/backoff lives in the lane, never here.

use crate::connector::ConnectorKind;
use crate::envelope::BusEnvelope;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};


/// Event name that matches any event within a kind.
pub const WILDCARD_EVENT: &str = "*";

/// Failure classes a handler can report.
///
/// Transient failures are retried by the lane with backoff; permanent
/// failures dead-letter the envelope immediately.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerError {
    Transient(String),
    Permanent(String),
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Transient(msg) => write!(f, "transient failure: {}", msg),
            HandlerError::Permanent(msg) => write!(f, "permanent failure: {}", msg),
        }
    }
}

impl std::error::Error for HandlerError {}

/// An internal consumer of envelopes.
///
/// Handlers own their downstream timeouts; the lane only bounds the attempt
/// as a whole. A handler must be safe to re-invoke for the same envelope
/// (at-least-once delivery).
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    /// Stable handler name, used in logs and dispatch reports.
    fn name(&self) -> &str;

    async fn handle(&self, envelope: &BusEnvelope) -> Result<(), HandlerError>;
}

/// One registration of a handler for a `(kind, event)` pair.
#[derive(Clone)]
pub struct HandlerRegistration {
    handler: Arc<dyn EnvelopeHandler>,
    /// Critical registrations fail the whole dispatch; best-effort ones
    /// are recorded but do not.
    critical: bool,
}

/// Startup-built routing table for envelope handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    routes: HashMap<(ConnectorKind, String), Vec<HandlerRegistration>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `(kind, event)`; use [`WILDCARD_EVENT`] to
    /// catch every event of a kind that has no specific registration.
    pub fn register(
        &mut self,
        kind: ConnectorKind,
        event: impl Into<String>,
        critical: bool,
        handler: Arc<dyn EnvelopeHandler>,
    ) -> &mut Self {
        self.routes
            .entry((kind, event.into()))
            .or_default()
            .push(HandlerRegistration { handler, critical });
        self
    }

    /// Handlers for `(kind, event)`, falling back to the kind's wildcard
    /// registrations when no exact match exists.
    fn resolve(&self, kind: ConnectorKind, event: &str) -> &[HandlerRegistration] {
        if let Some(exact) = self.routes.get(&(kind, event.to_string())) {
            return exact;
        }
        self.routes
            .get(&(kind, WILDCARD_EVENT.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Outcome of one handler invocation within a dispatch.
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    pub handler: String,
    pub critical: bool,
    pub error: Option<HandlerError>,
}

/// How a failed dispatch should be treated by the lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Transient,
    Permanent,
}

/// Result of fanning one envelope out to its handlers.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub outcomes: Vec<HandlerOutcome>,
}

impl DispatchReport {
    /// Failed iff at least one critical handler failed.
    pub fn failed(&self) -> bool {
        self.failure_class().is_some()
    }

    /// Failure class of the dispatch, if any critical handler failed.
    ///
    /// A transient critical failure wins over a permanent one: a retry can
    /// still fix the transient side, and the permanent handler must be
    /// re-invocation-safe anyway.
    pub fn failure_class(&self) -> Option<FailureClass> {
        let mut class = None;
        for outcome in self.outcomes.iter().filter(|o| o.critical) {
            match outcome.error {
                Some(HandlerError::Transient(_)) => return Some(FailureClass::Transient),
                Some(HandlerError::Permanent(_)) => class = Some(FailureClass::Permanent),
                None => {}
            }
        }
        class
    }

    /// Number of handlers invoked.
    pub fn invoked(&self) -> usize {
        self.outcomes.len()
    }
}

/// Routes envelopes to all handlers registered for their `(kind, event)`.
pub struct Dispatcher {
    registry: HandlerRegistry,
}

impl Dispatcher {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self { registry }
    }

    /// Fans the envelope out to its handlers.
    ///
    /// Handlers run independently in registration order; one handler's
    /// failure never prevents the rest from running. No retry happens here.
    pub async fn dispatch(&self, envelope: &BusEnvelope) -> DispatchReport {
        let registrations = self.registry.resolve(envelope.kind(), envelope.event());

        if registrations.is_empty() {
            warn!(
                kind = %envelope.kind(),
                event = %envelope.event(),
                source = %envelope.source_key(),
                "No handlers registered, envelope dropped as dispatched"
            );
            return DispatchReport { outcomes: Vec::new() };
        }

        let mut outcomes = Vec::with_capacity(registrations.len());
        for registration in registrations {
            let name = registration.handler.name().to_string();
            // Each handler runs on its own task so a panic inside one is
            // contained as a failed outcome instead of unwinding through
            // the dispatch and killing the lane worker.
            let handler = Arc::clone(&registration.handler);
            let task_envelope = envelope.clone();
            let result =
                match tokio::spawn(async move { handler.handle(&task_envelope).await }).await {
                    Ok(result) => result,
                    Err(join_error) => Err(HandlerError::Permanent(format!(
                        "handler aborted unexpectedly: {}",
                        join_error
                    ))),
                };

            match &result {
                Ok(()) => debug!(
                    handler = %name,
                    dedupe_id = %envelope.dedupe_id(),
                    "Handler succeeded"
                ),
                Err(e) => warn!(
                    handler = %name,
                    critical = registration.critical,
                    dedupe_id = %envelope.dedupe_id(),
                    error = %e,
                    "Handler failed"
                ),
            }

            outcomes.push(HandlerOutcome {
                handler: name,
                critical: registration.critical,
                error: result.err(),
            });
        }

        DispatchReport { outcomes }
    }
}
