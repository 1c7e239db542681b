// Envelope model and dedupe-id derivation
pub mod envelope;

// Envelope dispatch and handler registry
pub mod dispatch;

// Async processing lane (queue, retry, dedupe, dead letters)
pub mod lane;

// Connector records and stores
pub mod connector;

// Health check result types
pub mod health;

// Built-in envelope handlers
pub mod handlers;

// HTTP APIs
pub mod api;

// Configuration
pub mod config;

pub use envelope::BusEnvelope;
pub use health::{HealthCheckResult, HealthStatus};
