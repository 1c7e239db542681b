//! Driver hub: pluggable external-system drivers for trellis connectors.
//!
//! The hub owns everything between a stored connector and the external
//! system it points at:
//!
//! - [`Driver`] - the contract a plugin implements: a stable key, config
//!   normalization, and an async health probe
//! - [`DriverRegistry`] - immutable key -> driver lookup built at startup
//! - [`validation`] - field-addressed validation for connector writes
//! - [`checker`] - on-demand and scheduled health checks, persisted through
//!   the trellis connector store
//! - [`api`] - the admin HTTP surface
//!
//! Built-in drivers cover the identity providers (OIDC, Entra, SAML, LDAP)
//! plus one push-ingest driver per integration kind.

pub mod api;
pub mod checker;
pub mod driver;
pub mod drivers;
pub mod registry;
pub mod validation;

pub use api::{create_admin_router, DriverHubAppState};
pub use checker::{CheckerError, HealthChecker};
pub use driver::Driver;
pub use drivers::default_drivers;
pub use registry::{DriverRegistry, RegistryError};
pub use validation::{ConfigValidationError, StoreConnectorRequest, WriteMode};
