//! Concrete driver implementations.

mod ldap;
mod oidc;
mod push;
mod saml;

pub use ldap::LdapDriver;
pub use oidc::OidcDriver;
pub use push::PushIngestDriver;
pub use saml::SamlDriver;

use crate::Driver;
use std::sync::Arc;
use std::time::Duration;
use trellis::connector::ConnectorKind;

/// Probe timeout every driver applies to its own outbound calls.
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// The full enumerated driver set: identity providers plus one push-ingest
/// driver per integration kind.
pub fn default_drivers() -> Vec<Arc<dyn Driver>> {
    let mut drivers: Vec<Arc<dyn Driver>> = vec![
        Arc::new(OidcDriver::standard()),
        Arc::new(OidcDriver::entra()),
        Arc::new(SamlDriver::new()),
        Arc::new(LdapDriver::new()),
    ];
    for kind in ConnectorKind::ALL {
        if !kind.is_auth() {
            drivers.push(Arc::new(PushIngestDriver::new(*kind)));
        }
    }
    drivers
}
