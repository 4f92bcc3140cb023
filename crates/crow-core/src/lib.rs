//! Shared data model and error taxonomy for the Crow RPC fabric.
//!
//! `crow-core` has no opinion about the wire format or the transport; it
//! only defines the value types every other crate in the workspace agrees
//! on (descriptors, endpoints, attributes, timestamps) and the registrar
//! directory source abstraction (static list or a URL to fetch).

mod error;
mod model;
pub mod registrar_source;

pub use error::{CrowError, CrowResult};
pub use model::{AttrValue, Attributes, RegistrarEndpoint, ServiceDescriptor, ServiceEndpoint};
pub use registrar_source::{RegistrarSource, StaticRegistrarSource, UrlRegistrarSource};

/// Wall-clock instant used for lease expiry timestamps. Aliased so every
/// crate agrees on the concrete timezone-aware type without importing
/// `chrono` directly.
pub type Instant = chrono::DateTime<chrono::Utc>;

/// Returns the current wall-clock instant.
pub fn now() -> Instant {
    chrono::Utc::now()
}
