//! Wire-transport seam for the registration handshake.
//!
//! The actual framing and HTTP/gRPC plumbing live outside this crate; the
//! registration core only needs a round trip that reports whether the
//! authority processed the registration, and URL resolution for redirect
//! targets.

use kestrel_common::error::KestrelResult;

/// Outcome of one pull-registration round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// The authority admitted this node and streamed registration data.
    Processed,
    /// The authority answered but did not admit this node (queued,
    /// rejected, or nothing to send yet).
    NoData,
}

/// Transport operations consumed by the registration core.
///
/// Unreachable-authority failures must surface as
/// [`kestrel_common::error::RegistrationError::TransportUnreachable`] so the
/// client retry loop can classify them.
pub trait RegistrationTransport: Send + Sync {
    /// Resolve a possibly-relative redirect target against the configured
    /// registration base URL.
    fn resolve_url(&self, url: &str, registration_base: &str) -> String;

    /// Perform one pull-registration round trip against the configured
    /// authority.
    fn pull_registration(&self) -> KestrelResult<PullOutcome>;
}
