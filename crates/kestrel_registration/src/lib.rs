//! Node admission and initial synchronization for the KestrelDB
//! replication mesh.
//!
//! A joining node acquires a durable identity, is authorized by a
//! (possibly delegated) registration authority, and receives a snapshot of
//! the shared configuration plus an optional full data reload before it
//! participates in ongoing change propagation.
//!
//! Server side: [`coordinator::RegistrationCoordinator`] decides
//! admit / redirect / queue / reject, opens and reopens node security, and
//! triggers the initial reload. Client side:
//! [`client::RegistrationClient`] retries the pull-registration round trip
//! with jittered back-off until it succeeds or exhausts its budget. The
//! reload path is split between [`reload::ReloadInitiator`] (enqueues
//! per-trigger reload markers) and
//! [`extract::InitialLoadStreamExtractor`] (streams the dataset behind a
//! marker inside an open extraction batch).

pub mod client;
pub mod coordinator;
pub mod extract;
pub mod identity;
pub mod ledger;
pub mod metrics;
pub mod redirect;
pub mod reload;
mod sql;
pub mod store;
pub mod timeslot;
pub mod transport;

#[cfg(test)]
mod testutil;

pub use client::RegistrationClient;
pub use coordinator::{Admission, RegistrationCoordinator};
pub use extract::{ConfigurationExtractor, InitialLoadExtractor, InitialLoadStreamExtractor};
pub use identity::{DefaultIdGenerator, IdGenerator, PasswordFilter};
pub use ledger::RequestLedger;
pub use metrics::{RegistrationMetrics, RegistrationMetricsSnapshot};
pub use redirect::RedirectResolver;
pub use reload::ReloadInitiator;
pub use store::{NodeStore, SqlRow, SqlTemplate, SqlTransaction, SqlValue, TriggerRouterSource};
pub use timeslot::RandomTimeSlot;
pub use transport::{PullOutcome, RegistrationTransport};
