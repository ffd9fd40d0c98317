//! Shared foundation for the KestrelDB replication mesh — error taxonomy,
//! registration configuration, mesh model types, and the interruptible
//! wait signal used by retry loops.

pub mod config;
pub mod error;
pub mod model;
pub mod shutdown;

pub use config::RegistrationConfig;
pub use error::{ErrorKind, KestrelError, KestrelResult, RegistrationError, StoreError};
pub use model::{
    ExtractionContext, MarkerRow, Node, NodeGroupLinkAction, NodeSecurity, RegistrationRequest,
    RegistrationStatus, Trigger, TriggerRouter,
};
pub use shutdown::InterruptSignal;
