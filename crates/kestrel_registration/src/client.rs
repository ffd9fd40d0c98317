//! Client-side registration: the join retry loop.
//!
//! An unregistered node repeatedly pulls registration data from its
//! configured authority. Transport failures and redirect churn are
//! expected during a rollout, so every attempt failure is consumed and
//! retried under a jittered back-off; the loop only fails once the
//! configured attempt budget is exhausted. The back-off slot is derived
//! from this node's external id (see [`crate::timeslot`]), and the sleep
//! itself is interruptible.

use std::sync::Arc;

use tracing::{error, info, warn};

use kestrel_common::config::RegistrationConfig;
use kestrel_common::error::{KestrelResult, RegistrationError};
use kestrel_common::shutdown::InterruptSignal;

use crate::metrics::RegistrationMetrics;
use crate::reload::ReloadInitiator;
use crate::store::NodeStore;
use crate::timeslot::RandomTimeSlot;
use crate::transport::{PullOutcome, RegistrationTransport};

/// The joining-node role of one mesh node.
pub struct RegistrationClient {
    config: RegistrationConfig,
    store: Arc<dyn NodeStore>,
    transport: Arc<dyn RegistrationTransport>,
    reload: Arc<ReloadInitiator>,
    timeslot: RandomTimeSlot,
    interrupt: InterruptSignal,
    metrics: Arc<RegistrationMetrics>,
}

impl RegistrationClient {
    pub fn new(
        config: RegistrationConfig,
        store: Arc<dyn NodeStore>,
        transport: Arc<dyn RegistrationTransport>,
        reload: Arc<ReloadInitiator>,
        metrics: Arc<RegistrationMetrics>,
    ) -> Self {
        let timeslot = RandomTimeSlot::new(config.external_id.clone(), config.time_slot_count);
        Self {
            config,
            store,
            transport,
            reload,
            timeslot,
            interrupt: InterruptSignal::new(),
            metrics,
        }
    }

    /// A handle for aborting the back-off sleep early (shutdown). The
    /// interrupt only cuts the current wait short; it does not fail the
    /// loop.
    pub fn interrupt_signal(&self) -> InterruptSignal {
        self.interrupt.clone()
    }

    /// True once this node holds a local identity row.
    pub fn is_registered(&self) -> KestrelResult<bool> {
        Ok(self.store.find_identity()?.is_some())
    }

    /// Register this node with its configured authority, retrying with
    /// jittered back-off until registered or the attempt budget
    /// (`max_registration_attempts`, negative = unlimited) runs out.
    pub fn join(&self) -> KestrelResult<()> {
        let mut registered = self.is_registered()?;
        let mut remaining = self.config.max_registration_attempts;
        let mut attempt: u64 = 0;

        while !registered && remaining != 0 {
            registered = self.attempt_pull();
            remaining -= 1;

            if !registered && remaining != 0 {
                // A concurrent or background process may have completed
                // registration while this attempt was in flight.
                registered = self.is_registered()?;
            }

            if registered {
                match self.store.find_identity()? {
                    Some(node) => {
                        info!(node_id = %node.node_id, "successfully registered node");
                        self.reload.send_initial_load_from_registered_node()?;
                    }
                    None => {
                        error!(
                            "node identity is missing after registration; the registration \
                             server may be misconfigured or have an error"
                        );
                        registered = false;
                    }
                }
            }

            if !registered && remaining != 0 {
                self.sleep_before_retry(attempt);
                attempt += 1;
            }
        }

        if registered {
            Ok(())
        } else {
            Err(RegistrationError::RegistrationFailed {
                attempts: self.config.max_registration_attempts,
            }
            .into())
        }
    }

    /// One pull-registration round trip. Never propagates attempt
    /// failures: transport-unreachable is warn-logged, everything else is
    /// error-logged, and both count as a consumed attempt.
    fn attempt_pull(&self) -> bool {
        info!("unregistered node is attempting to register");
        self.metrics.incr_join_attempts();
        match self.transport.pull_registration() {
            Ok(PullOutcome::Processed) => true,
            Ok(PullOutcome::NoData) => false,
            Err(e) if e.is_transient() => {
                warn!(error = %e, "connection failed while registering");
                false
            }
            Err(e) => {
                error!(error = %e, "registration attempt failed");
                false
            }
        }
    }

    fn sleep_before_retry(&self, attempt: u64) {
        let backoff = self.timeslot.duration_for_attempt(attempt);
        warn!(
            sleep_ms = backoff.as_millis() as u64,
            "could not register; sleeping before the next attempt",
        );
        if self.interrupt.wait_timeout(backoff) {
            info!("registration back-off interrupted");
        }
    }
}
