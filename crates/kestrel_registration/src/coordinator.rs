//! Server-side registration handshake.
//!
//! `admit` decides, in order: can this authority serve registrations at
//! all; is the candidate delegated to another authority; does the
//! candidate resolve to an open registration (auto-opening one when
//! allowed); and finally refreshes the node row, queues the initial
//! reload, streams configuration, and closes out the ledger. Opening and
//! re-opening registration are serialized process-wide because the
//! allocate → check → insert sequence is not atomic against the store.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use kestrel_common::config::RegistrationConfig;
use kestrel_common::error::{KestrelError, KestrelResult, RegistrationError};
use kestrel_common::model::{
    unix_millis_now, Node, RegistrationRequest, RegistrationStatus,
};

use crate::extract::ConfigurationExtractor;
use crate::identity::{IdGenerator, PasswordFilter};
use crate::ledger::RequestLedger;
use crate::metrics::RegistrationMetrics;
use crate::redirect::RedirectResolver;
use crate::reload::ReloadInitiator;
use crate::sql;
use crate::store::{NodeStore, SqlTemplate, SqlValue};
use crate::transport::RegistrationTransport;

/// Outcome of one admission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The candidate was admitted and its configuration streamed.
    Admitted,
    /// Registration for this external id is delegated; the caller must
    /// retarget its transport to the URL and restart the handshake there.
    Redirected(String),
    /// Recorded in the ledger for operator approval; the candidate should
    /// retry later.
    Queued,
    /// Refused: the request key was already resolved and the policy does
    /// not allow re-opening it.
    Rejected,
}

/// The registration authority role of one mesh node.
pub struct RegistrationCoordinator {
    config: RegistrationConfig,
    store: Arc<dyn NodeStore>,
    sql: Arc<dyn SqlTemplate>,
    id_generator: Arc<dyn IdGenerator>,
    password_filter: Option<Arc<dyn PasswordFilter>>,
    config_extractor: Arc<dyn ConfigurationExtractor>,
    reload: Arc<ReloadInitiator>,
    ledger: RequestLedger,
    redirects: RedirectResolver,
    metrics: Arc<RegistrationMetrics>,
    /// Serializes `open_registration`/`reopen_registration` process-wide:
    /// at most one identifier allocation may be in flight.
    open_lock: Mutex<()>,
}

impl RegistrationCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RegistrationConfig,
        store: Arc<dyn NodeStore>,
        sql: Arc<dyn SqlTemplate>,
        transport: Arc<dyn RegistrationTransport>,
        id_generator: Arc<dyn IdGenerator>,
        password_filter: Option<Arc<dyn PasswordFilter>>,
        config_extractor: Arc<dyn ConfigurationExtractor>,
        reload: Arc<ReloadInitiator>,
        metrics: Arc<RegistrationMetrics>,
    ) -> Self {
        let ledger = RequestLedger::new(
            sql.clone(),
            store.clone(),
            config.allow_resolved_reupdate,
        );
        let redirects =
            RedirectResolver::new(sql.clone(), transport, config.registration_url.clone());
        Self {
            config,
            store,
            sql,
            id_generator,
            password_filter,
            config_extractor,
            reload,
            ledger,
            redirects,
            metrics,
            open_lock: Mutex::new(()),
        }
    }

    /// Handle one registration attempt from a candidate node observed at
    /// (`remote_host`, `remote_address`).
    ///
    /// `requested_registration` marks an explicit re-registration (the
    /// operator asked for it), which forces a reload even when the node
    /// has loaded before. On `Admitted`, the shared configuration has been
    /// streamed to `out`.
    pub fn admit(
        &self,
        candidate: &Node,
        remote_host: &str,
        remote_address: &str,
        requested_registration: bool,
        out: &mut dyn Write,
    ) -> KestrelResult<Admission> {
        // A node that has not finished its own first load cannot authorize
        // others.
        if !self.config.registration_server {
            let identity = self.store.find_identity()?;
            let security = match &identity {
                Some(me) => self.store.find_node_security(&me.node_id)?,
                None => None,
            };
            if security.and_then(|s| s.initial_load_time).is_none() {
                warn!("registration is not allowed until this node has an initial load");
                self.queue(candidate, remote_host, remote_address)?;
                return Ok(Admission::Queued);
            }
        }

        if let Some(url) = self.redirects.redirection_url_for(&candidate.external_id)? {
            info!(
                external_id = %candidate.external_id,
                url = %url,
                "redirecting candidate for registration",
            );
            self.ledger.save(&RegistrationRequest::for_candidate(
                candidate,
                RegistrationStatus::Redirected,
                remote_host,
                remote_address,
            ))?;
            self.metrics.incr_redirects();
            return Ok(Admission::Redirected(url));
        }

        let mut node_id = self.resolve_node_id(candidate)?;
        let mut node = self.store.find_node(&node_id)?;
        let mut security = self.store.find_node_security(&node_id)?;

        let open = node.is_some()
            && security
                .as_ref()
                .is_some_and(|s| s.registration_enabled);
        if !open {
            if self.config.auto_register {
                self.open_registration(candidate)?;
                node_id = self.resolve_node_id(candidate)?;
                node = self.store.find_node(&node_id)?;
                security = self.store.find_node_security(&node_id)?;
            } else {
                if !self.config.allow_resolved_reupdate {
                    if let Some(status) = self.ledger.resolved_status(
                        &candidate.node_group_id,
                        &candidate.external_id,
                        remote_host,
                        remote_address,
                    )? {
                        warn!(
                            external_id = %candidate.external_id,
                            status = %status,
                            "refusing registration attempt for an already-resolved request",
                        );
                        return Ok(Admission::Rejected);
                    }
                }
                self.queue(candidate, remote_host, remote_address)?;
                return Ok(Admission::Queued);
            }
        }

        let mut node = node.ok_or_else(|| {
            KestrelError::Internal(format!(
                "node row missing after opening registration for {node_id}"
            ))
        })?;
        node.sync_enabled = true;
        node.software_version = candidate.software_version.clone();
        node.sync_url = candidate.sync_url.clone();
        node.database_type = candidate.database_type.clone();
        node.database_version = candidate.database_version.clone();
        self.store.save_node(&node)?;

        if self.config.auto_reload {
            // One automatic load per node lifetime, unless the client is
            // explicitly re-registering.
            let first_load = security
                .as_ref()
                .is_none_or(|s| s.initial_load_time.is_none());
            if first_load || requested_registration {
                self.reload.reload_node(&node.node_id)?;
            }
        }

        self.config_extractor.extract_configuration(&node, out)?;

        self.ledger.save(&RegistrationRequest::for_candidate(
            &node,
            RegistrationStatus::Ok,
            remote_host,
            remote_address,
        ))?;
        self.metrics.incr_nodes_registered(1);
        info!(node_id = %node.node_id, external_id = %node.external_id, "node registered");
        Ok(Admission::Admitted)
    }

    /// Open registration for a candidate known only by group and external
    /// id, as an operator-facing convenience. Returns the allocated node
    /// id.
    pub fn open_registration_for(
        &self,
        node_group_id: &str,
        external_id: &str,
    ) -> KestrelResult<String> {
        self.open_registration(&Node::candidate(node_group_id, external_id))
    }

    /// Allocate a node id and open registration for the candidate.
    ///
    /// Serialized process-wide: identifier allocation must be externally
    /// unique and allocate-then-check-then-insert is not atomic against
    /// the backing store. Requires this authority to have an identity of
    /// its own, unless the candidate *is* this authority's configured
    /// identity (bootstrap). Calling it again for the same candidate
    /// degrades to [`Self::reopen_registration`] semantics.
    pub fn open_registration(&self, candidate: &Node) -> KestrelResult<String> {
        let _guard = self.open_lock.lock();
        self.open_registration_locked(candidate)
    }

    fn open_registration_locked(&self, candidate: &Node) -> KestrelResult<String> {
        let me = self.store.find_identity()?;
        let bootstrap = candidate.external_id == self.config.external_id
            && candidate.node_group_id == self.config.node_group_id;
        if me.is_none() && !bootstrap {
            return Err(RegistrationError::NotConfigured.into());
        }

        let node_id = self.id_generator.generate_node_id(&*self.store, candidate)?;
        if self.store.find_node(&node_id)?.is_some() {
            // Idempotent retry: the node exists, rotate its credentials.
            self.reopen_registration_locked(&node_id)?;
            return Ok(node_id);
        }

        let mut node = candidate.clone();
        node.node_id = node_id.clone();
        node.sync_enabled = false;
        let created_by = me
            .map(|m| m.node_id)
            .unwrap_or_else(|| node_id.clone());
        node.created_at_node_id = Some(created_by.clone());
        self.store.save_node(&node)?;

        // A security row without a node row may have been left behind by a
        // half-finished admission; clear it before inserting ours.
        self.store.delete_node_security(&node_id)?;
        let password =
            self.filter_password(self.id_generator.generate_password(&*self.store, &node));
        self.sql.update(
            sql::INSERT_NODE_SECURITY,
            &[
                SqlValue::from(node_id.as_str()),
                SqlValue::from(password),
                SqlValue::from(created_by),
            ],
        )?;
        self.store.insert_node_group(&node.node_group_id, None)?;
        info!(
            external_id = %node.external_id,
            node_group_id = %node.node_group_id,
            node_id = %node_id,
            "opened registration",
        );
        Ok(node_id)
    }

    /// Rotate a node's password and re-enable its registration, for a node
    /// that lost its credentials. Unknown node ids are logged and
    /// ignored.
    pub fn reopen_registration(&self, node_id: &str) -> KestrelResult<()> {
        let _guard = self.open_lock.lock();
        self.reopen_registration_locked(node_id)
    }

    fn reopen_registration_locked(&self, node_id: &str) -> KestrelResult<()> {
        let Some(node) = self.store.find_node(node_id)? else {
            warn!(node_id, "no node to reopen registration for");
            return Ok(());
        };
        let password =
            self.filter_password(self.id_generator.generate_password(&*self.store, &node));
        let updated = self.sql.update(
            sql::REOPEN_REGISTRATION,
            &[
                SqlValue::from(password.as_str()),
                SqlValue::from(node_id),
            ],
        )?;
        if updated == 0 {
            // A node row without a security row; insert one.
            self.sql.update(
                sql::INSERT_NODE_SECURITY,
                &[
                    SqlValue::from(node_id),
                    SqlValue::from(password),
                    SqlValue::from(node.node_id),
                ],
            )?;
        }
        Ok(())
    }

    /// True iff a node exists for the key and its security row still has
    /// registration enabled.
    pub fn is_registration_open(
        &self,
        node_group_id: &str,
        external_id: &str,
    ) -> KestrelResult<bool> {
        let Some(node) = self
            .store
            .find_node_by_external_id(node_group_id, external_id)?
        else {
            return Ok(false);
        };
        Ok(self
            .store
            .find_node_security(&node.node_id)?
            .is_some_and(|s| s.registration_enabled))
    }

    /// Close out registration for a node once the handshake payload has
    /// been delivered: clears the registration-enabled flag and stamps the
    /// registration time.
    pub fn mark_node_as_registered(&self, node_id: &str) -> KestrelResult<()> {
        let updated = self.sql.update(
            sql::REGISTER_NODE_SECURITY,
            &[
                SqlValue::from(unix_millis_now()),
                SqlValue::from(node_id),
            ],
        )?;
        if updated == 0 {
            warn!(node_id, "no security row to mark as registered");
        }
        Ok(())
    }

    /// Whether unknown candidates are admitted without operator approval.
    pub fn is_auto_registration(&self) -> bool {
        self.config.auto_register
    }

    /// Requests awaiting a decision on this authority.
    pub fn pending_requests(
        &self,
        include_nodes_with_open_registration: bool,
    ) -> KestrelResult<Vec<RegistrationRequest>> {
        self.ledger
            .pending_requests(include_nodes_with_open_registration)
    }

    /// Drop a pending request (operator dismissal). Returns true when a
    /// row was removed.
    pub fn delete_registration_request(
        &self,
        request: &RegistrationRequest,
    ) -> KestrelResult<bool> {
        self.ledger.delete(request)
    }

    /// Delegate registration for an external id to another node.
    pub fn save_registration_redirect(
        &self,
        external_id_to_redirect: &str,
        node_id_to_redirect_to: &str,
    ) -> KestrelResult<()> {
        self.redirects
            .save_registration_redirect(external_id_to_redirect, node_id_to_redirect_to)
    }

    fn resolve_node_id(&self, candidate: &Node) -> KestrelResult<String> {
        if candidate.node_id.is_empty() {
            self.id_generator.select_node_id(&*self.store, candidate)
        } else {
            Ok(candidate.node_id.clone())
        }
    }

    fn queue(&self, candidate: &Node, remote_host: &str, remote_address: &str) -> KestrelResult<()> {
        self.ledger.save(&RegistrationRequest::for_candidate(
            candidate,
            RegistrationStatus::Requested,
            remote_host,
            remote_address,
        ))?;
        self.metrics.incr_queued_requests();
        Ok(())
    }

    fn filter_password(&self, password: String) -> String {
        match &self.password_filter {
            Some(filter) => filter.on_node_security_save(&password),
            None => password,
        }
    }
}
