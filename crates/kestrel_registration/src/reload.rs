//! Initial-load (reload) enqueueing.
//!
//! A reload is delivered as marker rows in the change stream: one marker
//! per trigger-router binding for the target node, consumed later by the
//! extraction pipeline (see [`crate::extract`]). This module only enqueues
//! the markers; commit granularity is configurable — one commit per node
//! (all markers become visible atomically) or one commit per marker
//! (a crash can leave a strict prefix visible).

use std::sync::Arc;

use tracing::{info, warn};

use kestrel_common::config::RegistrationConfig;
use kestrel_common::error::{KestrelResult, RegistrationError};
use kestrel_common::model::{unix_millis_now, Node, NodeGroupLinkAction, TriggerRouter};

use crate::sql;
use crate::store::{NodeStore, SqlTemplate, SqlTransaction, SqlValue, TriggerRouterSource};

/// Enqueues per-trigger reload events for target nodes.
pub struct ReloadInitiator {
    config: RegistrationConfig,
    sql: Arc<dyn SqlTemplate>,
    store: Arc<dyn NodeStore>,
    routers: Arc<dyn TriggerRouterSource>,
}

impl ReloadInitiator {
    pub fn new(
        config: RegistrationConfig,
        sql: Arc<dyn SqlTemplate>,
        store: Arc<dyn NodeStore>,
        routers: Arc<dyn TriggerRouterSource>,
    ) -> Self {
        Self {
            config,
            sql,
            store,
            routers,
        }
    }

    /// Queue a full initial load for one node, inside a single
    /// transaction. Returns the number of markers enqueued.
    pub fn reload_node(&self, node_id: &str) -> KestrelResult<usize> {
        let node = self
            .store
            .find_node(node_id)?
            .ok_or_else(|| RegistrationError::UnknownNode(node_id.to_string()))?;
        info!(node_id = %node.node_id, "queueing an initial load");
        let mut txn = self.sql.start_transaction()?;
        match self.enqueue_markers(txn.as_mut(), &node, true) {
            Ok(count) => {
                txn.commit()?;
                Ok(count)
            }
            Err(e) => {
                release_on_error(txn.as_mut());
                Err(e)
            }
        }
    }

    /// After this node registers, queue a reverse initial load to every
    /// node that pulls from or pushes to it. No-op unless reverse
    /// auto-reload is enabled.
    pub fn send_initial_load_from_registered_node(&self) -> KestrelResult<()> {
        if !self.config.auto_reload_reverse {
            return Ok(());
        }
        let transactional = self.config.reload_transactional;
        let mut nodes = self
            .store
            .find_target_nodes_for(NodeGroupLinkAction::Push)?;
        nodes.extend(
            self.store
                .find_target_nodes_for(NodeGroupLinkAction::WaitForPull)?,
        );

        let mut queued = false;
        for node in &nodes {
            info!(node_id = %node.node_id, "enabling an initial load");
            let mut txn = self.sql.start_transaction()?;
            match self.enqueue_markers(txn.as_mut(), node, transactional) {
                Ok(_) => {
                    txn.commit()?;
                    queued = true;
                }
                Err(e) => {
                    release_on_error(txn.as_mut());
                    return Err(e);
                }
            }
        }

        if !queued {
            info!("reverse auto-reload is enabled but no nodes were linked to load");
        }
        Ok(())
    }

    /// Insert one marker per applicable trigger-router binding, in initial
    /// load order. With `transactional` unset, each marker is committed as
    /// it is written.
    fn enqueue_markers(
        &self,
        txn: &mut dyn SqlTransaction,
        node: &Node,
        transactional: bool,
    ) -> KestrelResult<usize> {
        let mut routers: Vec<TriggerRouter> = self
            .routers
            .routers_for_reload(&self.config.node_group_id, &node.node_group_id)?;
        routers.sort_by_key(|r| r.initial_load_order);
        for router in &routers {
            txn.update(
                sql::INSERT_RELOAD_EVENT,
                &[
                    SqlValue::from(node.node_id.as_str()),
                    SqlValue::from(router.trigger_id),
                    SqlValue::from(router.router_id.as_str()),
                    SqlValue::Null,
                    SqlValue::from(unix_millis_now()),
                ],
            )?;
            if !transactional {
                txn.commit()?;
            }
        }
        Ok(routers.len())
    }
}

/// Best-effort rollback on the error path; the original error wins.
fn release_on_error(txn: &mut dyn SqlTransaction) {
    if let Err(e) = txn.rollback() {
        warn!(error = %e, "rollback failed while releasing reload transaction");
    }
}
