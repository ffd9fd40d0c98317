//! Durable ledger of registration requests.
//!
//! Every attempt a candidate makes against this authority leaves a row
//! keyed by (node group, external id, host, address). An upsert first
//! targets the row for that key still in `REQUESTED` status; when nothing
//! matches, a fresh row is inserted. Status transitions are forward-only:
//! `REQUESTED` resolves to `REDIRECTED` or `OK` and never regresses.
//! Whether a *resolved* row may be refreshed by a later attempt is a
//! configurable policy, not an assumption.

use std::sync::Arc;

use tracing::debug;

use kestrel_common::error::{KestrelResult, StoreError};
use kestrel_common::model::{unix_millis_now, RegistrationRequest, RegistrationStatus};

use crate::sql;
use crate::store::{NodeStore, SqlRow, SqlTemplate, SqlValue};

/// Durable store of pending/redirected/completed registration requests.
#[derive(Clone)]
pub struct RequestLedger {
    sql: Arc<dyn SqlTemplate>,
    store: Arc<dyn NodeStore>,
    /// Allow refreshing rows already in `REDIRECTED`/`OK` status.
    allow_resolved_reupdate: bool,
}

impl RequestLedger {
    pub fn new(
        sql: Arc<dyn SqlTemplate>,
        store: Arc<dyn NodeStore>,
        allow_resolved_reupdate: bool,
    ) -> Self {
        Self {
            sql,
            store,
            allow_resolved_reupdate,
        }
    }

    /// Upsert a request row.
    ///
    /// The update targets exactly the row matching the request key whose
    /// current status is `REQUESTED`; a second update pass against
    /// resolved rows runs only when the policy allows it and the incoming
    /// status is itself resolved. When neither pass touches a row, a new
    /// one is inserted.
    pub fn save(&self, request: &RegistrationRequest) -> KestrelResult<()> {
        let now = unix_millis_now();
        let update_params = [
            SqlValue::from(request.last_update_by.clone()),
            SqlValue::from(now),
            SqlValue::from(request.registered_node_id.clone()),
            SqlValue::from(request.status.to_string()),
            SqlValue::from(request.node_group_id.as_str()),
            SqlValue::from(request.external_id.as_str()),
            SqlValue::from(request.ip_address.as_str()),
            SqlValue::from(request.host_name.as_str()),
            SqlValue::from(RegistrationStatus::Requested.to_string()),
        ];
        let mut updated = self.sql.update(sql::UPDATE_REGISTRATION_REQUEST, &update_params)?;
        if updated == 0 && self.allow_resolved_reupdate && request.status.is_resolved() {
            updated = self
                .sql
                .update(sql::UPDATE_RESOLVED_REGISTRATION_REQUEST, &update_params)?;
        }
        if updated == 0 {
            self.sql.update(
                sql::INSERT_REGISTRATION_REQUEST,
                &[
                    SqlValue::from(request.node_group_id.as_str()),
                    SqlValue::from(request.external_id.as_str()),
                    SqlValue::from(request.ip_address.as_str()),
                    SqlValue::from(request.host_name.as_str()),
                    SqlValue::from(request.status.to_string()),
                    SqlValue::from(request.registered_node_id.clone()),
                    SqlValue::from(request.create_time),
                    SqlValue::from(request.last_update_by.clone()),
                    SqlValue::from(now),
                ],
            )?;
        }
        debug!(
            node_group_id = %request.node_group_id,
            external_id = %request.external_id,
            status = %request.status,
            updated,
            "saved registration request",
        );
        Ok(())
    }

    /// All requests still awaiting a decision. When
    /// `include_nodes_with_open_registration` is false, requests whose
    /// (group, external id) already has an open registration are dropped —
    /// those candidates will be admitted on their next attempt without
    /// operator action.
    pub fn pending_requests(
        &self,
        include_nodes_with_open_registration: bool,
    ) -> KestrelResult<Vec<RegistrationRequest>> {
        let rows = self.sql.query(
            sql::SELECT_REGISTRATION_REQUESTS,
            &[SqlValue::from(RegistrationStatus::Requested.to_string())],
        )?;
        let mut requests = rows
            .iter()
            .map(map_request)
            .collect::<KestrelResult<Vec<_>>>()?;
        if !include_nodes_with_open_registration {
            let open = self.store.find_nodes_with_open_registration()?;
            requests.retain(|r| {
                !open
                    .iter()
                    .any(|n| n.node_group_id == r.node_group_id && n.external_id == r.external_id)
            });
        }
        Ok(requests)
    }

    /// Delete the still-pending row for a request key. Returns true when a
    /// row was removed.
    pub fn delete(&self, request: &RegistrationRequest) -> KestrelResult<bool> {
        let count = self.sql.update(
            sql::DELETE_REGISTRATION_REQUEST,
            &[
                SqlValue::from(request.node_group_id.as_str()),
                SqlValue::from(request.external_id.as_str()),
                SqlValue::from(request.ip_address.as_str()),
                SqlValue::from(request.host_name.as_str()),
                SqlValue::from(RegistrationStatus::Requested.to_string()),
            ],
        )?;
        Ok(count > 0)
    }

    /// The resolved status recorded for a request key, if any.
    pub fn resolved_status(
        &self,
        node_group_id: &str,
        external_id: &str,
        host_name: &str,
        ip_address: &str,
    ) -> KestrelResult<Option<RegistrationStatus>> {
        let rows = self.sql.query(
            sql::SELECT_REGISTRATION_REQUESTS_BY_KEY,
            &[
                SqlValue::from(node_group_id),
                SqlValue::from(external_id),
                SqlValue::from(ip_address),
                SqlValue::from(host_name),
            ],
        )?;
        for row in &rows {
            let request = map_request(row)?;
            if request.status.is_resolved() {
                return Ok(Some(request.status));
            }
        }
        Ok(None)
    }
}

/// Map a ledger result row back to a request.
fn map_request(row: &SqlRow) -> KestrelResult<RegistrationRequest> {
    let status: RegistrationStatus = row
        .text("status")
        .unwrap_or_default()
        .parse()
        .map_err(StoreError::Sql)?;
    Ok(RegistrationRequest {
        node_group_id: row.text("node_group_id").unwrap_or_default().to_string(),
        external_id: row.text("external_id").unwrap_or_default().to_string(),
        host_name: row.text("host_name").unwrap_or_default().to_string(),
        ip_address: row.text("ip_address").unwrap_or_default().to_string(),
        status,
        attempt_count: row.long("attempt_count").unwrap_or(0) as u64,
        registered_node_id: row.text("registered_node_id").map(|s| s.to_string()),
        create_time: row.long("create_time").unwrap_or(0) as u64,
        last_update_by: row.text("last_update_by").map(|s| s.to_string()),
        last_update_time: row.long("last_update_time").unwrap_or(0) as u64,
    })
}
