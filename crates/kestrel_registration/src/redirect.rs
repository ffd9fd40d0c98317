//! Registration-authority delegation.
//!
//! An external id can be delegated to a different authority node; a
//! candidate arriving here is then told to retarget its transport to that
//! node's sync URL and restart the handshake there. Resolution is
//! idempotent: absent an administrative change, the same external id
//! always resolves to the same URL.

use std::sync::Arc;

use kestrel_common::error::KestrelResult;

use crate::sql;
use crate::store::{SqlTemplate, SqlValue};
use crate::transport::RegistrationTransport;

/// Maps an external id to an alternate registration authority URL.
#[derive(Clone)]
pub struct RedirectResolver {
    sql: Arc<dyn SqlTemplate>,
    transport: Arc<dyn RegistrationTransport>,
    registration_url: String,
}

impl RedirectResolver {
    pub fn new(
        sql: Arc<dyn SqlTemplate>,
        transport: Arc<dyn RegistrationTransport>,
        registration_url: impl Into<String>,
    ) -> Self {
        Self {
            sql,
            transport,
            registration_url: registration_url.into(),
        }
    }

    /// The URL a candidate with this external id must register against
    /// instead, or `None` when this authority handles it itself.
    pub fn redirection_url_for(&self, external_id: &str) -> KestrelResult<Option<String>> {
        let rows = self.sql.query(
            sql::SELECT_REGISTRATION_REDIRECT_URL,
            &[SqlValue::from(external_id)],
        )?;
        Ok(rows.first().and_then(|row| {
            row.text("sync_url")
                .map(|url| self.transport.resolve_url(url, &self.registration_url))
        }))
    }

    /// Delegate registration for an external id to another node. Upserts
    /// the mapping.
    pub fn save_registration_redirect(
        &self,
        external_id_to_redirect: &str,
        node_id_to_redirect_to: &str,
    ) -> KestrelResult<()> {
        let params = [
            SqlValue::from(node_id_to_redirect_to),
            SqlValue::from(external_id_to_redirect),
        ];
        let count = self.sql.update(sql::UPDATE_REGISTRATION_REDIRECT, &params)?;
        if count == 0 {
            self.sql.update(sql::INSERT_REGISTRATION_REDIRECT, &params)?;
        }
        Ok(())
    }
}
