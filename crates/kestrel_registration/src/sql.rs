//! SQL statements owned by the registration subsystem.
//!
//! Everything here runs through [`crate::store::SqlTemplate`] with
//! positional typed bind values; the identity tables themselves are behind
//! [`crate::store::NodeStore`].

/// Update the ledger row matching the request key while it is still in the
/// given current status. Ledger upserts try this first and fall back to
/// [`INSERT_REGISTRATION_REQUEST`] when no row matches.
pub(crate) const UPDATE_REGISTRATION_REQUEST: &str = "\
    update kestrel_registration_request \
    set last_update_by = ?, last_update_time = ?, registered_node_id = ?, \
        status = ?, attempt_count = attempt_count + 1 \
    where node_group_id = ? and external_id = ? and ip_address = ? \
      and host_name = ? and status = ?";

/// Variant of [`UPDATE_REGISTRATION_REQUEST`] that refreshes a row already
/// resolved (`REDIRECTED`/`OK`). Only issued when the resolved-reupdate
/// policy allows it.
pub(crate) const UPDATE_RESOLVED_REGISTRATION_REQUEST: &str = "\
    update kestrel_registration_request \
    set last_update_by = ?, last_update_time = ?, registered_node_id = ?, \
        status = ?, attempt_count = attempt_count + 1 \
    where node_group_id = ? and external_id = ? and ip_address = ? \
      and host_name = ? and status <> ?";

pub(crate) const INSERT_REGISTRATION_REQUEST: &str = "\
    insert into kestrel_registration_request \
    (node_group_id, external_id, ip_address, host_name, status, \
     registered_node_id, attempt_count, create_time, last_update_by, last_update_time) \
    values (?, ?, ?, ?, ?, ?, 1, ?, ?, ?)";

pub(crate) const DELETE_REGISTRATION_REQUEST: &str = "\
    delete from kestrel_registration_request \
    where node_group_id = ? and external_id = ? and ip_address = ? \
      and host_name = ? and status = ?";

pub(crate) const SELECT_REGISTRATION_REQUESTS: &str = "\
    select node_group_id, external_id, host_name, ip_address, status, \
           attempt_count, registered_node_id, create_time, last_update_by, last_update_time \
    from kestrel_registration_request where status = ?";

pub(crate) const SELECT_REGISTRATION_REQUESTS_BY_KEY: &str = "\
    select node_group_id, external_id, host_name, ip_address, status, \
           attempt_count, registered_node_id, create_time, last_update_by, last_update_time \
    from kestrel_registration_request \
    where node_group_id = ? and external_id = ? and ip_address = ? and host_name = ?";

/// Resolve the sync URL of the node a given external id is delegated to.
pub(crate) const SELECT_REGISTRATION_REDIRECT_URL: &str = "\
    select n.sync_url from kestrel_registration_redirect r \
    inner join kestrel_node n on n.node_id = r.registration_node_id \
    where r.registered_external_id = ?";

pub(crate) const UPDATE_REGISTRATION_REDIRECT: &str = "\
    update kestrel_registration_redirect set registration_node_id = ? \
    where registered_external_id = ?";

pub(crate) const INSERT_REGISTRATION_REDIRECT: &str = "\
    insert into kestrel_registration_redirect \
    (registration_node_id, registered_external_id) values (?, ?)";

/// Rotate a node's password and re-enable registration.
pub(crate) const REOPEN_REGISTRATION: &str = "\
    update kestrel_node_security \
    set node_password = ?, registration_enabled = 1, registration_time = null \
    where node_id = ?";

pub(crate) const INSERT_NODE_SECURITY: &str = "\
    insert into kestrel_node_security \
    (node_id, node_password, registration_enabled, created_at_node_id) \
    values (?, ?, 1, ?)";

/// Close out registration once the handshake completes.
pub(crate) const REGISTER_NODE_SECURITY: &str = "\
    update kestrel_node_security \
    set registration_enabled = 0, registration_time = ? \
    where node_id = ?";

/// Enqueue one reload marker ('R' event) for a target node and trigger.
pub(crate) const INSERT_RELOAD_EVENT: &str = "\
    insert into kestrel_data_event \
    (target_node_id, trigger_id, router_id, event_type, row_data, create_time) \
    values (?, ?, ?, 'R', ?, ?)";
