//! Model types shared across the replication mesh: node identity and
//! security rows, registration-request ledger rows, trigger metadata, and
//! the reload marker/extraction handles.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Wall-clock milliseconds since the Unix epoch.
pub fn unix_millis_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One participating database instance in the replication mesh.
///
/// `node_id` is assigned once at admission and never changes afterwards;
/// the version and URL fields are refreshed on re-registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    pub node_group_id: String,
    pub external_id: String,
    pub sync_enabled: bool,
    pub sync_url: Option<String>,
    pub software_version: Option<String>,
    pub database_type: Option<String>,
    pub database_version: Option<String>,
    /// Node id of the authority that admitted this node.
    pub created_at_node_id: Option<String>,
}

impl Node {
    /// A candidate node known only by its group and external id, as
    /// presented at the start of the registration handshake.
    pub fn candidate(node_group_id: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            node_id: String::new(),
            node_group_id: node_group_id.into(),
            external_id: external_id.into(),
            sync_enabled: false,
            sync_url: None,
            software_version: None,
            database_type: None,
            database_version: None,
            created_at_node_id: None,
        }
    }
}

/// Credential and registration-state record paired one-to-one with a `Node`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSecurity {
    pub node_id: String,
    pub node_password: String,
    /// Cleared once registration completes.
    pub registration_enabled: bool,
    /// Set when registration completes.
    pub registration_time: Option<u64>,
    /// Set exactly once, by the reload-completion path. Never cleared by
    /// the registration subsystem.
    pub initial_load_time: Option<u64>,
}

/// Status of a registration request. Transitions are forward-only:
/// `Requested` may move to `Redirected` or `Ok`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Requested,
    Redirected,
    Ok,
}

impl RegistrationStatus {
    /// True for statuses that terminate a request's lifecycle on this
    /// authority.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, RegistrationStatus::Requested)
    }

    /// Forward-only transition check. A status may always re-assert itself
    /// (idempotent re-execution), but a resolved status never regresses to
    /// `Requested`.
    pub fn can_transition_to(&self, next: RegistrationStatus) -> bool {
        match self {
            RegistrationStatus::Requested => true,
            _ => next != RegistrationStatus::Requested,
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationStatus::Requested => write!(f, "REQUESTED"),
            RegistrationStatus::Redirected => write!(f, "REDIRECTED"),
            RegistrationStatus::Ok => write!(f, "OK"),
        }
    }
}

impl FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REQUESTED" => Ok(RegistrationStatus::Requested),
            "REDIRECTED" => Ok(RegistrationStatus::Redirected),
            "OK" => Ok(RegistrationStatus::Ok),
            other => Err(format!("unknown registration status: {other}")),
        }
    }
}

/// A durable record of one registration attempt and its resolution.
///
/// Keyed by (node group, external id, host name, ip address) for upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub node_group_id: String,
    pub external_id: String,
    pub host_name: String,
    pub ip_address: String,
    pub status: RegistrationStatus,
    pub attempt_count: u64,
    pub registered_node_id: Option<String>,
    pub create_time: u64,
    pub last_update_time: u64,
    pub last_update_by: Option<String>,
}

impl RegistrationRequest {
    /// Build a request row for a candidate node observed from
    /// (`remote_host`, `remote_address`).
    pub fn for_candidate(
        candidate: &Node,
        status: RegistrationStatus,
        remote_host: &str,
        remote_address: &str,
    ) -> Self {
        let now = unix_millis_now();
        Self {
            node_group_id: candidate.node_group_id.clone(),
            external_id: candidate.external_id.clone(),
            host_name: remote_host.to_string(),
            ip_address: remote_address.to_string(),
            status,
            attempt_count: 1,
            registered_node_id: if candidate.node_id.is_empty() {
                None
            } else {
                Some(candidate.node_id.clone())
            },
            create_time: now,
            last_update_time: now,
            last_update_by: None,
        }
    }
}

/// Direction of a node-group link, as seen from this node's group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeGroupLinkAction {
    /// This group pushes changes to the linked group.
    Push,
    /// The linked group pulls changes from this group.
    WaitForPull,
    /// Changes are routed but not exchanged over this link.
    RouteOnly,
}

impl NodeGroupLinkAction {
    /// One-letter code used in the backing store.
    pub fn code(&self) -> char {
        match self {
            NodeGroupLinkAction::Push => 'P',
            NodeGroupLinkAction::WaitForPull => 'W',
            NodeGroupLinkAction::RouteOnly => 'R',
        }
    }
}

/// A change-capture trigger definition, read-only to this subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub trigger_id: u64,
    pub source_table_name: String,
    /// Selection predicate for initial loads. `None` means "all rows".
    /// A reload marker may override this per extraction; the stored value
    /// is never mutated by the extraction path.
    pub initial_load_select: Option<String>,
}

/// Binds a trigger to a routing rule. Consumed read-only to determine which
/// tables must be reloaded for a target node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRouter {
    pub trigger_id: u64,
    pub router_id: String,
    /// Relative order in which tables are reloaded.
    pub initial_load_order: i32,
}

/// A synthetic change-stream entry signalling "perform an initial load
/// here" rather than carrying an ordinary data change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerRow {
    /// Trigger-history id resolving to the trigger to reload.
    pub trigger_hist_id: u64,
    /// Optional caller-supplied override of the trigger's initial-load
    /// selection predicate, for this reload only.
    pub row_data: Option<String>,
}

/// The open transactional/streaming scope a marker row is extracted
/// within. Owned by the extraction pipeline; this subsystem only reads the
/// batch's destination.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    pub batch_id: u64,
    /// Node id the open batch is destined for.
    pub node_id: String,
}
