use serde::{Deserialize, Serialize};

/// Registration and initial-load configuration for one mesh node.
///
/// These knobs cover both roles a node can play: a joining client
/// (`registration_url`, `max_registration_attempts`) and a registration
/// authority (`auto_register`, `auto_reload`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Node group this node belongs to.
    pub node_group_id: String,
    /// External id this node presents when registering.
    pub external_id: String,
    /// Base URL of the registration authority this node joins through.
    #[serde(default)]
    pub registration_url: String,
    /// True when this node is the root registration authority. A non-root
    /// node may only admit others once it has an identity and has finished
    /// its own initial load.
    #[serde(default)]
    pub registration_server: bool,
    /// Admit unknown candidates automatically instead of queueing them for
    /// operator approval.
    #[serde(default)]
    pub auto_register: bool,
    /// Queue a full initial load for a node when it registers for the first
    /// time (or explicitly re-requests one).
    #[serde(default)]
    pub auto_reload: bool,
    /// After this node registers, queue a reverse initial load to the nodes
    /// that pull from or push to it.
    #[serde(default)]
    pub auto_reload_reverse: bool,
    /// Commit granularity for reload-marker enqueue: one commit per node
    /// (true) or one commit per marker (false, resilient to partial failure
    /// at the cost of possibly-partial marker sets on crash).
    #[serde(default = "default_true")]
    pub reload_transactional: bool,
    /// Maximum join attempts before the client fails. Negative = unlimited.
    #[serde(default = "default_max_registration_attempts")]
    pub max_registration_attempts: i64,
    /// Number of whole-second back-off slots for the jittered retry sleep.
    #[serde(default = "default_time_slot_count")]
    pub time_slot_count: u32,
    /// Allow a ledger row already resolved (`REDIRECTED`/`OK`) to be
    /// refreshed by a later attempt for the same key. When disabled, such
    /// attempts are rejected outright.
    #[serde(default)]
    pub allow_resolved_reupdate: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_registration_attempts() -> i64 {
    -1
}

fn default_time_slot_count() -> u32 {
    30
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            node_group_id: String::new(),
            external_id: String::new(),
            registration_url: String::new(),
            registration_server: false,
            auto_register: false,
            auto_reload: false,
            auto_reload_reverse: false,
            reload_transactional: true,
            max_registration_attempts: -1,
            time_slot_count: 30,
            allow_resolved_reupdate: false,
        }
    }
}

impl RegistrationConfig {
    /// True when the attempt budget never runs out.
    pub fn unlimited_attempts(&self) -> bool {
        self.max_registration_attempts < 0
    }
}
