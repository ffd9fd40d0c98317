//! Node identifier and credential allocation.
//!
//! Id selection is deterministic so that repeated admissions of the same
//! candidate converge on the same node id; password generation is random.
//! Both are pluggable so a deployment can impose its own numbering scheme
//! or credential policy.

use rand::distributions::Alphanumeric;
use rand::Rng;

use kestrel_common::error::{KestrelError, KestrelResult};
use kestrel_common::model::Node;

use crate::store::NodeStore;

/// Generated password length for the default generator.
const PASSWORD_LEN: usize = 30;

/// Pluggable id/password generation policy.
pub trait IdGenerator: Send + Sync {
    /// Resolve the node id an arriving candidate should be admitted
    /// under. Deterministic for a given store state and candidate.
    fn select_node_id(&self, store: &dyn NodeStore, candidate: &Node) -> KestrelResult<String>;

    /// Allocate a node id for a candidate being admitted for the first
    /// time. Must not collide with an existing node.
    fn generate_node_id(&self, store: &dyn NodeStore, candidate: &Node) -> KestrelResult<String>;

    /// Generate a fresh password for a node's security row.
    fn generate_password(&self, store: &dyn NodeStore, node: &Node) -> String;
}

/// Transforms a freshly generated password before persistence (e.g.
/// hashing or obfuscation imposed by the deployment).
pub trait PasswordFilter: Send + Sync {
    fn on_node_security_save(&self, password: &str) -> String;
}

/// Default policy: the node id is the candidate's external id, suffixed
/// with `-N` when taken; passwords are random alphanumeric strings.
pub struct DefaultIdGenerator {
    /// How many `-N` suffixes to probe before giving up.
    max_probes: u32,
}

impl DefaultIdGenerator {
    pub fn new(max_probes: u32) -> Self {
        Self { max_probes }
    }

    fn candidate_ids<'a>(&self, external_id: &'a str) -> impl Iterator<Item = String> + 'a {
        let external = external_id.to_string();
        let probes = self.max_probes;
        std::iter::once(external.clone())
            .chain((1..=probes).map(move |i| format!("{external}-{i}")))
    }
}

impl Default for DefaultIdGenerator {
    fn default() -> Self {
        Self::new(100)
    }
}

impl IdGenerator for DefaultIdGenerator {
    fn select_node_id(&self, store: &dyn NodeStore, candidate: &Node) -> KestrelResult<String> {
        if !candidate.node_id.is_empty() {
            return Ok(candidate.node_id.clone());
        }
        // Prefer an id that already has registration opened for it; this is
        // how a queued candidate finds the row an operator opened on its
        // behalf.
        for id in self.candidate_ids(&candidate.external_id) {
            if let Some(security) = store.find_node_security(&id)? {
                if security.registration_enabled {
                    return Ok(id);
                }
            }
        }
        Ok(candidate.external_id.clone())
    }

    fn generate_node_id(&self, store: &dyn NodeStore, candidate: &Node) -> KestrelResult<String> {
        if !candidate.node_id.is_empty() {
            return Ok(candidate.node_id.clone());
        }
        for id in self.candidate_ids(&candidate.external_id) {
            match store.find_node(&id)? {
                None => return Ok(id),
                // The id is already this candidate's: allocation is
                // idempotent and the caller degrades to a re-open.
                Some(existing)
                    if existing.external_id == candidate.external_id
                        && existing.node_group_id == candidate.node_group_id =>
                {
                    return Ok(id)
                }
                Some(_) => {}
            }
        }
        Err(KestrelError::Internal(format!(
            "could not allocate a node id for external id {} within {} probes",
            candidate.external_id, self.max_probes
        )))
    }

    fn generate_password(&self, _store: &dyn NodeStore, _node: &Node) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(PASSWORD_LEN)
            .map(char::from)
            .collect()
    }
}
