//! In-memory fakes for the collaborator seams, shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use kestrel_common::error::{KestrelResult, StoreError};
use kestrel_common::model::{
    Node, NodeGroupLinkAction, NodeSecurity, RegistrationRequest, RegistrationStatus, Trigger,
    TriggerRouter,
};

use crate::extract::{ConfigurationExtractor, InitialLoadExtractor};
use crate::sql;
use crate::store::{NodeStore, SqlRow, SqlTemplate, SqlTransaction, SqlValue, TriggerRouterSource};
use crate::transport::{PullOutcome, RegistrationTransport};
use kestrel_common::model::ExtractionContext;

/// One enqueued reload-marker row.
#[derive(Debug, Clone)]
pub(crate) struct ReloadEventRow {
    pub target_node_id: String,
    pub trigger_id: u64,
    pub router_id: String,
    pub row_data: Option<String>,
}

/// Backing state for the in-memory mesh store.
#[derive(Default)]
pub(crate) struct MeshState {
    pub nodes: HashMap<String, Node>,
    pub securities: HashMap<String, NodeSecurity>,
    pub groups: HashSet<String>,
    pub requests: Vec<RegistrationRequest>,
    /// external id -> node id of the delegated authority
    pub redirects: HashMap<String, String>,
    pub reload_events: Vec<ReloadEventRow>,
    pub identity_node_id: Option<String>,
    pub target_nodes: Vec<(char, Node)>,
    pub transactions_started: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

/// In-memory mesh store implementing both `NodeStore` and `SqlTemplate`
/// over one shared state.
#[derive(Clone, Default)]
pub(crate) struct MemoryMesh {
    pub state: Arc<Mutex<MeshState>>,
}

impl MemoryMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_node(&self, node: Node) {
        self.state.lock().nodes.insert(node.node_id.clone(), node);
    }

    pub fn put_security(&self, security: NodeSecurity) {
        self.state
            .lock()
            .securities
            .insert(security.node_id.clone(), security);
    }

    pub fn set_identity(&self, node_id: &str) {
        self.state.lock().identity_node_id = Some(node_id.to_string());
    }

    pub fn add_redirect(&self, external_id: &str, node_id: &str) {
        self.state
            .lock()
            .redirects
            .insert(external_id.to_string(), node_id.to_string());
    }

    pub fn add_target_node(&self, action: NodeGroupLinkAction, node: Node) {
        self.state.lock().target_nodes.push((action.code(), node));
    }

    pub fn requests(&self) -> Vec<RegistrationRequest> {
        self.state.lock().requests.clone()
    }

    pub fn reload_events(&self) -> Vec<ReloadEventRow> {
        self.state.lock().reload_events.clone()
    }
}

fn request_row(r: &RegistrationRequest) -> SqlRow {
    SqlRow::new()
        .with("node_group_id", r.node_group_id.as_str())
        .with("external_id", r.external_id.as_str())
        .with("host_name", r.host_name.as_str())
        .with("ip_address", r.ip_address.as_str())
        .with("status", r.status.to_string())
        .with("attempt_count", r.attempt_count as i64)
        .with("registered_node_id", r.registered_node_id.clone())
        .with("create_time", r.create_time as i64)
        .with("last_update_by", r.last_update_by.clone())
        .with("last_update_time", r.last_update_time as i64)
}

fn param_text(params: &[SqlValue], idx: usize) -> String {
    params
        .get(idx)
        .and_then(|v| v.as_text())
        .unwrap_or_default()
        .to_string()
}

fn param_opt_text(params: &[SqlValue], idx: usize) -> Option<String> {
    params
        .get(idx)
        .and_then(|v| v.as_text())
        .map(|s| s.to_string())
}

fn param_long(params: &[SqlValue], idx: usize) -> i64 {
    params.get(idx).and_then(|v| v.as_long()).unwrap_or(0)
}

/// Shared statement interpreter used by both the template and its
/// transactions.
fn execute_update(state: &mut MeshState, stmt: &str, params: &[SqlValue]) -> KestrelResult<usize> {
    match stmt {
        sql::UPDATE_REGISTRATION_REQUEST | sql::UPDATE_RESOLVED_REGISTRATION_REQUEST => {
            let resolved_variant = stmt == sql::UPDATE_RESOLVED_REGISTRATION_REQUEST;
            let last_update_by = param_opt_text(params, 0);
            let last_update_time = param_long(params, 1) as u64;
            let registered_node_id = param_opt_text(params, 2);
            let status: RegistrationStatus = param_text(params, 3)
                .parse()
                .map_err(StoreError::Sql)?;
            let key = (
                param_text(params, 4),
                param_text(params, 5),
                param_text(params, 6),
                param_text(params, 7),
            );
            let current: RegistrationStatus = param_text(params, 8)
                .parse()
                .map_err(StoreError::Sql)?;
            let mut count = 0;
            for r in state.requests.iter_mut() {
                let key_match = r.node_group_id == key.0
                    && r.external_id == key.1
                    && r.ip_address == key.2
                    && r.host_name == key.3;
                let status_match = if resolved_variant {
                    r.status != current
                } else {
                    r.status == current
                };
                if key_match && status_match {
                    r.last_update_by = last_update_by.clone();
                    r.last_update_time = last_update_time;
                    r.registered_node_id = registered_node_id.clone();
                    r.status = status;
                    r.attempt_count += 1;
                    count += 1;
                }
            }
            Ok(count)
        }
        sql::INSERT_REGISTRATION_REQUEST => {
            let status: RegistrationStatus = param_text(params, 4)
                .parse()
                .map_err(StoreError::Sql)?;
            state.requests.push(RegistrationRequest {
                node_group_id: param_text(params, 0),
                external_id: param_text(params, 1),
                ip_address: param_text(params, 2),
                host_name: param_text(params, 3),
                status,
                registered_node_id: param_opt_text(params, 5),
                attempt_count: 1,
                create_time: param_long(params, 6) as u64,
                last_update_by: param_opt_text(params, 7),
                last_update_time: param_long(params, 8) as u64,
            });
            Ok(1)
        }
        sql::DELETE_REGISTRATION_REQUEST => {
            let key = (
                param_text(params, 0),
                param_text(params, 1),
                param_text(params, 2),
                param_text(params, 3),
            );
            let status: RegistrationStatus = param_text(params, 4)
                .parse()
                .map_err(StoreError::Sql)?;
            let before = state.requests.len();
            state.requests.retain(|r| {
                !(r.node_group_id == key.0
                    && r.external_id == key.1
                    && r.ip_address == key.2
                    && r.host_name == key.3
                    && r.status == status)
            });
            Ok(before - state.requests.len())
        }
        sql::REOPEN_REGISTRATION => {
            let password = param_text(params, 0);
            let node_id = param_text(params, 1);
            match state.securities.get_mut(&node_id) {
                Some(sec) => {
                    sec.node_password = password;
                    sec.registration_enabled = true;
                    sec.registration_time = None;
                    Ok(1)
                }
                None => Ok(0),
            }
        }
        sql::INSERT_NODE_SECURITY => {
            let node_id = param_text(params, 0);
            let password = param_text(params, 1);
            state.securities.insert(
                node_id.clone(),
                NodeSecurity {
                    node_id,
                    node_password: password,
                    registration_enabled: true,
                    registration_time: None,
                    initial_load_time: None,
                },
            );
            Ok(1)
        }
        sql::REGISTER_NODE_SECURITY => {
            let time = param_long(params, 0) as u64;
            let node_id = param_text(params, 1);
            match state.securities.get_mut(&node_id) {
                Some(sec) => {
                    sec.registration_enabled = false;
                    sec.registration_time = Some(time);
                    Ok(1)
                }
                None => Ok(0),
            }
        }
        sql::INSERT_RELOAD_EVENT => {
            state.reload_events.push(ReloadEventRow {
                target_node_id: param_text(params, 0),
                trigger_id: param_long(params, 1) as u64,
                router_id: param_text(params, 2),
                row_data: param_opt_text(params, 3),
            });
            Ok(1)
        }
        sql::UPDATE_REGISTRATION_REDIRECT => {
            let node_id = param_text(params, 0);
            let external_id = param_text(params, 1);
            match state.redirects.get_mut(&external_id) {
                Some(target) => {
                    *target = node_id;
                    Ok(1)
                }
                None => Ok(0),
            }
        }
        sql::INSERT_REGISTRATION_REDIRECT => {
            let node_id = param_text(params, 0);
            let external_id = param_text(params, 1);
            state.redirects.insert(external_id, node_id);
            Ok(1)
        }
        other => Err(StoreError::Sql(format!("unrecognized statement: {other}")).into()),
    }
}

impl SqlTemplate for MemoryMesh {
    fn update(&self, stmt: &str, params: &[SqlValue]) -> KestrelResult<usize> {
        execute_update(&mut self.state.lock(), stmt, params)
    }

    fn query(&self, stmt: &str, params: &[SqlValue]) -> KestrelResult<Vec<SqlRow>> {
        let state = self.state.lock();
        match stmt {
            sql::SELECT_REGISTRATION_REQUESTS => {
                let status: RegistrationStatus = param_text(params, 0)
                    .parse()
                    .map_err(StoreError::Sql)?;
                Ok(state
                    .requests
                    .iter()
                    .filter(|r| r.status == status)
                    .map(request_row)
                    .collect())
            }
            sql::SELECT_REGISTRATION_REQUESTS_BY_KEY => {
                let key = (
                    param_text(params, 0),
                    param_text(params, 1),
                    param_text(params, 2),
                    param_text(params, 3),
                );
                Ok(state
                    .requests
                    .iter()
                    .filter(|r| {
                        r.node_group_id == key.0
                            && r.external_id == key.1
                            && r.ip_address == key.2
                            && r.host_name == key.3
                    })
                    .map(request_row)
                    .collect())
            }
            sql::SELECT_REGISTRATION_REDIRECT_URL => {
                let external_id = param_text(params, 0);
                let url = state
                    .redirects
                    .get(&external_id)
                    .and_then(|node_id| state.nodes.get(node_id))
                    .and_then(|n| n.sync_url.clone());
                Ok(url
                    .map(|u| vec![SqlRow::new().with("sync_url", u)])
                    .unwrap_or_default())
            }
            other => Err(StoreError::Sql(format!("unrecognized query: {other}")).into()),
        }
    }

    fn start_transaction(&self) -> KestrelResult<Box<dyn SqlTransaction>> {
        self.state.lock().transactions_started += 1;
        Ok(Box::new(MemoryTxn {
            state: self.state.clone(),
        }))
    }
}

struct MemoryTxn {
    state: Arc<Mutex<MeshState>>,
}

impl SqlTransaction for MemoryTxn {
    fn update(&mut self, stmt: &str, params: &[SqlValue]) -> KestrelResult<usize> {
        execute_update(&mut self.state.lock(), stmt, params)
    }

    fn commit(&mut self) -> KestrelResult<()> {
        self.state.lock().commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> KestrelResult<()> {
        self.state.lock().rollbacks += 1;
        Ok(())
    }
}

impl NodeStore for MemoryMesh {
    fn find_node(&self, node_id: &str) -> KestrelResult<Option<Node>> {
        Ok(self.state.lock().nodes.get(node_id).cloned())
    }

    fn find_node_by_external_id(
        &self,
        node_group_id: &str,
        external_id: &str,
    ) -> KestrelResult<Option<Node>> {
        Ok(self
            .state
            .lock()
            .nodes
            .values()
            .find(|n| n.node_group_id == node_group_id && n.external_id == external_id)
            .cloned())
    }

    fn find_identity(&self) -> KestrelResult<Option<Node>> {
        let state = self.state.lock();
        Ok(state
            .identity_node_id
            .as_ref()
            .and_then(|id| state.nodes.get(id))
            .cloned())
    }

    fn find_node_security(&self, node_id: &str) -> KestrelResult<Option<NodeSecurity>> {
        Ok(self.state.lock().securities.get(node_id).cloned())
    }

    fn save_node(&self, node: &Node) -> KestrelResult<()> {
        self.state
            .lock()
            .nodes
            .insert(node.node_id.clone(), node.clone());
        Ok(())
    }

    fn delete_node_security(&self, node_id: &str) -> KestrelResult<()> {
        self.state.lock().securities.remove(node_id);
        Ok(())
    }

    fn insert_node_group(
        &self,
        node_group_id: &str,
        _description: Option<&str>,
    ) -> KestrelResult<()> {
        self.state.lock().groups.insert(node_group_id.to_string());
        Ok(())
    }

    fn find_nodes_with_open_registration(&self) -> KestrelResult<Vec<Node>> {
        let state = self.state.lock();
        Ok(state
            .nodes
            .values()
            .filter(|n| {
                state
                    .securities
                    .get(&n.node_id)
                    .is_some_and(|s| s.registration_enabled)
            })
            .cloned()
            .collect())
    }

    fn find_target_nodes_for(&self, action: NodeGroupLinkAction) -> KestrelResult<Vec<Node>> {
        Ok(self
            .state
            .lock()
            .target_nodes
            .iter()
            .filter(|(code, _)| *code == action.code())
            .map(|(_, n)| n.clone())
            .collect())
    }
}

/// Trigger metadata fixture keyed by (source group, target group).
#[derive(Default)]
pub(crate) struct StaticTriggerSource {
    pub routers_by_pair: HashMap<(String, String), Vec<TriggerRouter>>,
    pub triggers: HashMap<u64, Trigger>,
    /// trigger-history id -> trigger id
    pub history: HashMap<u64, u64>,
}

impl StaticTriggerSource {
    pub fn with_routers(source: &str, target: &str, routers: Vec<TriggerRouter>) -> Self {
        let mut s = Self::default();
        s.routers_by_pair
            .insert((source.to_string(), target.to_string()), routers);
        s
    }
}

impl TriggerRouterSource for StaticTriggerSource {
    fn routers_for_reload(
        &self,
        source_group: &str,
        target_group: &str,
    ) -> KestrelResult<Vec<TriggerRouter>> {
        Ok(self
            .routers_by_pair
            .get(&(source_group.to_string(), target_group.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn trigger_by_history(&self, trigger_hist_id: u64) -> KestrelResult<Option<Trigger>> {
        Ok(self
            .history
            .get(&trigger_hist_id)
            .and_then(|id| self.triggers.get(id))
            .cloned())
    }
}

/// Transport fake that replays a scripted sequence of pull outcomes and
/// runs an optional hook after a `Processed` outcome (simulating the
/// authority installing this node's identity).
pub(crate) struct ScriptedTransport {
    outcomes: Mutex<VecDeque<KestrelResult<PullOutcome>>>,
    pub pulls: AtomicUsize,
    /// Runs after a `Processed` outcome (the authority installed this
    /// node's identity as part of the pull payload).
    success_hook: Option<Box<dyn Fn() + Send + Sync>>,
    /// Runs on every pull (a background process racing the loop).
    pull_hook: Option<Box<dyn Fn() + Send + Sync>>,
}

impl ScriptedTransport {
    pub fn new(outcomes: Vec<KestrelResult<PullOutcome>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            pulls: AtomicUsize::new(0),
            success_hook: None,
            pull_hook: None,
        }
    }

    pub fn with_success_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.success_hook = Some(Box::new(hook));
        self
    }

    pub fn with_pull_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.pull_hook = Some(Box::new(hook));
        self
    }

    pub fn pull_count(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }
}

impl RegistrationTransport for ScriptedTransport {
    fn resolve_url(&self, url: &str, registration_base: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", registration_base.trim_end_matches('/'), url)
        }
    }

    fn pull_registration(&self) -> KestrelResult<PullOutcome> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.pull_hook {
            hook();
        }
        let outcome = self
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or(Ok(PullOutcome::NoData));
        if matches!(outcome, Ok(PullOutcome::Processed)) {
            if let Some(hook) = &self.success_hook {
                hook();
            }
        }
        outcome
    }
}

/// Configuration extractor fake that writes a fixed payload and counts
/// invocations.
#[derive(Default)]
pub(crate) struct RecordingConfigExtractor {
    pub extractions: AtomicUsize,
}

impl ConfigurationExtractor for RecordingConfigExtractor {
    fn extract_configuration(
        &self,
        node: &Node,
        out: &mut dyn std::io::Write,
    ) -> KestrelResult<()> {
        self.extractions.fetch_add(1, Ordering::SeqCst);
        writeln!(out, "config for {}", node.node_id)?;
        Ok(())
    }
}

/// Initial-load extractor fake recording (node, trigger, effective select).
#[derive(Default)]
pub(crate) struct RecordingLoadExtractor {
    pub calls: Mutex<Vec<(String, u64, Option<String>)>>,
}

impl InitialLoadExtractor for RecordingLoadExtractor {
    fn extract_initial_load_within_batch(
        &self,
        node: &Node,
        trigger: &Trigger,
        out: &mut dyn std::io::Write,
        _ctx: &ExtractionContext,
    ) -> KestrelResult<()> {
        self.calls.lock().push((
            node.node_id.clone(),
            trigger.trigger_id,
            trigger.initial_load_select.clone(),
        ));
        writeln!(out, "rows for {}", trigger.source_table_name)?;
        Ok(())
    }
}

/// A registered node row plus its security row.
pub(crate) fn seeded_node(node_id: &str, group: &str, external_id: &str) -> Node {
    Node {
        node_id: node_id.to_string(),
        node_group_id: group.to_string(),
        external_id: external_id.to_string(),
        sync_enabled: true,
        sync_url: Some(format!("http://{node_id}.mesh:31415/sync")),
        software_version: Some("3.2.0".to_string()),
        database_type: Some("kestrel".to_string()),
        database_version: Some("14.1".to_string()),
        created_at_node_id: None,
    }
}

pub(crate) fn seeded_security(node_id: &str, registration_enabled: bool) -> NodeSecurity {
    NodeSecurity {
        node_id: node_id.to_string(),
        node_password: "hunter2".to_string(),
        registration_enabled,
        registration_time: None,
        initial_load_time: None,
    }
}
