//! The Consensus Engine: a simplified Raft state machine coordinated over
//! the Transport's heartbeat and request-vote RPCs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex, Notify};

use crate::registry::Registry;
use crate::transport::{Callback, CallbackResult, Requester};

/// Cadence at which a LEADER sends heartbeats to its peers.
const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(50);

/// Per-call timeout a LEADER applies to heartbeat RPCs.
const HEARTBEAT_RPC_TIMEOUT: Duration = Duration::from_millis(100);

/// Per-call timeout applied to request-vote RPCs during an election.
const VOTE_RPC_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
    Terminating,
}

#[derive(Debug, Clone)]
struct EngineState {
    term: u64,
    role: Role,
    voted_this_term: bool,
    known_leader: Option<String>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            term: 0,
            role: Role::Follower,
            voted_this_term: false,
            known_leader: None,
        }
    }
}

/// Edge-triggered signal a FOLLOWER waits on: set whenever a valid
/// heartbeat arrives, so the follower's timeout wait is cancelled instead
/// of firing and starting an unnecessary election.
#[derive(Debug)]
struct HeartbeatSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl HeartbeatSignal {
    fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Waits up to `timeout` for the signal to be set, returning `true` if
    /// it was observed (either already set, or set while waiting).
    async fn wait_for(&self, timeout: Duration) -> bool {
        if self.is_set() {
            return true;
        }
        let notified = self.notify.notified();
        tokio::select! {
            _ = notified => self.is_set(),
            _ = tokio::time::sleep(timeout) => false,
        }
    }
}

/// Drives the Raft role transitions for one node. Holds the node's own
/// identifier, a read-only view of its peers, the outbound Requester, the
/// election-timeout bounds, and the mutable term/role state.
pub struct Engine {
    self_identifier: String,
    registry: Arc<Registry>,
    requester: Requester,
    min_timeout: Duration,
    max_timeout: Duration,
    state: Mutex<EngineState>,
    heartbeat_signal: HeartbeatSignal,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Engine {
    pub fn new(
        self_identifier: String,
        registry: Arc<Registry>,
        requester: Requester,
        min_timeout: Duration,
        max_timeout: Duration,
    ) -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Arc::new(Self {
            self_identifier,
            registry,
            requester,
            min_timeout,
            max_timeout,
            state: Mutex::new(EngineState::new()),
            heartbeat_signal: HeartbeatSignal::new(),
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub async fn term(&self) -> u64 {
        self.state.lock().await.term
    }

    pub async fn role(&self) -> Role {
        self.state.lock().await.role
    }

    pub async fn known_leader(&self) -> Option<String> {
        self.state.lock().await.known_leader.clone()
    }

    pub fn request_shutdown(self: &Arc<Self>) {
        let _ = self.shutdown_tx.send(true);
    }

    fn random_timeout(&self) -> Duration {
        if self.min_timeout >= self.max_timeout {
            return self.min_timeout;
        }
        let millis = rand::thread_rng()
            .gen_range(self.min_timeout.as_millis()..=self.max_timeout.as_millis());
        Duration::from_millis(millis as u64)
    }

    /// Drives the main state-machine loop until [`Engine::request_shutdown`]
    /// is called. A single node with no peers immediately becomes and stays
    /// LEADER, since it trivially constitutes a majority of one.
    pub async fn run(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        if *shutdown_rx.borrow() {
            return;
        }
        loop {
            let role = self.role().await;
            let tick = async {
                match role {
                    Role::Follower => self.tick_follower().await,
                    Role::Candidate => self.tick_candidate().await,
                    Role::Leader => self.tick_leader().await,
                    Role::Terminating => return,
                }
            };
            tokio::select! {
                _ = tick => {}
                _ = shutdown_rx.changed() => {
                    let mut state = self.state.lock().await;
                    state.role = Role::Terminating;
                    return;
                }
            }
            if self.role().await == Role::Terminating || *shutdown_rx.borrow() {
                return;
            }
        }
    }

    async fn tick_follower(self: &Arc<Self>) {
        let timeout = self.random_timeout();
        self.heartbeat_signal.clear();
        let heard = self.heartbeat_signal.wait_for(timeout).await;
        if heard {
            return;
        }
        if self.registry.count() == 0 {
            self.become_leader().await;
            return;
        }
        self.become_candidate().await;
    }

    async fn tick_candidate(self: &Arc<Self>) {
        let timeout = self.random_timeout();
        let started_at = tokio::time::Instant::now();

        let (term, request_body) = {
            let mut state = self.state.lock().await;
            state.term += 1;
            state.voted_this_term = true;
            (state.term, json!({ "term": state.term, "identifier": self.self_identifier }))
        };
        self.heartbeat_signal.clear();

        let peers: Vec<_> = self.registry.peers().cloned().collect();
        let requests = peers.iter().map(|peer| {
            let requester = self.requester.clone();
            let request_body = request_body.clone();
            async move {
                requester
                    .request_vote(peer, &request_body, VOTE_RPC_TIMEOUT)
                    .await
                    .unwrap_or((false, None))
            }
        });
        let results = futures::future::join_all(requests).await;

        if self.heartbeat_signal.is_set() || self.role().await != Role::Candidate {
            return;
        }
        if self.term().await != term {
            return;
        }

        let votes = 1 + results
            .into_iter()
            .filter(|(granted, body)| Self::parse_ballot(*granted, body))
            .count();
        let total_voters = peers.len() as f64 + 1.0;
        let has_majority = votes as f64 / total_voters > 0.5;

        {
            let mut state = self.state.lock().await;
            if state.term != term || state.role != Role::Candidate {
                return;
            }
            if has_majority {
                state.role = Role::Leader;
                state.known_leader = Some(self.self_identifier.clone());
                tracing::info!(term, votes, "elected leader");
                return;
            }
            tracing::debug!(term, votes, "split vote, retrying with a higher term");
        }
        // Split vote: stay CANDIDATE and wait out the remainder of this
        // round's timeout window before the next loop iteration bumps the
        // term and tries again, so retries don't spin in a tight loop.
        let elapsed = started_at.elapsed();
        if elapsed < timeout {
            tokio::time::sleep(timeout - elapsed).await;
        }
    }

    async fn tick_leader(self: &Arc<Self>) {
        let started_at = tokio::time::Instant::now();
        let body = {
            let state = self.state.lock().await;
            json!({ "term": state.term, "identifier": self.self_identifier })
        };

        let peers: Vec<_> = self.registry.peers().cloned().collect();
        let requests = peers.iter().map(|peer| {
            let requester = self.requester.clone();
            let body = body.clone();
            async move {
                requester
                    .send_heartbeat(peer, Some(&body), HEARTBEAT_RPC_TIMEOUT)
                    .await
                    .unwrap_or((false, None))
            }
        });
        // Best-effort broadcast: a LEADER never reacts to the content of the
        // responses here. It can only be demoted via an inbound heartbeat or
        // request-vote for a higher term, handled in the callbacks below.
        let _ = futures::future::join_all(requests).await;

        let elapsed = started_at.elapsed();
        if elapsed < HEARTBEAT_INTERVAL {
            tokio::time::sleep(HEARTBEAT_INTERVAL - elapsed).await;
        }
    }

    async fn become_candidate(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        state.role = Role::Candidate;
        state.known_leader = None;
    }

    async fn become_leader(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        state.term += 1;
        state.role = Role::Leader;
        state.known_leader = Some(self.self_identifier.clone());
    }

    fn parse_ballot(granted: bool, body: &Option<Value>) -> bool {
        if !granted {
            return false;
        }
        match body {
            Some(Value::Object(map)) => map
                .get("vote_granted")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Handles an inbound `/raft/heartbeat` call from a leader.
    ///
    /// A CANDIDATE or FOLLOWER accepts (and resets the election timer) for
    /// any `leader_term` at least equal to its own; a LEADER only steps
    /// down for a strictly higher term, since an equal-term heartbeat from
    /// elsewhere can't happen without a term this node already holds the
    /// sole vote majority for. Observing a strictly higher term always
    /// clears any vote recorded for this node's own (now stale) term.
    async fn on_heartbeat(self: &Arc<Self>, data: Value) -> CallbackResult {
        let (leader_term, leader_id) = match &data {
            Value::Object(map) => (
                map.get("term").and_then(Value::as_u64),
                map.get("identifier").and_then(Value::as_str).map(str::to_string),
            ),
            _ => (None, None),
        };
        let leader_term = match leader_term {
            Some(term) => term,
            None => {
                tracing::debug!(?data, "malformed heartbeat payload, ignoring");
                return CallbackResult::fail();
            }
        };

        let mut state = self.state.lock().await;
        let accepted = match state.role {
            Role::Leader => leader_term > state.term,
            Role::Candidate | Role::Follower => leader_term >= state.term,
            Role::Terminating => false,
        };
        if !accepted {
            return CallbackResult::ok(json!({ "term": state.term, "accepted": false }));
        }
        if leader_term > state.term {
            state.term = leader_term;
            state.voted_this_term = false;
        }
        state.role = Role::Follower;
        state.known_leader = leader_id.clone();
        let term = state.term;
        drop(state);
        self.heartbeat_signal.set();
        tracing::debug!(term, leader = leader_id.as_deref().unwrap_or("?"), "accepted heartbeat");
        CallbackResult::ok(json!({ "term": term, "accepted": true }))
    }

    /// Handles an inbound `/raft/request_vote` call from a candidate.
    ///
    /// Grants the vote iff `candidate_term` is at least the node's current
    /// term and it has not already voted this term (a higher candidate term
    /// always clears the prior vote record first).
    async fn on_request_vote(self: &Arc<Self>, data: Value) -> CallbackResult {
        let candidate_term = match &data {
            Value::Object(map) => map.get("term").and_then(Value::as_u64),
            _ => None,
        };
        let candidate_term = match candidate_term {
            Some(term) => term,
            None => {
                tracing::debug!(?data, "malformed request_vote payload, ignoring");
                return CallbackResult::fail();
            }
        };

        let mut state = self.state.lock().await;
        if candidate_term < state.term {
            return CallbackResult::ok(json!({ "term": state.term, "vote_granted": false }));
        }
        // A strictly higher candidate term is itself the kind of "higher-term
        // message" the heartbeat signal exists to surface, independent of
        // whether the vote ends up granted.
        let adopted_higher_term = candidate_term > state.term;
        if adopted_higher_term {
            state.term = candidate_term;
            state.voted_this_term = false;
            state.role = Role::Follower;
            state.known_leader = None;
        }
        let granted = !state.voted_this_term;
        if granted {
            state.voted_this_term = true;
        }
        let term = state.term;
        drop(state);
        if adopted_higher_term {
            self.heartbeat_signal.set();
        }
        tracing::debug!(term, granted, "request_vote decided");
        CallbackResult::ok(json!({ "term": term, "vote_granted": granted }))
    }
}

/// Adapts [`Engine::on_heartbeat`] to the [`Callback`] contract expected by
/// the Responder.
pub struct HeartbeatHandler(pub Arc<Engine>);

#[async_trait]
impl Callback for HeartbeatHandler {
    async fn call(&self, data: Value) -> CallbackResult {
        self.0.on_heartbeat(data).await
    }
}

/// Adapts [`Engine::on_request_vote`] to the [`Callback`] contract expected
/// by the Responder.
pub struct VoteHandler(pub Arc<Engine>);

#[async_trait]
impl Callback for VoteHandler {
    async fn call(&self, data: Value) -> CallbackResult {
        self.0.on_request_vote(data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn engine_with_no_peers() -> Arc<Engine> {
        Engine::new(
            "solo".into(),
            Arc::new(Registry::new(vec![])),
            Requester::new(),
            Duration::from_millis(10),
            Duration::from_millis(20),
        )
    }

    #[tokio::test]
    async fn heartbeat_rejects_lower_term() {
        let engine = engine_with_no_peers();
        {
            let mut state = engine.state.lock().await;
            state.term = 5;
        }
        let result = engine.on_heartbeat(json!({"term": 3, "identifier": "x"})).await;
        assert!(result.success);
        assert_eq!(result.data["accepted"], Value::Bool(false));
        assert_eq!(engine.term().await, 5);
    }

    #[tokio::test]
    async fn heartbeat_with_higher_term_clears_vote_and_follows() {
        let engine = engine_with_no_peers();
        {
            let mut state = engine.state.lock().await;
            state.term = 2;
            state.voted_this_term = true;
            state.role = Role::Candidate;
        }
        let result = engine.on_heartbeat(json!({"term": 7, "identifier": "peer-1"})).await;
        assert!(result.data["accepted"].as_bool().unwrap());
        let state = engine.state.lock().await;
        assert_eq!(state.term, 7);
        assert!(!state.voted_this_term);
        assert_eq!(state.role, Role::Follower);
        assert_eq!(state.known_leader.as_deref(), Some("peer-1"));
    }

    #[tokio::test]
    async fn vote_is_granted_once_per_term() {
        let engine = engine_with_no_peers();
        let first = engine.on_request_vote(json!({"term": 1})).await;
        assert!(first.data["vote_granted"].as_bool().unwrap());
        let second = engine.on_request_vote(json!({"term": 1})).await;
        assert!(!second.data["vote_granted"].as_bool().unwrap());
    }

    #[tokio::test]
    async fn vote_request_with_higher_term_resets_vote_record() {
        let engine = engine_with_no_peers();
        let _ = engine.on_request_vote(json!({"term": 1})).await;
        let result = engine.on_request_vote(json!({"term": 2})).await;
        assert!(result.data["vote_granted"].as_bool().unwrap());
    }

    #[tokio::test]
    async fn malformed_payload_fails_closed() {
        let engine = engine_with_no_peers();
        let result = engine.on_heartbeat(json!("not-an-object")).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn solo_node_becomes_leader_after_timeout() {
        let engine = engine_with_no_peers();
        engine.tick_follower().await;
        assert_eq!(engine.role().await, Role::Leader);
    }
}
