use std::time::Duration;

use serde_json::Value;

use crate::error::TransportError;
use crate::registry::Peer;

/// Result of an outbound RPC: whether the call succeeded, and whatever JSON
/// body the remote callback returned.
///
/// Connection failures, timeouts, and non-2xx responses are all normalized
/// to `(false, None)` here — the caller (the Consensus Engine) only ever
/// needs to know "did the peer answer and agree", never the shape of the
/// underlying network failure.
pub type RpcOutcome = (bool, Option<Value>);

/// Outbound half of the Transport. Holds one shared [`reqwest::Client`] so
/// connections to peers are pooled and reused across RPCs, rather than
/// opening a fresh one per call.
#[derive(Clone, Debug)]
pub struct Requester {
    client: reqwest::Client,
}

impl Requester {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// GET `/ping` against a peer. Used for the health probe described in
    /// the transport contract; any failure (refused, timed out, non-200) is
    /// reported as `false`.
    pub async fn ping(&self, peer: &Peer, timeout: Duration) -> bool {
        let url = format!("http://{}:{}/ping", peer.host, peer.port);
        matches!(
            self.client.get(&url).timeout(timeout).send().await,
            Ok(response) if response.status().is_success()
        )
    }

    /// POST `/raft/heartbeat` to a peer with the given body. `body` may be
    /// omitted, in which case it's normalized to an empty object before the
    /// usual is-object check.
    pub async fn send_heartbeat(
        &self,
        peer: &Peer,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<RpcOutcome, TransportError> {
        let empty = Value::Object(Default::default());
        let body = body.unwrap_or(&empty);
        self.post(peer, "/raft/heartbeat", body, timeout).await
    }

    /// POST `/raft/request_vote` to a peer with the given body.
    pub async fn request_vote(
        &self,
        peer: &Peer,
        body: &Value,
        timeout: Duration,
    ) -> Result<RpcOutcome, TransportError> {
        self.post(peer, "/raft/request_vote", body, timeout).await
    }

    async fn post(
        &self,
        peer: &Peer,
        path: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<RpcOutcome, TransportError> {
        if !body.is_object() {
            return Err(TransportError::InvalidPayload(body.clone()));
        }
        let url = format!("http://{}:{}{}", peer.host, peer.port, path);
        let outcome = match self.client.post(&url).json(body).timeout(timeout).send().await {
            Ok(response) if response.status().is_success() => {
                let data = response.json::<Value>().await.ok();
                (true, data)
            }
            Ok(_) => (false, None),
            Err(error) => {
                tracing::debug!(peer = %peer.identifier, %path, error = %error, "rpc call failed");
                (false, None)
            }
        };
        Ok(outcome)
    }
}

impl Default for Requester {
    fn default() -> Self {
        Self::new()
    }
}
