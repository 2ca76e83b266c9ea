use std::sync::Arc;

use crate::config::ClusterConfig;
use crate::engine::{Engine, HeartbeatHandler, Role, VoteHandler};
use crate::error::ClusterError;
use crate::registry::{Peer, Registry};
use crate::transport::{Requester, Responder};

/// The embeddable facade a host application holds onto. Wires together the
/// Registry, Transport, and Consensus Engine per the construction
/// parameters in [`ClusterConfig`], and spawns the background tasks that
/// keep the node participating in the election protocol.
pub struct Cluster {
    config: ClusterConfig,
    registry: Arc<Registry>,
    engine: Arc<Engine>,
    responder_shutdown: tokio::sync::watch::Sender<bool>,
    responder_task: tokio::task::JoinHandle<()>,
    engine_task: tokio::task::JoinHandle<()>,
}

impl Cluster {
    /// Builds and starts a cluster node: binds the inbound HTTP responder,
    /// and spawns the Consensus Engine's run loop.
    pub async fn new(config: ClusterConfig) -> Result<Self, ClusterError> {
        config.validate()?;
        let addr = config.listen_addr()?;

        let registry = Arc::new(Registry::new(config.peers.clone()));
        let requester = Requester::new();
        let engine = Engine::new(
            config.identifier.clone(),
            registry.clone(),
            requester,
            config.min_timeout_duration(),
            config.max_timeout_duration(),
        );

        let responder = Responder::new();
        responder
            .set_heartbeat_callback(Arc::new(HeartbeatHandler(engine.clone())))
            .await;
        responder
            .set_request_vote_callback(Arc::new(VoteHandler(engine.clone())))
            .await;
        // `/raft/register` is left unwired: peer registration is scaffolding
        // only in this design and has no default handler.

        let (responder_shutdown, mut responder_shutdown_rx) = tokio::sync::watch::channel(false);
        let responder_task = tokio::spawn(async move {
            if let Err(error) = responder
                .serve(addr, async move {
                    while !*responder_shutdown_rx.borrow() {
                        if responder_shutdown_rx.changed().await.is_err() {
                            break;
                        }
                    }
                })
                .await
            {
                tracing::error!(%error, "responder exited with error");
            }
        });

        let engine_for_task = engine.clone();
        let engine_task = tokio::spawn(async move {
            engine_for_task.run().await;
        });

        tracing::info!(identifier = %config.identifier, %addr, "cluster node started");

        Ok(Self {
            config,
            registry,
            engine,
            responder_shutdown,
            responder_task,
            engine_task,
        })
    }

    pub async fn is_leader(&self) -> bool {
        self.engine.role().await == Role::Leader
    }

    pub async fn term(&self) -> u64 {
        self.engine.term().await
    }

    pub async fn role(&self) -> Role {
        self.engine.role().await
    }

    /// The currently known leader's peer record, if any.
    ///
    /// Returns `None` both when no leader is known yet and when the known
    /// leader is this node itself but this node is (unusually) not present
    /// in its own registry — there is no `Peer` record to hand back for it.
    pub async fn leader_info(&self) -> Option<Peer> {
        let leader_id = self.engine.known_leader().await?;
        self.registry.find_by_identifier(&leader_id).cloned()
    }

    pub fn identifier(&self) -> &str {
        &self.config.identifier
    }

    pub fn peer_count(&self) -> usize {
        self.registry.count()
    }

    /// Requests the engine step down and the responder stop serving, then
    /// waits for both background tasks to finish.
    pub async fn shutdown(self) {
        self.engine.request_shutdown();
        let _ = self.responder_shutdown.send(true);
        let _ = tokio::join!(self.engine_task, self.responder_task);
    }
}
