//! Node wiring: construct the component DAG leaves-first, run the
//! periodic tasks, and tear everything down on a shared shutdown signal.
//!
//! Tasks: (1) UDP receiver, (2) gossip ticker, (3) GPS discipline ticker,
//! (4) proof ticker, (5) consensus refresh. Each observes the watch
//! channel and exits at its next suspension point; shutdown waits at most
//! `SHUTDOWN_DEADLINE_SECS` before aborting stragglers.

use crate::archive::ArchiveClient;
use crate::consensus::ConsensusView;
use crate::crypto::SecureElement;
use crate::gps::{GpsSource, SimulatedGps};
use crate::net::SyncEngine;
use crate::oscillator::Oscillator;
use crate::proof::ProofGenerator;
use crate::timekeeping::TimekeepingUnit;
use crate::types::{
    DEFAULT_FAULT_TOLERANCE, GOSSIP_PERIOD_SECS, MAX_DATAGRAM_SIZE, PROOF_INTERVAL_SECS,
    SHARED_KEY_MIN_BYTES, SHUTDOWN_DEADLINE_SECS, SYNC_INTERVAL_SECS, UNCERTAINTY_WINDOW_SECS,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("shared key too short: {0} bytes, need at least 32")]
    KeyTooShort(usize),
}

pub struct NodeConfig {
    pub bind: SocketAddr,
    pub bootstrap: Option<SocketAddr>,
    pub da_url: String,
    /// Mesh-wide pre-shared HMAC key. Per-node derived keys cannot
    /// cross-verify; this must be the same bytes on every node.
    pub shared_key: Vec<u8>,
    pub fault_tolerance: usize,
    pub uncertainty: f64,
}

impl NodeConfig {
    pub fn new(bind: SocketAddr, shared_key: Vec<u8>) -> Self {
        Self {
            bind,
            bootstrap: None,
            da_url: "http://127.0.0.1:8900".to_string(),
            shared_key,
            fault_tolerance: DEFAULT_FAULT_TOLERANCE,
            uncertainty: UNCERTAINTY_WINDOW_SECS,
        }
    }
}

pub struct Node {
    secure: Arc<SecureElement>,
    oscillator: Arc<Oscillator>,
    timekeeping: Arc<TimekeepingUnit>,
    engine: Arc<SyncEngine>,
    proofs: Arc<ProofGenerator>,
    archive: Arc<ArchiveClient>,
    consensus: Arc<ConsensusView>,
    socket: Arc<UdpSocket>,
    bootstrap: Option<SocketAddr>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<JoinSet<()>>,
}

impl Node {
    pub async fn new(config: NodeConfig) -> Result<Self, NodeError> {
        Self::with_gps(config, Arc::new(SimulatedGps::new())).await
    }

    /// Construct with a caller-supplied GPS source (hardware, or the
    /// simulator with an outage switch in tests).
    pub async fn with_gps(config: NodeConfig, gps: Arc<dyn GpsSource>) -> Result<Self, NodeError> {
        if config.shared_key.len() < SHARED_KEY_MIN_BYTES {
            return Err(NodeError::KeyTooShort(config.shared_key.len()));
        }

        let socket = Arc::new(UdpSocket::bind(config.bind).await?);

        // Leaves first; ownership is a DAG with the node at the root.
        let secure = Arc::new(SecureElement::generate());
        let oscillator = Arc::new(Oscillator::new());
        let timekeeping = Arc::new(TimekeepingUnit::new(gps.clone(), oscillator.clone()));
        let proofs = Arc::new(ProofGenerator::new(
            timekeeping.clone(),
            gps,
            secure.clone(),
        ));
        let engine = Arc::new(SyncEngine::new(
            secure.node_id().clone(),
            oscillator.clone(),
            config.shared_key,
            config.fault_tolerance,
            config.uncertainty,
        ));
        let archive = Arc::new(ArchiveClient::new(config.da_url));
        let consensus = Arc::new(ConsensusView::new(archive.clone()));

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            secure,
            oscillator,
            timekeeping,
            engine,
            proofs,
            archive,
            consensus,
            socket,
            bootstrap: config.bootstrap,
            shutdown_tx,
            tasks: Mutex::new(JoinSet::new()),
        })
    }

    pub fn node_id(&self) -> &str {
        self.secure.node_id()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.socket.local_addr()
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn oscillator(&self) -> &Arc<Oscillator> {
        &self.oscillator
    }

    pub fn consensus(&self) -> &Arc<ConsensusView> {
        &self.consensus
    }

    pub fn timekeeping(&self) -> &Arc<TimekeepingUnit> {
        &self.timekeeping
    }

    pub fn proofs(&self) -> &Arc<ProofGenerator> {
        &self.proofs
    }

    /// Bounded current time: `[pt − U, pt + U]`.
    pub fn get_current_time(&self) -> (f64, f64) {
        self.engine.get_current_time()
    }

    /// Spawn the periodic tasks and announce ourselves to the bootstrap
    /// peer, if one is configured.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().expect("task set poisoned");

        // (1) Inbound UDP receiver.
        {
            let socket = self.socket.clone();
            let engine = self.engine.clone();
            let mut shutdown = self.shutdown_tx.subscribe();
            tasks.spawn(async move {
                let mut buf = [0u8; MAX_DATAGRAM_SIZE + 1];
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        recv = socket.recv_from(&mut buf) => {
                            let Ok((len, from)) = recv else { continue };
                            if let Some(reply) = engine.process_datagram(&buf[..len], from) {
                                if let Err(e) = socket.send_to(&reply, from).await {
                                    debug!("failed to answer {}: {}", from, e);
                                }
                            }
                        }
                    }
                }
            });
        }

        // (2) Outbound gossip ticker.
        {
            let socket = self.socket.clone();
            let engine = self.engine.clone();
            let mut shutdown = self.shutdown_tx.subscribe();
            tasks.spawn(async move {
                let mut interval =
                    tokio::time::interval(Duration::from_secs(GOSSIP_PERIOD_SECS));
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = interval.tick() => {
                            for (bytes, addr) in engine.gossip_requests() {
                                if let Err(e) = socket.send_to(&bytes, addr).await {
                                    debug!("gossip send to {} failed: {}", addr, e);
                                }
                            }
                        }
                    }
                }
            });
        }

        // (3) GPS discipline ticker.
        {
            let timekeeping = self.timekeeping.clone();
            let mut shutdown = self.shutdown_tx.subscribe();
            tasks.spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(SYNC_INTERVAL_SECS));
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = interval.tick() => {
                            // Failure already logged; the oscillator keeps
                            // free-running on its previous offset.
                            let _ = timekeeping.synchronize();
                        }
                    }
                }
            });
        }

        // (4) Proof ticker.
        {
            let proofs = self.proofs.clone();
            let archive = self.archive.clone();
            let mut shutdown = self.shutdown_tx.subscribe();
            tasks.spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(PROOF_INTERVAL_SECS));
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = interval.tick() => {
                            let proof = match proofs.generate() {
                                Ok(p) => p,
                                Err(e) => {
                                    warn!("proof generation failed: {}", e);
                                    continue;
                                }
                            };
                            // Submission failures are not re-queued; the
                            // chain moves forward regardless.
                            if let Err(e) = archive.submit_proof(&proof).await {
                                warn!("proof submission failed, retrying next interval: {}", e);
                            }
                        }
                    }
                }
            });
        }

        // (5) Consensus refresh.
        {
            let consensus = self.consensus.clone();
            let mut shutdown = self.shutdown_tx.subscribe();
            tasks.spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(PROOF_INTERVAL_SECS));
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = interval.tick() => {
                            match consensus.consensus_time().await {
                                Ok(t) => info!("fleet consensus time: {:.3}", t),
                                Err(e) => debug!("consensus unavailable: {}", e),
                            }
                        }
                    }
                }
            });
        }

        drop(tasks);

        if let Some(peer) = self.bootstrap {
            if let Some(join) = self.engine.bootstrap(peer) {
                match self.socket.send_to(&join, peer).await {
                    Ok(_) => info!("sent join to bootstrap peer {}", peer),
                    Err(e) => warn!("bootstrap join to {} failed: {}", peer, e),
                }
            }
        }
    }

    /// Signal shutdown and wait for the tasks, bounded by the deadline.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);

        let mut tasks = {
            let mut guard = self.tasks.lock().expect("task set poisoned");
            std::mem::take(&mut *guard)
        };

        let deadline = Duration::from_secs(SHUTDOWN_DEADLINE_SECS);
        let drained = tokio::time::timeout(deadline, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!("shutdown deadline exceeded, aborting remaining tasks");
            tasks.abort_all();
        }
    }
}
