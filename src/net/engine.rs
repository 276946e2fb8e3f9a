//! The sync engine: peer set, ping–pong latency cancellation, and
//! fault-tolerant median fusion.
//!
//! All shared state sits behind one mutex, held only for the discrete
//! mutations below, never across I/O. The engine itself is socket-free;
//! the node's receiver and gossip tasks feed it datagrams and ship out
//! whatever it returns, which also makes every path here drivable from
//! plain synchronous tests.
//!
//! Request lifecycle per peer: Idle → AwaitingResponse(t1) → fused, or
//! timed out after 1 s and dropped without marking the peer faulty.

use super::auth::{AuthError, Authenticator, RejectCounters, ReplayCache};
use super::message::{Message, MessageKind, TimeResponsePayload};
use crate::hlc::{HlcClock, HlcTimestamp};
use crate::oscillator::Oscillator;
use crate::types::{
    FUSION_LOCAL_WEIGHT, LATENCY_EMA_ALPHA, NodeId, RESPONSE_TIMEOUT_SECS, now_wall,
};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A peer we gossip with. Eviction is the discovery layer's concern, not
/// ours; the core never removes entries.
#[derive(Debug, Clone)]
pub struct Peer {
    pub addr: SocketAddr,
    /// Rolling one-way latency estimate in seconds (EMA, α = 0.5).
    pub latency: Option<f64>,
}

impl Peer {
    fn new(addr: SocketAddr) -> Self {
        Self { addr, latency: None }
    }
}

/// One latency-corrected observation of a peer's physical clock.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub adjusted: f64,
    pub peer: SocketAddr,
}

/// AwaitingResponse state for an in-flight time_request.
#[derive(Debug, Clone)]
struct PendingRequest {
    t1: f64,
    sent_at: Instant,
}

struct EngineState {
    peers: HashMap<SocketAddr, Peer>,
    window: VecDeque<Sample>,
    physical_clock: f64,
    logical_clock: u64,
    hlc: HlcClock,
    replay: ReplayCache,
    pending: HashMap<SocketAddr, PendingRequest>,
    counters: RejectCounters,
}

/// Full state snapshot, used by stats reporting and the
/// untouched-after-rejection tests.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSnapshot {
    pub peers: Vec<SocketAddr>,
    pub window: Vec<Sample>,
    pub physical_clock: f64,
    pub logical_clock: u64,
    pub hlc: HlcTimestamp,
    pub replay_len: usize,
    pub counters: RejectCounters,
}

pub struct SyncEngine {
    node_id: NodeId,
    oscillator: Arc<Oscillator>,
    auth: Authenticator,
    fault_tolerance: usize,
    uncertainty: f64,
    state: Mutex<EngineState>,
}

impl SyncEngine {
    pub fn new(
        node_id: NodeId,
        oscillator: Arc<Oscillator>,
        shared_key: Vec<u8>,
        fault_tolerance: usize,
        uncertainty: f64,
    ) -> Self {
        let now = oscillator.time();
        Self {
            node_id: node_id.clone(),
            oscillator,
            auth: Authenticator::new(shared_key),
            fault_tolerance,
            uncertainty,
            state: Mutex::new(EngineState {
                peers: HashMap::new(),
                window: VecDeque::new(),
                physical_clock: now,
                logical_clock: 0,
                hlc: HlcClock::new(node_id, now),
                replay: ReplayCache::new(),
                pending: HashMap::new(),
                counters: RejectCounters::default(),
            }),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Sample window capacity: 2F + 1.
    pub fn window_capacity(&self) -> usize {
        2 * self.fault_tolerance + 1
    }

    /// The bounded-time primitive: a half-open interval guaranteed to
    /// contain the true time, `[pt − U, pt + U]` with
    /// `pt = max(oscillator, hlc.pt)`.
    pub fn get_current_time(&self) -> (f64, f64) {
        let state = self.lock();
        let pt = self.oscillator.time().max(state.hlc.current().pt);
        (pt - self.uncertainty, pt + self.uncertainty)
    }

    /// Register the bootstrap peer and produce the signed JOIN datagram.
    pub fn bootstrap(&self, peer: SocketAddr) -> Option<Vec<u8>> {
        let hlc = {
            let mut state = self.lock();
            state.peers.entry(peer).or_insert_with(|| Peer::new(peer));
            state.hlc.current().clone()
        };
        let mut msg = Message::join(self.node_id.clone(), hlc, now_wall());
        self.seal(&mut msg)
    }

    /// One gossip tick: expire timed-out requests, then emit a signed
    /// time_request for every known peer and mark it in flight.
    ///
    /// The lock covers only the pending-map mutation; signing happens
    /// after it is released.
    pub fn gossip_requests(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        let timeout = Duration::from_secs(RESPONSE_TIMEOUT_SECS);

        let (requests, hlc) = {
            let mut state = self.lock();
            let now = Instant::now();
            state
                .pending
                .retain(|_, req| now.duration_since(req.sent_at) < timeout);

            let peers: Vec<SocketAddr> = state.peers.keys().copied().collect();
            let mut requests = Vec::with_capacity(peers.len());
            for addr in peers {
                let t1 = self.oscillator.time();
                state.pending.insert(
                    addr,
                    PendingRequest {
                        t1,
                        sent_at: Instant::now(),
                    },
                );
                requests.push((addr, t1));
            }
            (requests, state.hlc.current().clone())
        };

        let mut out = Vec::with_capacity(requests.len());
        for (addr, t1) in requests {
            let mut msg = Message::time_request(self.node_id.clone(), hlc.clone(), now_wall(), t1);
            if let Some(bytes) = self.seal(&mut msg) {
                out.push((bytes, addr));
            }
        }
        out
    }

    /// Feed one inbound datagram through the gate and dispatch it.
    /// Returns the reply to send back, if any (only time_requests reply).
    pub fn process_datagram(&self, raw: &[u8], from: SocketAddr) -> Option<Vec<u8>> {
        // Receipt stamp: t2 for a request we answer, t4 for a response.
        let received_at = self.oscillator.time();
        let now = now_wall();

        let msg = match self.auth.decode(raw, now) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("dropping datagram from {}: {}", from, e);
                self.lock().counters.record(&e);
                return None;
            }
        };

        let mut state = self.lock();
        if !state.replay.check_and_insert(msg.id(), now) {
            debug!("dropping replayed {} from {}", msg.kind.as_str(), from);
            state.counters.record(&AuthError::Replay);
            return None;
        }

        match msg.kind {
            MessageKind::Join => {
                if let std::collections::hash_map::Entry::Vacant(entry) = state.peers.entry(from) {
                    entry.insert(Peer::new(from));
                    info!("peer joined: {}", from);
                }
                None
            }
            MessageKind::TimeRequest => {
                let t1 = match msg.time_request_payload() {
                    Ok(p) => p.t1,
                    Err(e) => {
                        state.counters.record(&AuthError::Parse(e));
                        return None;
                    }
                };
                let payload = TimeResponsePayload {
                    t1,
                    t2: received_at,
                    t3: self.oscillator.time(),
                    physical_clock: state.physical_clock,
                    logical_clock: state.logical_clock,
                    hlc: state.hlc.current().clone(),
                };
                let hlc = state.hlc.current().clone();
                drop(state);

                let mut reply =
                    Message::time_response(self.node_id.clone(), hlc, now_wall(), &payload).ok()?;
                self.seal(&mut reply)
            }
            MessageKind::TimeResponse => {
                let payload = match msg.time_response_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        state.counters.record(&AuthError::Parse(e));
                        return None;
                    }
                };
                self.apply_time_response(&mut state, from, &payload, received_at);
                None
            }
        }
    }

    /// Requester side of the ping–pong: latency cancellation, sample
    /// insertion, fusion, HLC merge.
    fn apply_time_response(
        &self,
        state: &mut EngineState,
        from: SocketAddr,
        p: &TimeResponsePayload,
        t4: f64,
    ) {
        // Only answers to our own in-flight request count; anything else
        // is late or unsolicited and drops without a trace.
        let Some(pending) = state.pending.remove(&from) else {
            return;
        };
        if pending.t1 != p.t1 {
            return;
        }

        let rtt = ((t4 - p.t1) - (p.t3 - p.t2)).max(0.0);
        let offset = ((p.t2 - p.t1) + (p.t3 - t4)) / 2.0;
        let half_rtt = rtt / 2.0;

        if let Some(peer) = state.peers.get_mut(&from) {
            peer.latency = Some(match peer.latency {
                Some(prev) => LATENCY_EMA_ALPHA * half_rtt + (1.0 - LATENCY_EMA_ALPHA) * prev,
                None => half_rtt,
            });
        }

        // Project the peer's clock to "now" on our side.
        let adjusted = p.physical_clock + offset + half_rtt;
        let fused = self.push_sample(state, adjusted, from);

        // The responder's HLC folds in only after fusion. Before the
        // window is full its physical component has not been outvoted by
        // the median, and a single fast-clocked peer could drag our
        // `hlc.pt` forward on its first response.
        if fused {
            state.hlc.merge(self.oscillator.time(), &p.hlc);
        }
    }

    /// Insert a latency-corrected sample directly. The normal path goes
    /// through `process_datagram`; tests drive fusion through this.
    pub fn record_sample(&self, adjusted: f64, peer: SocketAddr) {
        let mut state = self.lock();
        self.push_sample(&mut state, adjusted, peer);
    }

    /// Returns true when the window was full and fusion ran.
    fn push_sample(&self, state: &mut EngineState, adjusted: f64, peer: SocketAddr) -> bool {
        let capacity = self.window_capacity();

        state.window.push_back(Sample { adjusted, peer });
        while state.window.len() > capacity {
            state.window.pop_front();
        }

        // Median fusion only once the window is full. The sorted middle of
        // 2F+1 samples is an honest value as long as at most F lie.
        if state.window.len() < capacity {
            return false;
        }

        let mut times: Vec<f64> = state.window.iter().map(|s| s.adjusted).collect();
        times.sort_by(f64::total_cmp);
        let median = times[capacity / 2];

        state.physical_clock =
            FUSION_LOCAL_WEIGHT * state.physical_clock + (1.0 - FUSION_LOCAL_WEIGHT) * median;
        state.logical_clock += 1;
        let fused = state.physical_clock;
        state.hlc.tick(fused);
        true
    }

    fn seal(&self, msg: &mut Message) -> Option<Vec<u8>> {
        match msg.sign(self.auth.key()) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!("failed to encode outbound {}: {}", msg.kind.as_str(), e);
                None
            }
        }
    }

    pub fn physical_clock(&self) -> f64 {
        self.lock().physical_clock
    }

    pub fn hlc(&self) -> HlcTimestamp {
        self.lock().hlc.current().clone()
    }

    pub fn peer_count(&self) -> usize {
        self.lock().peers.len()
    }

    pub fn peer_latency(&self, addr: &SocketAddr) -> Option<f64> {
        self.lock().peers.get(addr).and_then(|p| p.latency)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let state = self.lock();
        let mut peers: Vec<SocketAddr> = state.peers.keys().copied().collect();
        peers.sort();
        EngineSnapshot {
            peers,
            window: state.window.iter().cloned().collect(),
            physical_clock: state.physical_clock,
            logical_clock: state.logical_clock,
            hlc: state.hlc.current().clone(),
            replay_len: state.replay.len(),
            counters: state.counters,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().expect("engine state poisoned")
    }
}
