//! Signaling bridge
//!
//! Converts one synchronous "offer in, answer out" call into the asynchronous
//! negotiation sequence of the engine. The caller parks on a single-assignment
//! result slot with a bounded wait; all progress happens on the driver task
//! and the engine's own callbacks, never on the caller's thread.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::engine::{
    Description, EngineError, EngineFactory, GatheringState, PeerState, SdpKind,
};
use crate::error::{EchoError, NegotiationStep, Result};
use crate::registry::{ConnectionRegistry, Session, SessionState};

type Outcome = Result<Description>;

/// Single-assignment completion slot for one negotiation.
///
/// The first writer wins; later writes are dropped, so a duplicate or late
/// callback can never overwrite a resolved result.
struct PendingResult {
    tx: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl PendingResult {
    fn new() -> (Arc<Self>, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Self {
            tx: Mutex::new(Some(tx)),
        });
        (slot, rx)
    }

    /// Write the outcome. Returns false when the slot was already written or
    /// the waiter has gone away.
    fn complete(&self, outcome: Outcome) -> bool {
        let mut slot = match self.tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match slot.take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }
}

/// Orchestrates offer/answer negotiation between the HTTP layer and the
/// negotiation engine.
pub struct SignalingBridge {
    factory: Arc<dyn EngineFactory>,
    registry: Arc<ConnectionRegistry>,
    timeout: Duration,
}

impl SignalingBridge {
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        registry: Arc<ConnectionRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            factory,
            registry,
            timeout,
        }
    }

    /// Negotiate one answer for `sdp`. Returns within the configured timeout
    /// with exactly one of: the finalized answer or a specific failure.
    ///
    /// Any failure after the session exists tears the session down before
    /// this returns.
    pub async fn negotiate(&self, kind: &str, sdp: &str) -> Result<Description> {
        let kind = kind
            .parse::<SdpKind>()
            .map_err(|e| EchoError::InvalidOffer(e.to_string()))?;
        if kind != SdpKind::Offer {
            return Err(EchoError::InvalidOffer(
                "type must be \"offer\"".to_string(),
            ));
        }
        if sdp.trim().is_empty() {
            return Err(EchoError::InvalidOffer("empty sdp".to_string()));
        }

        let engine = self
            .factory
            .connect()
            .await
            .map_err(|e| EchoError::EngineUnavailable(e.to_string()))?;
        let session = self.registry.create(engine).await?;

        let (pending, result) = PendingResult::new();
        let offer = Description {
            kind,
            sdp: sdp.to_owned(),
        };

        tokio::spawn(drive(Arc::clone(&session), offer, pending));
        tokio::spawn(watch_peer(Arc::clone(&self.registry), Arc::clone(&session)));

        match tokio::time::timeout(self.timeout, result).await {
            Ok(Ok(Ok(answer))) => {
                info!(session = %session.id, "negotiation complete");
                Ok(answer)
            }
            Ok(Ok(Err(err))) => {
                self.registry.remove(&session.id).await;
                Err(err)
            }
            Ok(Err(_)) => {
                // Driver dropped the slot without writing it.
                session.advance(SessionState::Failed);
                self.registry.remove(&session.id).await;
                Err(EchoError::Internal("negotiation aborted".to_string()))
            }
            Err(_) => {
                warn!(session = %session.id, timeout = ?self.timeout, "negotiation timed out");
                session.advance(SessionState::Failed);
                self.registry.remove(&session.id).await;
                Err(EchoError::NegotiationTimeout(self.timeout))
            }
        }
    }
}

/// Run the negotiation steps and write the single result.
async fn drive(session: Arc<Session>, offer: Description, pending: Arc<PendingResult>) {
    let outcome = run_steps(&session, offer).await;
    if outcome.is_err() {
        session.advance(SessionState::Failed);
    }
    if !pending.complete(outcome) {
        // The caller gave up first; the slot silently drops the late write.
        debug!(session = %session.id, "late negotiation result dropped");
    }
}

/// The five-step sequence. Step N+1 only ever starts after step N resolved;
/// a failure stops the chain immediately.
async fn run_steps(session: &Session, offer: Description) -> Outcome {
    let engine = session.engine();

    engine
        .set_remote_description(offer)
        .await
        .map_err(|e| step_failure(NegotiationStep::SetRemoteDescription, e))?;
    session.advance(SessionState::RemoteSet);

    let answer = engine
        .create_answer()
        .await
        .map_err(|e| step_failure(NegotiationStep::CreateAnswer, e))?;
    session.advance(SessionState::AnswerCreated);

    engine
        .set_local_description(answer)
        .await
        .map_err(|e| step_failure(NegotiationStep::SetLocalDescription, e))?;
    session.advance(SessionState::LocalSet);

    // Non-trickle: the answer is only final once gathering has completed.
    let mut gathering = engine.gathering_state();
    loop {
        if *gathering.borrow_and_update() == GatheringState::Complete {
            break;
        }
        if gathering.changed().await.is_err() {
            return Err(step_failure(
                NegotiationStep::GatherCandidates,
                EngineError::new("engine dropped while gathering"),
            ));
        }
    }
    session.advance(SessionState::GatheringComplete);

    engine.local_description().await.ok_or_else(|| {
        step_failure(
            NegotiationStep::GatherCandidates,
            EngineError::new("no local description after gathering"),
        )
    })
}

fn step_failure(step: NegotiationStep, err: EngineError) -> EchoError {
    EchoError::NegotiationFailed {
        step,
        reason: err.to_string(),
    }
}

/// Mirror engine-reported terminal states into the registry so a dropped
/// peer cannot leak its session. Registry removal is idempotent, so racing
/// the explicit failure path is harmless.
async fn watch_peer(registry: Arc<ConnectionRegistry>, session: Arc<Session>) {
    let mut peer = session.engine().peer_state();
    loop {
        let state = *peer.borrow_and_update();
        match state {
            PeerState::Connected => session.advance(SessionState::Connected),
            PeerState::Failed => {
                session.advance(SessionState::Failed);
                registry.remove(&session.id).await;
                return;
            }
            PeerState::Disconnected | PeerState::Closed => {
                session.advance(SessionState::Closed);
                registry.remove(&session.id).await;
                return;
            }
            PeerState::New | PeerState::Connecting => {}
        }
        if peer.changed().await.is_err() {
            return;
        }
    }
}
