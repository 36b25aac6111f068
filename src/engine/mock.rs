//! Scripted negotiation engine for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use super::{
    Description, EngineError, EngineFactory, GatheringState, NegotiationEngine, PeerState, SdpKind,
};

/// Behavior of one scripted step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Succeed,
    Fail,
    /// Never resolves; models an engine that stops calling back.
    Stall,
}

/// Script for a [`MockEngine`] run.
#[derive(Debug, Clone, Copy)]
pub struct MockScript {
    pub set_remote: StepOutcome,
    pub create_answer: StepOutcome,
    pub set_local: StepOutcome,
    /// Delay before gathering reaches Complete. None = never completes.
    pub gathering_delay: Option<Duration>,
    /// How many times the Complete transition fires (spurious double-fire).
    pub gathering_fires: usize,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            set_remote: StepOutcome::Succeed,
            create_answer: StepOutcome::Succeed,
            set_local: StepOutcome::Succeed,
            gathering_delay: Some(Duration::ZERO),
            gathering_fires: 1,
        }
    }
}

pub struct MockEngine {
    script: MockScript,
    calls: Mutex<Vec<&'static str>>,
    closed: AtomicUsize,
    local: Mutex<Option<Description>>,
    gathering_tx: watch::Sender<GatheringState>,
    gathering_rx: watch::Receiver<GatheringState>,
    peer_tx: watch::Sender<PeerState>,
    peer_rx: watch::Receiver<PeerState>,
}

impl MockEngine {
    pub fn new(script: MockScript) -> Arc<Self> {
        let (gathering_tx, gathering_rx) = watch::channel(GatheringState::New);
        let (peer_tx, peer_rx) = watch::channel(PeerState::New);
        Arc::new(Self {
            script,
            calls: Mutex::new(vec![]),
            closed: AtomicUsize::new(0),
            local: Mutex::new(None),
            gathering_tx,
            gathering_rx,
            peer_tx,
            peer_rx,
        })
    }

    async fn run_step(&self, name: &'static str, outcome: StepOutcome) -> Result<(), EngineError> {
        self.calls.lock().unwrap().push(name);
        match outcome {
            StepOutcome::Succeed => Ok(()),
            StepOutcome::Fail => Err(EngineError::new(format!("{name} rejected"))),
            StepOutcome::Stall => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Simulate an engine-side connection state report.
    pub fn report_peer_state(&self, state: PeerState) {
        let _ = self.peer_tx.send(state);
    }
}

#[async_trait]
impl NegotiationEngine for MockEngine {
    async fn set_remote_description(&self, _offer: Description) -> Result<(), EngineError> {
        self.run_step("set_remote_description", self.script.set_remote)
            .await
    }

    async fn create_answer(&self) -> Result<Description, EngineError> {
        self.run_step("create_answer", self.script.create_answer)
            .await?;
        Ok(Description {
            kind: SdpKind::Answer,
            sdp: "v=0\r\ns=mock answer\r\n".to_string(),
        })
    }

    async fn set_local_description(&self, answer: Description) -> Result<(), EngineError> {
        self.run_step("set_local_description", self.script.set_local)
            .await?;
        *self.local.lock().unwrap() = Some(answer);

        // Gathering starts once the local description lands.
        if let Some(delay) = self.script.gathering_delay {
            let tx = self.gathering_tx.clone();
            let fires = self.script.gathering_fires;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(GatheringState::Gathering);
                for _ in 0..fires {
                    let _ = tx.send(GatheringState::Complete);
                }
            });
        }
        Ok(())
    }

    async fn local_description(&self) -> Option<Description> {
        self.local.lock().unwrap().clone()
    }

    fn gathering_state(&self) -> watch::Receiver<GatheringState> {
        self.gathering_rx.clone()
    }

    fn peer_state(&self) -> watch::Receiver<PeerState> {
        self.peer_rx.clone()
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory handing out engines built from one script.
pub struct MockFactory {
    script: MockScript,
    pub fail_connect: bool,
    created: Mutex<Vec<Arc<MockEngine>>>,
}

impl MockFactory {
    pub fn new(script: MockScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            fail_connect: false,
            created: Mutex::new(vec![]),
        })
    }

    pub fn created(&self) -> Vec<Arc<MockEngine>> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl EngineFactory for MockFactory {
    async fn connect(&self) -> Result<Arc<dyn NegotiationEngine>, EngineError> {
        if self.fail_connect {
            return Err(EngineError::new("connect refused"));
        }
        let engine = MockEngine::new(self.script);
        self.created.lock().unwrap().push(Arc::clone(&engine));
        Ok(engine)
    }
}
