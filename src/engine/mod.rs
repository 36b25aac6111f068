//! Negotiation engine seam
//!
//! All of the hard WebRTC machinery (ICE, DTLS-SRTP, SDP, RTP) lives behind
//! this trait. The signaling bridge only ever drives the offer/answer sequence
//! through it, so the webrtc-rs backend stays swappable and mockable.

pub mod echo;
#[cfg(test)]
pub(crate) mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

pub use echo::{EchoPeer, EchoPeerFactory};

/// Error raised by a single negotiation engine step.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct EngineError(String);

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// SDP message kind as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

impl SdpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpKind::Offer => "offer",
            SdpKind::Answer => "answer",
        }
    }
}

impl std::fmt::Display for SdpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SdpKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offer" => Ok(SdpKind::Offer),
            "answer" => Ok(SdpKind::Answer),
            other => Err(EngineError::new(format!("unknown sdp type \"{other}\""))),
        }
    }
}

/// One SDP description crossing the engine seam.
#[derive(Debug, Clone)]
pub struct Description {
    pub kind: SdpKind,
    pub sdp: String,
}

/// ICE candidate gathering progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatheringState {
    New,
    Gathering,
    Complete,
}

/// Peer connection state as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PeerState::Disconnected | PeerState::Failed | PeerState::Closed
        )
    }
}

impl std::fmt::Display for PeerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerState::New => write!(f, "new"),
            PeerState::Connecting => write!(f, "connecting"),
            PeerState::Connected => write!(f, "connected"),
            PeerState::Disconnected => write!(f, "disconnected"),
            PeerState::Failed => write!(f, "failed"),
            PeerState::Closed => write!(f, "closed"),
        }
    }
}

/// Asynchronous offer/answer negotiation, consumed as an opaque capability.
///
/// The underlying stack completes each operation on its own internal threads;
/// callback-style completion is re-expressed here as async methods plus watch
/// subscriptions for the two state streams.
#[async_trait]
pub trait NegotiationEngine: Send + Sync {
    async fn set_remote_description(&self, offer: Description) -> Result<(), EngineError>;

    async fn create_answer(&self) -> Result<Description, EngineError>;

    async fn set_local_description(&self, answer: Description) -> Result<(), EngineError>;

    /// Current local description. Only final once gathering has completed.
    async fn local_description(&self) -> Option<Description>;

    /// Subscribe to ICE gathering progress.
    fn gathering_state(&self) -> watch::Receiver<GatheringState>;

    /// Subscribe to peer connection state.
    fn peer_state(&self) -> watch::Receiver<PeerState>;

    async fn close(&self);
}

/// Explicitly owned factory for engine connections.
///
/// Constructed once at startup and passed into the dispatcher; there is no
/// process-wide singleton.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn NegotiationEngine>, EngineError>;
}
