//! Echo server configuration

use std::time::Duration;

/// Echo server configuration
#[derive(Debug, Clone)]
pub struct EchoConfig {
    /// STUN server URLs
    pub stun_servers: Vec<String>,
    /// TURN server configuration
    pub turn_servers: Vec<TurnServer>,
    /// Ceiling on one offer/answer negotiation, ICE gathering included
    pub negotiation_timeout: Duration,
    /// Maximum concurrent sessions
    pub max_sessions: usize,
    /// Pre-add Opus/VP8 loopback tracks
    pub enable_media: bool,
    /// Echo data-channel messages back to the peer
    pub enable_datachannel: bool,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            // Empty STUN list works for local peers - host candidates suffice.
            // Configure STUN/TURN for peers behind NAT.
            stun_servers: vec![],
            turn_servers: vec![],
            negotiation_timeout: Duration::from_secs(5),
            max_sessions: 8,
            enable_media: true,
            enable_datachannel: true,
        }
    }
}

/// TURN server configuration
#[derive(Debug, Clone)]
pub struct TurnServer {
    /// TURN server URLs (multiple URLs allow UDP/TCP transport fallback)
    pub urls: Vec<String>,
    /// Username for TURN authentication
    pub username: String,
    /// Credential for TURN authentication
    pub credential: String,
}

impl TurnServer {
    /// Create a TurnServer with a single URL
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: vec![url.into()],
            username: username.into(),
            credential: credential.into(),
        }
    }
}
