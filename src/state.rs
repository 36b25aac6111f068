//! Shared application state

use std::sync::Arc;

use crate::bridge::SignalingBridge;
use crate::config::EchoConfig;
use crate::registry::ConnectionRegistry;

/// State shared across HTTP handlers.
pub struct AppState {
    pub config: EchoConfig,
    pub registry: Arc<ConnectionRegistry>,
    pub bridge: Arc<SignalingBridge>,
}

impl AppState {
    pub fn new(
        config: EchoConfig,
        registry: Arc<ConnectionRegistry>,
        bridge: Arc<SignalingBridge>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry,
            bridge,
        })
    }
}
