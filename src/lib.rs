//! webrtc-echo - WebRTC echo server
//!
//! Accepts an SDP offer over HTTP, drives the asynchronous offer/answer
//! negotiation to completion, and echoes whatever the peer then sends
//! (RTP media and data-channel messages) straight back.

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod state;
pub mod web;

pub use error::{EchoError, Result};
