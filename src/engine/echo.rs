//! webrtc-rs backed negotiation engine
//!
//! Echo semantics: inbound RTP is written back out on a loopback track of the
//! same kind, and every data-channel message is sent straight back.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};

use super::{
    Description, EngineError, EngineFactory, GatheringState, NegotiationEngine, PeerState, SdpKind,
};
use crate::config::EchoConfig;

/// Builds echo peers from one shared webrtc API object.
///
/// Codec registration and the interceptor pipeline are set up once here; a
/// failure at this point means no negotiation could ever succeed, so it is
/// surfaced at startup rather than per request.
pub struct EchoPeerFactory {
    api: API,
    rtc_config: RTCConfiguration,
    config: EchoConfig,
}

impl EchoPeerFactory {
    pub fn new(config: EchoConfig) -> Result<Self, EngineError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| EngineError::new(format!("register codecs: {e}")))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| EngineError::new(format!("register interceptors: {e}")))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let mut ice_servers = vec![];
        for stun_url in &config.stun_servers {
            ice_servers.push(RTCIceServer {
                urls: vec![stun_url.clone()],
                ..Default::default()
            });
        }
        for turn in &config.turn_servers {
            ice_servers.push(RTCIceServer {
                urls: turn.urls.clone(),
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            });
        }

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        Ok(Self {
            api,
            rtc_config,
            config,
        })
    }
}

#[async_trait]
impl EngineFactory for EchoPeerFactory {
    async fn connect(&self) -> Result<Arc<dyn NegotiationEngine>, EngineError> {
        let peer = EchoPeer::new(&self.api, self.rtc_config.clone(), &self.config).await?;
        Ok(Arc::new(peer))
    }
}

/// One peer connection with echo wiring attached.
pub struct EchoPeer {
    pc: Arc<RTCPeerConnection>,
    gathering_rx: watch::Receiver<GatheringState>,
    peer_rx: watch::Receiver<PeerState>,
}

impl EchoPeer {
    async fn new(
        api: &API,
        rtc_config: RTCConfiguration,
        config: &EchoConfig,
    ) -> Result<Self, EngineError> {
        let pc = api
            .new_peer_connection(rtc_config)
            .await
            .map_err(|e| EngineError::new(format!("create peer connection: {e}")))?;
        let pc = Arc::new(pc);

        let (gathering_tx, gathering_rx) = watch::channel(GatheringState::New);
        let (peer_tx, peer_rx) = watch::channel(PeerState::New);

        pc.on_ice_gathering_state_change(Box::new(move |s: RTCIceGathererState| {
            debug!("ICE gathering state: {s:?}");
            let next = match s {
                RTCIceGathererState::New => Some(GatheringState::New),
                RTCIceGathererState::Gathering => Some(GatheringState::Gathering),
                RTCIceGathererState::Complete => Some(GatheringState::Complete),
                _ => None,
            };
            if let Some(next) = next {
                let _ = gathering_tx.send(next);
            }
            Box::pin(async {})
        }));

        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let next = match s {
                RTCPeerConnectionState::New => PeerState::New,
                RTCPeerConnectionState::Connecting => PeerState::Connecting,
                RTCPeerConnectionState::Connected => PeerState::Connected,
                RTCPeerConnectionState::Disconnected => PeerState::Disconnected,
                RTCPeerConnectionState::Failed => PeerState::Failed,
                RTCPeerConnectionState::Closed => PeerState::Closed,
                _ => return Box::pin(async {}),
            };
            info!("peer connection state: {next}");
            let _ = peer_tx.send(next);
            Box::pin(async {})
        }));

        if config.enable_media {
            Self::setup_media_echo(&pc).await?;
        }

        if config.enable_datachannel {
            Self::setup_datachannel_echo(&pc);
        }

        Ok(Self {
            pc,
            gathering_rx,
            peer_rx,
        })
    }

    /// Pre-add one loopback track per kind, then copy remote RTP onto the
    /// matching track. The tracks must exist before the answer is created so
    /// they are part of the negotiated session.
    async fn setup_media_echo(pc: &Arc<RTCPeerConnection>) -> Result<(), EngineError> {
        let audio_loop = Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                rtcp_feedback: vec![],
            },
            "audio-echo".to_owned(),
            "webrtc-echo".to_owned(),
        ));
        let video_loop = Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            "video-echo".to_owned(),
            "webrtc-echo".to_owned(),
        ));

        for track in [
            Arc::clone(&audio_loop) as Arc<dyn TrackLocal + Send + Sync>,
            Arc::clone(&video_loop) as Arc<dyn TrackLocal + Send + Sync>,
        ] {
            let sender = pc
                .add_track(track)
                .await
                .map_err(|e| EngineError::new(format!("add echo track: {e}")))?;

            // Drain RTCP so the interceptor pipeline keeps running.
            tokio::spawn(async move {
                let mut rtcp_buf = vec![0u8; 1500];
                while let Ok((_, _)) = sender.read(&mut rtcp_buf).await {}
            });
        }

        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let out = if track.kind() == RTPCodecType::Audio {
                Arc::clone(&audio_loop)
            } else {
                Arc::clone(&video_loop)
            };
            Box::pin(async move {
                let mime = track.codec().capability.mime_type.clone();
                info!("remote {} track started ({mime})", track.kind());
                while let Ok((rtp, _)) = track.read_rtp().await {
                    // write_rtp rewrites SSRC and payload type per binding
                    if let Err(e) = out.write_rtp(&rtp).await {
                        debug!("echo track write stopped: {e}");
                        break;
                    }
                }
                info!("remote track ended ({mime})");
            })
        }));

        Ok(())
    }

    /// The peer opens the channel; every message on it is sent straight back.
    fn setup_datachannel_echo(pc: &Arc<RTCPeerConnection>) {
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            Box::pin(async move {
                info!("data channel opened: {}", dc.label());
                let reply = Arc::clone(&dc);
                dc.on_message(Box::new(move |msg: DataChannelMessage| {
                    let reply = Arc::clone(&reply);
                    Box::pin(async move {
                        debug!("echoing {} bytes", msg.data.len());
                        let result = if msg.is_string {
                            match String::from_utf8(msg.data.to_vec()) {
                                Ok(text) => reply.send_text(text).await,
                                Err(_) => reply.send(&msg.data).await,
                            }
                        } else {
                            reply.send(&msg.data).await
                        };
                        if let Err(e) = result {
                            warn!("data channel echo failed: {e}");
                        }
                    })
                }));
            })
        }));
    }
}

#[async_trait]
impl NegotiationEngine for EchoPeer {
    async fn set_remote_description(&self, offer: Description) -> Result<(), EngineError> {
        let sdp = to_rtc_description(&offer)?;
        self.pc
            .set_remote_description(sdp)
            .await
            .map_err(|e| EngineError::new(e.to_string()))
    }

    async fn create_answer(&self) -> Result<Description, EngineError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| EngineError::new(e.to_string()))?;
        Ok(Description {
            kind: SdpKind::Answer,
            sdp: answer.sdp,
        })
    }

    async fn set_local_description(&self, answer: Description) -> Result<(), EngineError> {
        let sdp = to_rtc_description(&answer)?;
        self.pc
            .set_local_description(sdp)
            .await
            .map_err(|e| EngineError::new(e.to_string()))
    }

    async fn local_description(&self) -> Option<Description> {
        self.pc.local_description().await.map(|d| Description {
            kind: match d.sdp_type {
                RTCSdpType::Offer => SdpKind::Offer,
                _ => SdpKind::Answer,
            },
            sdp: d.sdp,
        })
    }

    fn gathering_state(&self) -> watch::Receiver<GatheringState> {
        self.gathering_rx.clone()
    }

    fn peer_state(&self) -> watch::Receiver<PeerState> {
        self.peer_rx.clone()
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            warn!("peer connection close: {e}");
        }
    }
}

fn to_rtc_description(desc: &Description) -> Result<RTCSessionDescription, EngineError> {
    match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp.clone()),
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp.clone()),
    }
    .map_err(|e| EngineError::new(format!("parse sdp: {e}")))
}
