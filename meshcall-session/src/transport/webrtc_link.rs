use crate::transport::{
    ConnectionHandle, LinkConfig, LinkEvent, LinkFactory, LocalTrack, PeerLink, SdpKind,
    SessionDescription, TrackRegistry,
};
use anyhow::Result;
use async_trait::async_trait;
use meshcall_core::IceCandidate;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// [`PeerLink`] backed by a `webrtc` peer connection.
pub struct WebRtcLink {
    handle: ConnectionHandle,
    peer_connection: Arc<RTCPeerConnection>,
    tracks: TrackRegistry,
}

impl WebRtcLink {
    pub async fn new(
        handle: ConnectionHandle,
        config: &LinkConfig,
        tracks: TrackRegistry,
        event_tx: mpsc::Sender<LinkEvent>,
    ) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);

        let state_tx = event_tx.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();

                Box::pin(async move {
                    info!("Link state for {}: {:?}", handle.peer_id, s);
                    if s == RTCPeerConnectionState::Failed {
                        let _ = tx.send(LinkEvent::Failed(handle)).await;
                    }
                })
            },
        ));

        let ice_tx = event_tx.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let candidate = IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                };
                let _ = tx
                    .send(LinkEvent::CandidateGenerated(handle, candidate))
                    .await;
            })
        }));

        let track_tx = event_tx;
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = track_tx.clone();

                Box::pin(async move {
                    debug!("Remote track {} from {}", track.id(), handle.peer_id);
                    let _ = tx.send(LinkEvent::RemoteTrack(handle, track.id())).await;
                })
            },
        ));

        Ok(Self {
            handle,
            peer_connection,
            tracks,
        })
    }
}

#[async_trait]
impl PeerLink for WebRtcLink {
    async fn sync_tracks(&self, tracks: &[LocalTrack]) -> Result<()> {
        let wanted: HashSet<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
        let mut present = HashSet::new();

        for sender in self.peer_connection.get_senders().await {
            let Some(track) = sender.track().await else {
                continue;
            };
            let id = track.id().to_owned();
            if wanted.contains(id.as_str()) {
                present.insert(id);
            } else {
                debug!("Removing stale sender {} towards {}", id, self.handle.peer_id);
                self.peer_connection.remove_track(&sender).await?;
            }
        }

        for track in tracks.iter().filter(|t| !present.contains(&t.id)) {
            let local: Arc<dyn TrackLocal + Send + Sync> = self.tracks.track_for(track);
            self.peer_connection.add_track(local).await?;
        }

        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(offer.sdp)
    }

    async fn create_answer(&self) -> Result<String> {
        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(answer.sdp)
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let desc = match description.kind {
            SdpKind::Offer => RTCSessionDescription::offer(description.sdp)?,
            SdpKind::Answer => RTCSessionDescription::answer(description.sdp)?,
        };
        self.peer_connection.set_remote_description(desc).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: None,
        };
        self.peer_connection.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut desc = RTCSessionDescription::default();
        desc.sdp_type = RTCSdpType::Rollback;
        if let Err(e) = self.peer_connection.set_local_description(desc).await {
            warn!("Rollback towards {} failed: {}", self.handle.peer_id, e);
            return Err(e.into());
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

/// Creates a [`WebRtcLink`] per peer, all sharing one [`TrackRegistry`].
#[derive(Clone, Default)]
pub struct WebRtcLinkFactory {
    config: LinkConfig,
    tracks: TrackRegistry,
}

impl WebRtcLinkFactory {
    pub fn new(config: LinkConfig, tracks: TrackRegistry) -> Self {
        Self { config, tracks }
    }

    pub fn tracks(&self) -> &TrackRegistry {
        &self.tracks
    }
}

#[async_trait]
impl LinkFactory for WebRtcLinkFactory {
    async fn create(
        &self,
        handle: ConnectionHandle,
        events: mpsc::Sender<LinkEvent>,
    ) -> Result<Box<dyn PeerLink>> {
        let link = WebRtcLink::new(handle, &self.config, self.tracks.clone(), events).await?;
        Ok(Box::new(link))
    }
}
