use crate::transport::{LocalTrack, TrackKind};
use dashmap::DashMap;
use std::sync::Arc;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

const STREAM_ID: &str = "meshcall";

/// Local WebRTC tracks keyed by track id.
///
/// The capture side writes samples into the tracks returned here; every
/// link sends the same track objects.
#[derive(Clone, Default)]
pub struct TrackRegistry {
    tracks: Arc<DashMap<String, Arc<TrackLocalStaticSample>>>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_for(&self, track: &LocalTrack) -> Arc<TrackLocalStaticSample> {
        self.tracks
            .entry(track.id.clone())
            .or_insert_with(|| {
                Arc::new(TrackLocalStaticSample::new(
                    codec_for(track.kind),
                    track.id.clone(),
                    STREAM_ID.to_owned(),
                ))
            })
            .clone()
    }

    pub fn get(&self, track_id: &str) -> Option<Arc<TrackLocalStaticSample>> {
        self.tracks.get(track_id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, track_id: &str) {
        self.tracks.remove(track_id);
    }
}

fn codec_for(kind: TrackKind) -> RTCRtpCodecCapability {
    match kind {
        TrackKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48_000,
            channels: 2,
            ..Default::default()
        },
        TrackKind::Video | TrackKind::Screen => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90_000,
            ..Default::default()
        },
    }
}
