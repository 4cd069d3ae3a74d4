pub mod mesh_tests;
pub mod reconnect_tests;

use std::sync::Arc;
use tracing::Level;

use meshcall_core::{PeerId, Profile, Role, Sender, SessionCode};
use meshcall_session::{
    Collaborators, LocalRelay, LocalRelayTransport, LocalTrack, SessionConfig,
    SessionCoordinator, SessionHandle, SessionParams, TrackKind,
};

use crate::utils::{
    FakeLinkFactory, FakeMicrophone, MemorySink, ReversingCipher, ScriptedCapture,
    hold_resync_roster,
};

pub const SESSION: &str = "test-session";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        reconcile_timeout_ms: 200,
        ..Default::default()
    }
}

pub struct PeerOptions {
    pub role: Role,
    /// Declare a microphone track right after spawning.
    pub declare_media: bool,
    /// Deliver the roster that follows a reconnect after the first offer.
    pub hold_resync_roster: bool,
    pub config: SessionConfig,
}

impl Default for PeerOptions {
    fn default() -> Self {
        Self {
            role: Role::Member,
            declare_media: true,
            hold_resync_roster: false,
            config: test_config(),
        }
    }
}

impl PeerOptions {
    pub fn president() -> Self {
        Self {
            role: Role::President,
            ..Default::default()
        }
    }
}

/// One running engine plus the fakes wired into it.
pub struct TestPeer {
    pub handle: SessionHandle,
    pub transport: Arc<LocalRelayTransport>,
    pub links: FakeLinkFactory,
    pub sink: MemorySink,
    pub capture: ScriptedCapture,
    pub microphone: FakeMicrophone,
}

impl TestPeer {
    pub fn id(&self) -> PeerId {
        self.handle.peer_id()
    }
}

pub fn mic_track(name: &str) -> LocalTrack {
    LocalTrack::new(format!("{name}-mic"), TrackKind::Audio)
}

pub async fn spawn_peer(relay: &LocalRelay, name: &str) -> TestPeer {
    spawn_peer_with(relay, name, PeerOptions::default()).await
}

pub async fn spawn_peer_with(relay: &LocalRelay, name: &str, options: PeerOptions) -> TestPeer {
    let (transport, transport_rx) = relay.connect();
    let transport = Arc::new(transport);
    let transport_rx = if options.hold_resync_roster {
        hold_resync_roster(transport_rx)
    } else {
        transport_rx
    };

    let local = Sender {
        peer_id: PeerId::new(),
        profile: Profile::new(name, name),
        role: options.role,
    };
    let params =
        SessionParams::new(SessionCode::new(SESSION), local).with_config(options.config);

    let links = FakeLinkFactory::new();
    let sink = MemorySink::default();
    let capture = ScriptedCapture::default();
    let microphone = FakeMicrophone::default();
    let collaborators = Collaborators {
        cipher: Arc::new(ReversingCipher),
        sink: Arc::new(sink.clone()),
        capture: Box::new(capture.clone()),
        microphone: Arc::new(microphone.clone()),
    };

    let (coordinator, handle) = SessionCoordinator::new(
        params,
        transport.clone(),
        transport_rx,
        Arc::new(links.clone()),
        collaborators,
    );
    tokio::spawn(coordinator.run());

    if options.declare_media {
        handle
            .set_local_tracks(vec![mic_track(name)])
            .await
            .expect("Failed to declare local media");
    }

    TestPeer {
        handle,
        transport,
        links,
        sink,
        capture,
        microphone,
    }
}
