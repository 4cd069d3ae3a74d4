use meshcall_core::ConnectionState;
use meshcall_session::{LocalRelay, LocalTrack, TrackKind};

use crate::integration::{init_tracing, mic_track, spawn_peer};
use crate::utils::{WAIT_TIMEOUT_MS, wait_for_mesh, wait_for_snapshot};

#[tokio::test]
async fn test_track_change_renegotiates_every_link() {
    init_tracing();

    let relay = LocalRelay::new();
    let alice = spawn_peer(&relay, "alice").await;
    let bob = spawn_peer(&relay, "bob").await;
    let carol = spawn_peer(&relay, "carol").await;
    wait_for_mesh(&[&alice.handle, &bob.handle, &carol.handle], WAIT_TIMEOUT_MS)
        .await
        .expect("Mesh of three never formed");

    let to_bob = alice.links.offers_to(&bob.id());
    let to_carol = alice.links.offers_to(&carol.id());

    let camera = LocalTrack::new("alice-cam", TrackKind::Video);
    alice
        .handle
        .set_local_tracks(vec![mic_track("alice"), camera])
        .await
        .unwrap();

    wait_for_snapshot(&alice.handle, WAIT_TIMEOUT_MS, |s| {
        alice.links.offers_to(&bob.id()) == to_bob + 1
            && alice.links.offers_to(&carol.id()) == to_carol + 1
            && s.peers
                .iter()
                .all(|p| p.connection_state == ConnectionState::Connected)
    })
    .await
    .expect("Renegotiation never completed");

    for peer in [&bob, &carol] {
        let synced = alice.links.synced_tracks(&peer.id());
        assert!(synced.contains(&"alice-cam".to_string()));
        assert!(synced.contains(&"alice-mic".to_string()));
    }

    alice.handle.leave().await.unwrap();
    bob.handle.leave().await.unwrap();
    carol.handle.leave().await.unwrap();
}

#[tokio::test]
async fn test_mute_does_not_renegotiate() {
    init_tracing();

    let relay = LocalRelay::new();
    let alice = spawn_peer(&relay, "alice").await;
    let bob = spawn_peer(&relay, "bob").await;
    wait_for_mesh(&[&alice.handle, &bob.handle], WAIT_TIMEOUT_MS)
        .await
        .unwrap();

    let offers = alice.links.offers_to(&bob.id());

    alice.handle.set_microphone_enabled(false).await.unwrap();
    alice
        .handle
        .set_local_tracks(vec![mic_track("alice")])
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    assert_eq!(alice.links.offers_to(&bob.id()), offers);
    assert_eq!(alice.microphone.switches(), vec![false]);
    let snapshot = alice.handle.snapshot().await.unwrap();
    assert_eq!(
        snapshot.peer(&bob.id()).unwrap().connection_state,
        ConnectionState::Connected
    );

    alice.handle.leave().await.unwrap();
    bob.handle.leave().await.unwrap();
}
