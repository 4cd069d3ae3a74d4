use meshcall_core::SessionState;
use meshcall_session::{LocalRelay, SessionEvent, SessionStatus};

use crate::integration::{PeerOptions, init_tracing, spawn_peer, spawn_peer_with};
use crate::utils::{WAIT_TIMEOUT_MS, wait_for_event, wait_for_mesh, wait_for_snapshot};

#[tokio::test]
async fn test_flags_withdrawn_while_offline_are_dropped() {
    init_tracing();

    let relay = LocalRelay::new();
    let alice = spawn_peer_with(&relay, "alice", PeerOptions::president()).await;
    let bob = spawn_peer(&relay, "bob").await;
    let carol = spawn_peer(&relay, "carol").await;
    wait_for_mesh(&[&alice.handle, &bob.handle, &carol.handle], WAIT_TIMEOUT_MS)
        .await
        .expect("Mesh of three never formed");

    alice.handle.acquire_screen_share().await.unwrap();
    alice.handle.raise_hand().await.unwrap();
    alice.handle.start_recording().await.unwrap();
    wait_for_snapshot(&bob.handle, WAIT_TIMEOUT_MS, |s| {
        s.state.screen_sharer_id == Some(alice.id())
            && s.state.raised_hands.contains(&alice.id())
            && s.state.recording_active
    })
    .await
    .expect("bob never saw alice's flags");
    assert_eq!(bob.capture.calls(), vec!["start"]);

    bob.transport.simulate_disconnect().await;
    wait_for_snapshot(&bob.handle, WAIT_TIMEOUT_MS, |s| {
        s.status == SessionStatus::Reconnecting
    })
    .await
    .unwrap();

    // Everything alice held is withdrawn while bob cannot hear it.
    alice.handle.release_screen_share().await.unwrap();
    alice.handle.lower_hand().await.unwrap();
    alice.handle.stop_recording().await.unwrap();
    wait_for_snapshot(&carol.handle, WAIT_TIMEOUT_MS, |s| s.state.is_default())
        .await
        .expect("carol kept alice's flags");

    let mut bob_events = bob.handle.subscribe();
    bob.transport.reconnect();

    wait_for_event(&mut bob_events, WAIT_TIMEOUT_MS, |e| {
        *e == SessionEvent::RecordingChanged(false)
    })
    .await
    .expect("stale recording flag survived the resync");
    let settled = wait_for_event(&mut bob_events, WAIT_TIMEOUT_MS, |e| {
        matches!(e, SessionEvent::Reconciled(_))
    })
    .await
    .expect("resync round never settled");
    assert_eq!(settled, SessionEvent::Reconciled(SessionState::default()));

    wait_for_mesh(&[&alice.handle, &bob.handle, &carol.handle], WAIT_TIMEOUT_MS)
        .await
        .expect("Mesh never rebuilt after reconnect");

    // bob's rejoin must not have switched anything back on elsewhere.
    for peer in [&alice, &bob, &carol] {
        let snapshot = peer.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state, SessionState::default());
    }
    assert_eq!(alice.capture.calls(), vec!["start", "finish"]);
    assert_eq!(carol.capture.calls(), vec!["start", "finish"]);
    assert_eq!(bob.capture.calls(), vec!["start", "finish"]);
    assert_eq!(bob.sink.recordings().len(), 1);

    bob.handle.acquire_screen_share().await.unwrap();

    for peer in [&alice, &bob, &carol] {
        peer.handle.leave().await.unwrap();
    }
}
