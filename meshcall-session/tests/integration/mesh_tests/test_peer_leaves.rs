use meshcall_session::{LocalRelay, SessionEvent, SessionStatus};

use crate::integration::{init_tracing, spawn_peer};
use crate::utils::{WAIT_TIMEOUT_MS, wait_for_event, wait_for_mesh, wait_for_snapshot};

#[tokio::test]
async fn test_peer_leaves() {
    init_tracing();

    let relay = LocalRelay::new();
    let alice = spawn_peer(&relay, "alice").await;
    let bob = spawn_peer(&relay, "bob").await;
    let carol = spawn_peer(&relay, "carol").await;
    wait_for_mesh(&[&alice.handle, &bob.handle, &carol.handle], WAIT_TIMEOUT_MS)
        .await
        .expect("Mesh of three never formed");

    bob.handle.raise_hand().await.unwrap();
    bob.handle.take_floor().await.unwrap();
    wait_for_snapshot(&alice.handle, WAIT_TIMEOUT_MS, |s| {
        s.state.raised_hands.contains(&bob.id()) && s.state.mic_floor_holder_ids.contains(&bob.id())
    })
    .await
    .expect("alice never saw bob's hand and floor");

    let mut alice_events = alice.handle.subscribe();
    bob.handle.leave().await.unwrap();
    assert_eq!(*bob.handle.status().borrow(), SessionStatus::Closed);

    wait_for_event(&mut alice_events, WAIT_TIMEOUT_MS, |e| {
        *e == SessionEvent::PeerLeft(bob.id())
    })
    .await
    .expect("alice never saw bob leave");

    for peer in [&alice, &carol] {
        let snapshot = wait_for_snapshot(&peer.handle, WAIT_TIMEOUT_MS, |s| {
            s.peer(&bob.id()).is_none()
        })
        .await
        .expect("bob still listed");
        assert!(!snapshot.state.raised_hands.contains(&bob.id()));
        assert!(!snapshot.state.mic_floor_holder_ids.contains(&bob.id()));
        assert_eq!(snapshot.connected_peers().len(), 1);
    }

    assert!(bob.handle.raise_hand().await.is_err());

    alice.handle.leave().await.unwrap();
    carol.handle.leave().await.unwrap();
}
