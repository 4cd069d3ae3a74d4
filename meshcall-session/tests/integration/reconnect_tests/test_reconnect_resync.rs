use meshcall_session::{LocalRelay, SessionEvent, SessionStatus};

use crate::integration::{init_tracing, spawn_peer};
use crate::utils::{WAIT_TIMEOUT_MS, wait_for_event, wait_for_mesh, wait_for_snapshot};

#[tokio::test]
async fn test_reconnect_rebuilds_mesh_and_state() {
    init_tracing();

    let relay = LocalRelay::new();
    let alice = spawn_peer(&relay, "alice").await;
    let bob = spawn_peer(&relay, "bob").await;
    let carol = spawn_peer(&relay, "carol").await;
    wait_for_mesh(&[&alice.handle, &bob.handle, &carol.handle], WAIT_TIMEOUT_MS)
        .await
        .expect("Mesh of three never formed");

    alice.handle.raise_hand().await.unwrap();
    wait_for_snapshot(&bob.handle, WAIT_TIMEOUT_MS, |s| {
        s.state.raised_hands.contains(&alice.id())
    })
    .await
    .unwrap();

    let mut bob_events = bob.handle.subscribe();
    alice.transport.simulate_disconnect().await;

    wait_for_snapshot(&alice.handle, WAIT_TIMEOUT_MS, |s| {
        s.status == SessionStatus::Reconnecting
    })
    .await
    .expect("alice never noticed the drop");
    wait_for_event(&mut bob_events, WAIT_TIMEOUT_MS, |e| {
        *e == SessionEvent::PeerLeft(alice.id())
    })
    .await
    .expect("bob never saw alice drop");

    // Queued while the relay is away, delivered after rejoining.
    alice.handle.send_chat("still here").await.unwrap();

    alice.transport.reconnect();

    wait_for_snapshot(&alice.handle, WAIT_TIMEOUT_MS, |s| {
        s.status == SessionStatus::Connected
    })
    .await
    .expect("alice never rejoined");
    wait_for_mesh(&[&alice.handle, &bob.handle, &carol.handle], WAIT_TIMEOUT_MS)
        .await
        .expect("Mesh never rebuilt after reconnect");

    for peer in [&bob, &carol] {
        wait_for_snapshot(&peer.handle, WAIT_TIMEOUT_MS, |s| {
            s.state.raised_hands.contains(&alice.id())
        })
        .await
        .expect("alice's hand was not restored");
    }

    wait_for_snapshot(&bob.handle, WAIT_TIMEOUT_MS, |_| {
        bob.sink
            .chats()
            .iter()
            .any(|c| c.from == alice.id() && c.body == "still here")
    })
    .await
    .expect("queued chat was lost");

    for peer in [&alice, &bob, &carol] {
        peer.handle.leave().await.unwrap();
    }
}

#[tokio::test]
async fn test_stale_peer_dropped_on_resync() {
    init_tracing();

    let relay = LocalRelay::new();
    let alice = spawn_peer(&relay, "alice").await;
    let bob = spawn_peer(&relay, "bob").await;
    wait_for_mesh(&[&alice.handle, &bob.handle], WAIT_TIMEOUT_MS)
        .await
        .unwrap();

    alice.transport.simulate_disconnect().await;
    wait_for_snapshot(&alice.handle, WAIT_TIMEOUT_MS, |s| {
        s.status == SessionStatus::Reconnecting
    })
    .await
    .unwrap();

    // bob leaves while alice cannot hear it.
    bob.handle.leave().await.unwrap();

    alice.transport.reconnect();
    let snapshot = wait_for_snapshot(&alice.handle, WAIT_TIMEOUT_MS, |s| {
        s.status == SessionStatus::Connected && s.peers.is_empty()
    })
    .await
    .expect("stale peer survived the roster");
    assert!(snapshot.connected_peers().is_empty());

    alice.handle.leave().await.unwrap();
}
