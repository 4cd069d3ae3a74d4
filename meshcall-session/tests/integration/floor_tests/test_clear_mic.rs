use meshcall_session::{LocalRelay, SessionError, SessionEvent};

use crate::integration::{PeerOptions, init_tracing, spawn_peer, spawn_peer_with};
use crate::utils::{WAIT_TIMEOUT_MS, wait_for_event, wait_for_mesh, wait_for_snapshot};

#[tokio::test]
async fn test_president_clears_every_floor() {
    init_tracing();

    let relay = LocalRelay::new();
    let president = spawn_peer_with(&relay, "president", PeerOptions::president()).await;
    let bob = spawn_peer(&relay, "bob").await;
    let carol = spawn_peer(&relay, "carol").await;
    wait_for_mesh(
        &[&president.handle, &bob.handle, &carol.handle],
        WAIT_TIMEOUT_MS,
    )
    .await
    .expect("Mesh of three never formed");

    bob.handle.take_floor().await.unwrap();
    carol.handle.take_floor().await.unwrap();
    wait_for_snapshot(&president.handle, WAIT_TIMEOUT_MS, |s| {
        s.state.mic_floor_holder_ids.len() == 2
    })
    .await
    .expect("president never saw both floors");

    let mut bob_events = bob.handle.subscribe();
    let mut carol_events = carol.handle.subscribe();

    president.handle.revoke_all_floors().await.unwrap();

    for events in [&mut bob_events, &mut carol_events] {
        wait_for_event(events, WAIT_TIMEOUT_MS, |e| *e == SessionEvent::FloorCleared)
            .await
            .expect("floor was never cleared");
    }
    for peer in [&president, &bob, &carol] {
        wait_for_snapshot(&peer.handle, WAIT_TIMEOUT_MS, |s| {
            s.state.mic_floor_holder_ids.is_empty()
        })
        .await
        .expect("floor holders left after clear");
    }

    assert_eq!(bob.microphone.switches(), vec![true, false]);
    assert_eq!(carol.microphone.switches(), vec![true, false]);

    for peer in [&president, &bob, &carol] {
        peer.handle.leave().await.unwrap();
    }
}

#[tokio::test]
async fn test_member_cannot_clear_floors() {
    init_tracing();

    let relay = LocalRelay::new();
    let alice = spawn_peer(&relay, "alice").await;
    let bob = spawn_peer(&relay, "bob").await;
    wait_for_mesh(&[&alice.handle, &bob.handle], WAIT_TIMEOUT_MS)
        .await
        .unwrap();

    alice.handle.take_floor().await.unwrap();
    wait_for_snapshot(&bob.handle, WAIT_TIMEOUT_MS, |s| {
        s.state.mic_floor_holder_ids.contains(&alice.id())
    })
    .await
    .unwrap();

    let result = bob.handle.revoke_all_floors().await;
    assert!(matches!(result, Err(SessionError::NotPermitted(_))));

    let snapshot = alice.handle.snapshot().await.unwrap();
    assert!(snapshot.state.mic_floor_holder_ids.contains(&alice.id()));
    assert_eq!(alice.microphone.switches(), vec![true]);

    alice.handle.leave().await.unwrap();
    bob.handle.leave().await.unwrap();
}
