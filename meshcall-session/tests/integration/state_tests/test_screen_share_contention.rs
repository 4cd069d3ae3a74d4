use meshcall_session::{LocalRelay, SessionError};

use crate::integration::{init_tracing, spawn_peer};
use crate::utils::{WAIT_TIMEOUT_MS, wait_for_mesh, wait_for_snapshot};

#[tokio::test]
async fn test_second_sharer_is_refused() {
    init_tracing();

    let relay = LocalRelay::new();
    let alice = spawn_peer(&relay, "alice").await;
    let bob = spawn_peer(&relay, "bob").await;
    wait_for_mesh(&[&alice.handle, &bob.handle], WAIT_TIMEOUT_MS)
        .await
        .unwrap();

    assert!(matches!(
        bob.handle.request_screen().await,
        Err(SessionError::NoScreenShare)
    ));

    alice.handle.acquire_screen_share().await.unwrap();
    wait_for_snapshot(&bob.handle, WAIT_TIMEOUT_MS, |s| {
        s.state.screen_sharer_id == Some(alice.id())
    })
    .await
    .unwrap();

    let refused = bob.handle.acquire_screen_share().await;
    assert!(matches!(refused, Err(SessionError::ScreenShareHeld(holder)) if holder == alice.id()));
    let snapshot = bob.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state.screen_sharer_id, Some(alice.id()));

    // Capture ending in the browser frees the slot for everyone.
    alice.handle.screen_capture_ended().await.unwrap();
    wait_for_snapshot(&bob.handle, WAIT_TIMEOUT_MS, |s| s.state.screen_sharer_id.is_none())
        .await
        .expect("slot never freed");

    bob.handle.acquire_screen_share().await.unwrap();
    wait_for_snapshot(&alice.handle, WAIT_TIMEOUT_MS, |s| {
        s.state.screen_sharer_id == Some(bob.id())
    })
    .await
    .unwrap();

    alice.handle.leave().await.unwrap();
    bob.handle.leave().await.unwrap();
}

#[tokio::test]
async fn test_screen_request_renegotiates_with_requester() {
    init_tracing();

    let relay = LocalRelay::new();
    let alice = spawn_peer(&relay, "alice").await;
    let bob = spawn_peer(&relay, "bob").await;
    wait_for_mesh(&[&alice.handle, &bob.handle], WAIT_TIMEOUT_MS)
        .await
        .unwrap();

    alice.handle.acquire_screen_share().await.unwrap();
    wait_for_snapshot(&bob.handle, WAIT_TIMEOUT_MS, |s| {
        s.state.screen_sharer_id == Some(alice.id())
    })
    .await
    .unwrap();

    let offers = alice.links.offers_to(&bob.id());
    bob.handle.request_screen().await.unwrap();

    wait_for_snapshot(&alice.handle, WAIT_TIMEOUT_MS, |_| {
        alice.links.offers_to(&bob.id()) == offers + 1
    })
    .await
    .expect("sharer never renegotiated");
    wait_for_mesh(&[&alice.handle, &bob.handle], WAIT_TIMEOUT_MS)
        .await
        .unwrap();

    alice.handle.leave().await.unwrap();
    bob.handle.leave().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_claims_converge() {
    init_tracing();

    let relay = LocalRelay::new();
    let alice = spawn_peer(&relay, "alice").await;
    let bob = spawn_peer(&relay, "bob").await;
    wait_for_mesh(&[&alice.handle, &bob.handle], WAIT_TIMEOUT_MS)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        alice.handle.acquire_screen_share(),
        bob.handle.acquire_screen_share()
    );
    // A refused claim means the other one was seen first. When both went
    // out before either was seen, the lower id keeps the slot.
    let expected = match (&a, &b) {
        (Ok(()), Ok(())) => alice.id().min(bob.id()),
        (Ok(()), Err(_)) => alice.id(),
        (Err(_), Ok(())) => bob.id(),
        (Err(_), Err(_)) => panic!("both claims refused"),
    };

    for peer in [&alice, &bob] {
        wait_for_snapshot(&peer.handle, WAIT_TIMEOUT_MS, |s| {
            s.state.screen_sharer_id == Some(expected)
        })
        .await
        .expect("peers disagree on the sharer");
    }

    alice.handle.leave().await.unwrap();
    bob.handle.leave().await.unwrap();
}
