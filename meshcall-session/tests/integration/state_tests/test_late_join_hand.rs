use meshcall_session::{LocalRelay, SessionEvent};
use std::time::Duration;
use tokio::time::{Instant, sleep, sleep_until};

use crate::integration::{init_tracing, spawn_peer};
use crate::utils::{WAIT_TIMEOUT_MS, wait_for_event, wait_for_mesh, wait_for_snapshot};

#[tokio::test(start_paused = true)]
async fn test_late_joiner_inherits_hand_age() {
    init_tracing();

    let relay = LocalRelay::new();
    let alice = spawn_peer(&relay, "alice").await;
    let bob = spawn_peer(&relay, "bob").await;
    wait_for_mesh(&[&alice.handle, &bob.handle], WAIT_TIMEOUT_MS)
        .await
        .unwrap();

    alice.handle.raise_hand().await.unwrap();
    let raised_at = Instant::now();

    sleep(Duration::from_secs(10)).await;

    let carol = spawn_peer(&relay, "carol").await;
    let mut events = carol.handle.subscribe();
    let reconciled = wait_for_event(&mut events, WAIT_TIMEOUT_MS, |e| {
        matches!(e, SessionEvent::Reconciled(_))
    })
    .await
    .expect("carol never reconciled");

    let SessionEvent::Reconciled(state) = reconciled else {
        unreachable!();
    };
    assert!(state.raised_hands.contains(&alice.id()));

    // The hand keeps the age it had when carol joined, not a fresh lifetime.
    sleep_until(raised_at + Duration::from_secs(49)).await;
    let snapshot = carol.handle.snapshot().await.unwrap();
    assert!(snapshot.state.raised_hands.contains(&alice.id()));

    sleep_until(raised_at + Duration::from_secs(51)).await;
    wait_for_snapshot(&carol.handle, 100, |s| s.state.raised_hands.is_empty())
        .await
        .expect("late joiner kept the hand past its lifetime");

    alice.handle.leave().await.unwrap();
    bob.handle.leave().await.unwrap();
    carol.handle.leave().await.unwrap();
}
