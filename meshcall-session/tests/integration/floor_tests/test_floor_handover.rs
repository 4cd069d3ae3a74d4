use meshcall_session::LocalRelay;

use crate::integration::{init_tracing, spawn_peer};
use crate::utils::{WAIT_TIMEOUT_MS, wait_for_mesh, wait_for_snapshot};

#[tokio::test]
async fn test_floor_holders_are_a_set() {
    init_tracing();

    let relay = LocalRelay::new();
    let alice = spawn_peer(&relay, "alice").await;
    let bob = spawn_peer(&relay, "bob").await;
    wait_for_mesh(&[&alice.handle, &bob.handle], WAIT_TIMEOUT_MS)
        .await
        .unwrap();

    alice.handle.take_floor().await.unwrap();
    bob.handle.take_floor().await.unwrap();
    for peer in [&alice, &bob] {
        wait_for_snapshot(&peer.handle, WAIT_TIMEOUT_MS, |s| {
            s.state.mic_floor_holder_ids.len() == 2
        })
        .await
        .expect("concurrent floors not both visible");
    }

    alice.handle.release_floor().await.unwrap();
    wait_for_snapshot(&bob.handle, WAIT_TIMEOUT_MS, |s| {
        !s.state.mic_floor_holder_ids.contains(&alice.id())
            && s.state.mic_floor_holder_ids.contains(&bob.id())
    })
    .await
    .expect("release never propagated");
    assert_eq!(alice.microphone.switches(), vec![true, false]);

    // Releasing a floor we do not hold is a no-op.
    alice.handle.release_floor().await.unwrap();
    assert_eq!(alice.microphone.switches(), vec![true, false]);

    alice.handle.leave().await.unwrap();
    bob.handle.leave().await.unwrap();
}
