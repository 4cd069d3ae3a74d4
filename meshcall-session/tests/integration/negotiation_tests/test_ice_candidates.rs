use meshcall_session::LocalRelay;

use crate::integration::{init_tracing, spawn_peer};
use crate::utils::{WAIT_TIMEOUT_MS, wait_for_mesh, wait_for_snapshot};

#[tokio::test]
async fn test_candidates_cross_the_relay() {
    init_tracing();

    let relay = LocalRelay::new();
    let alice = spawn_peer(&relay, "alice").await;
    let bob = spawn_peer(&relay, "bob").await;
    wait_for_mesh(&[&alice.handle, &bob.handle], WAIT_TIMEOUT_MS)
        .await
        .unwrap();

    wait_for_snapshot(&bob.handle, WAIT_TIMEOUT_MS, |_| {
        !bob.links.candidates_from(&alice.id()).is_empty()
            && !alice.links.candidates_from(&bob.id()).is_empty()
    })
    .await
    .expect("Candidates never applied");

    // Candidates only ever reach a link after its remote description.
    assert_eq!(alice.links.early_candidates(), 0);
    assert_eq!(bob.links.early_candidates(), 0);

    alice.handle.leave().await.unwrap();
    bob.handle.leave().await.unwrap();
}
