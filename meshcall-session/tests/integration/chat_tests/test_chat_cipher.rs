use meshcall_core::{JoinRequest, PeerId, Profile, Role, SessionCode, Signal, SignalCodec};
use meshcall_session::{LocalRelay, SessionEvent, SignalTransport, TransportEvent};
use std::time::Duration;

use crate::integration::{SESSION, init_tracing, spawn_peer};
use crate::utils::{ReversingCipher, WAIT_TIMEOUT_MS, wait_for_event, wait_for_mesh};

#[tokio::test]
async fn test_chat_is_sealed_on_the_wire() {
    init_tracing();

    let relay = LocalRelay::new();
    let alice = spawn_peer(&relay, "alice").await;
    let bob = spawn_peer(&relay, "bob").await;
    wait_for_mesh(&[&alice.handle, &bob.handle], WAIT_TIMEOUT_MS)
        .await
        .unwrap();

    let (observer, mut wire) = relay.connect();
    observer
        .join(JoinRequest {
            session_code: SessionCode::new(SESSION),
            peer_id: PeerId::new(),
            profile: Profile::new("observer", "observer"),
            role: Role::Member,
        })
        .await
        .unwrap();

    let mut bob_events = bob.handle.subscribe();
    alice.handle.send_chat("hello mesh").await.unwrap();

    let event = wait_for_event(&mut bob_events, WAIT_TIMEOUT_MS, |e| {
        matches!(e, SessionEvent::Chat { .. })
    })
    .await
    .expect("bob never got the chat");
    let SessionEvent::Chat { from, body } = event else {
        unreachable!();
    };
    assert_eq!(from.peer_id, alice.id());
    assert_eq!(from.profile.name, "alice");
    assert_eq!(body, "hello mesh");

    let sealed = tokio::time::timeout(Duration::from_millis(WAIT_TIMEOUT_MS), async {
        while let Some(event) = wire.recv().await {
            let TransportEvent::Frame { frame, .. } = event else {
                continue;
            };
            if let Ok(envelope) = SignalCodec::decode(&frame) {
                if let Signal::Chat { body } = envelope.signal {
                    return Some(body);
                }
            }
        }
        None
    })
    .await
    .expect("observer never saw the chat")
    .expect("observer channel closed");
    assert!(sealed.starts_with(ReversingCipher::TAG));
    assert!(!sealed.contains("hello mesh"));

    // Both ends persist the plain text.
    let sent = alice.sink.chats();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body, "hello mesh");
    assert_eq!(sent[0].sender_name, "alice");
    let received = bob.sink.chats();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].from, alice.id());

    alice.handle.leave().await.unwrap();
    bob.handle.leave().await.unwrap();
}
