use anyhow::{Result, bail};
use meshcall_core::PeerId;
use meshcall_session::{SessionEvent, SessionHandle, SessionSnapshot};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

pub const WAIT_TIMEOUT_MS: u64 = 5_000;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Polls snapshots until `predicate` holds.
pub async fn wait_for_snapshot(
    handle: &SessionHandle,
    timeout_ms: u64,
    predicate: impl Fn(&SessionSnapshot) -> bool,
) -> Result<SessionSnapshot> {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);

    loop {
        let snapshot = handle.snapshot().await?;
        if predicate(&snapshot) {
            return Ok(snapshot);
        }
        if Instant::now() >= deadline {
            bail!(
                "Timeout waiting on {} (status: {:?}, state: {:?}, peers: {:?})",
                handle.peer_id(),
                snapshot.status,
                snapshot.state,
                snapshot
                    .peers
                    .iter()
                    .map(|p| (p.peer_id, p.connection_state))
                    .collect::<Vec<_>>()
            );
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Waits until every handle holds a connected link to every other one.
pub async fn wait_for_mesh(handles: &[&SessionHandle], timeout_ms: u64) -> Result<()> {
    let all: BTreeSet<PeerId> = handles.iter().map(|h| h.peer_id()).collect();

    for handle in handles {
        let mut expected = all.clone();
        expected.remove(&handle.peer_id());
        wait_for_snapshot(handle, timeout_ms, |s| s.connected_peers() == expected).await?;
    }
    Ok(())
}

/// Receives events until one matches `predicate`.
pub async fn wait_for_event(
    rx: &mut broadcast::Receiver<SessionEvent>,
    timeout_ms: u64,
    predicate: impl Fn(&SessionEvent) -> bool,
) -> Result<SessionEvent> {
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(event) if predicate(&event) => return Ok(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => bail!("Event channel closed"),
            }
        }
    };

    match tokio::time::timeout(Duration::from_millis(timeout_ms), wait).await {
        Ok(result) => result,
        Err(_) => bail!("Timeout waiting for event"),
    }
}

/// Drains whatever arrives within `ms`.
pub async fn collect_events(
    rx: &mut broadcast::Receiver<SessionEvent>,
    ms: u64,
) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    let deadline = Instant::now() + Duration::from_millis(ms);

    while let Ok(Ok(event)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        events.push(event);
    }
    events
}
