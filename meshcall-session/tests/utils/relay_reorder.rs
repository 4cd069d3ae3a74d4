use meshcall_core::{Signal, SignalCodec};
use meshcall_session::TransportEvent;
use tokio::sync::mpsc;

/// Forwards relay traffic unchanged, except that the roster delivered after
/// a reconnect is held back until the first offer that follows it has been
/// passed on. Topics carry no ordering promise between each other, and
/// this is an order the local relay never produces on its own.
pub fn hold_resync_roster(
    mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
) -> mpsc::UnboundedReceiver<TransportEvent> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut connects = 0;
        let mut held = None;
        let mut released = false;

        while let Some(event) = inbound.recv().await {
            let signal = match &event {
                TransportEvent::Connected => {
                    connects += 1;
                    None
                }
                TransportEvent::Frame { frame, .. } if connects > 1 && !released => {
                    SignalCodec::decode(frame).ok().map(|e| e.signal)
                }
                _ => None,
            };

            let forward = match signal {
                Some(Signal::MeetingUsers { .. }) if held.is_none() => {
                    held = Some(event);
                    continue;
                }
                Some(Signal::Offer { .. }) if held.is_some() => {
                    released = true;
                    [Some(event), held.take()]
                }
                _ => [Some(event), None],
            };

            for event in forward.into_iter().flatten() {
                if tx.send(event).is_err() {
                    return;
                }
            }
        }
    });
    rx
}
