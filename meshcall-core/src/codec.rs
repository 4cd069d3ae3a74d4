//! JSON wire codec for [`Envelope`].
//!
//! On the wire an envelope is one flat object:
//!
//! ```json
//! {"kind":"offer","from":"<uuid>","to":"all","sender":{...},"payload":{"sdp":"..."}}
//! ```
//!
//! `payload` is omitted for kinds that carry nothing.

use crate::model::{Envelope, PeerId, Sender, Signal, Target};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("bad payload for kind '{kind}': {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("envelope 'from' ({from}) does not match sender ({sender})")]
    SenderMismatch { from: PeerId, sender: PeerId },
}

#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    kind: String,
    from: PeerId,
    to: Target,
    sender: Sender,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    payload: Value,
}

pub struct SignalCodec;

impl SignalCodec {
    pub fn encode(envelope: &Envelope) -> Result<String, CodecError> {
        let tagged = serde_json::to_value(&envelope.signal).map_err(CodecError::Malformed)?;
        let (kind, payload) = match tagged {
            Value::Object(mut map) => {
                let kind = match map.remove("kind") {
                    Some(Value::String(kind)) => kind,
                    _ => envelope.signal.kind().to_owned(),
                };
                (kind, map.remove("payload").unwrap_or(Value::Null))
            }
            _ => (envelope.signal.kind().to_owned(), Value::Null),
        };

        let wire = WireEnvelope {
            kind,
            from: envelope.from,
            to: envelope.to,
            sender: envelope.sender.clone(),
            payload,
        };
        serde_json::to_string(&wire).map_err(CodecError::Malformed)
    }

    pub fn decode(text: &str) -> Result<Envelope, CodecError> {
        let wire: WireEnvelope = serde_json::from_str(text).map_err(CodecError::Malformed)?;

        if wire.from != wire.sender.peer_id {
            return Err(CodecError::SenderMismatch {
                from: wire.from,
                sender: wire.sender.peer_id,
            });
        }

        let mut tagged = Map::new();
        tagged.insert("kind".to_owned(), Value::String(wire.kind.clone()));
        if !wire.payload.is_null() {
            tagged.insert("payload".to_owned(), wire.payload);
        }

        let signal: Signal =
            serde_json::from_value(Value::Object(tagged)).map_err(|source| CodecError::Payload {
                kind: wire.kind,
                source,
            })?;

        Ok(Envelope {
            from: wire.from,
            to: wire.to,
            sender: wire.sender,
            signal,
        })
    }
}
