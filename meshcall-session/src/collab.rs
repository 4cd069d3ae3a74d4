//! Capabilities the engine consumes but does not implement: chat payload
//! cipher, artifact persistence, local audio capture and the local
//! microphone switch.

use async_trait::async_trait;
use bytes::Bytes;
use meshcall_core::{PeerId, SessionCode};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("chat payload could not be opened: {0}")]
pub struct CipherError(pub String);

/// Pure transform applied to chat bodies on the way out and in.
pub trait PayloadCipher: Send + Sync {
    fn seal(&self, plain: &str) -> String;

    fn open(&self, sealed: &str) -> Result<String, CipherError>;
}

/// Leaves chat bodies untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainText;

impl PayloadCipher for PlainText {
    fn seal(&self, plain: &str) -> String {
        plain.to_owned()
    }

    fn open(&self, sealed: &str) -> Result<String, CipherError> {
        Ok(sealed.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRecord {
    pub session_code: SessionCode,
    pub from: PeerId,
    pub sender_name: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingArtifact {
    pub session_code: SessionCode,
    pub peer_id: PeerId,
    pub audio: Bytes,
}

/// Fire-and-forget persistence. Implementations must not block the caller.
pub trait ArtifactSink: Send + Sync {
    fn save_chat(&self, record: ChatRecord);

    fn save_recording(&self, artifact: RecordingArtifact);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl ArtifactSink for DiscardSink {
    fn save_chat(&self, _record: ChatRecord) {}

    fn save_recording(&self, _artifact: RecordingArtifact) {}
}

/// Local audio capture used while session recording is on.
#[async_trait]
pub trait AudioCapture: Send {
    async fn start(&mut self) -> anyhow::Result<()>;

    /// Stops capturing and returns everything captured since `start`,
    /// flushed and finalized.
    async fn finish(&mut self) -> anyhow::Result<Bytes>;
}

#[derive(Debug, Default)]
pub struct NullCapture;

#[async_trait]
impl AudioCapture for NullCapture {
    async fn start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn finish(&mut self) -> anyhow::Result<Bytes> {
        Ok(Bytes::new())
    }
}

/// Mute switch of the local microphone. Muting never renegotiates.
pub trait MicrophoneControl: Send + Sync {
    fn set_enabled(&self, enabled: bool);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoMicrophone;

impl MicrophoneControl for NoMicrophone {
    fn set_enabled(&self, _enabled: bool) {}
}

pub struct Collaborators {
    pub cipher: Arc<dyn PayloadCipher>,
    pub sink: Arc<dyn ArtifactSink>,
    pub capture: Box<dyn AudioCapture>,
    pub microphone: Arc<dyn MicrophoneControl>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            cipher: Arc::new(PlainText),
            sink: Arc::new(DiscardSink),
            capture: Box::new(NullCapture),
            microphone: Arc::new(NoMicrophone),
        }
    }
}
