//! Peer synchronization over UDP: wire messages, the authentication gate,
//! and the fusion engine.

pub mod auth;
pub mod engine;
pub mod message;

pub use auth::{AuthError, Authenticator, RejectCounters, ReplayCache};
pub use engine::{EngineSnapshot, Peer, Sample, SyncEngine};
pub use message::{
    Message, MessageId, MessageKind, TimeRequestPayload, TimeResponsePayload, WireError,
};
