pub mod archive;
pub mod consensus;
pub mod crypto;
pub mod gps;
pub mod hlc;
pub mod net;
pub mod node;
pub mod oscillator;
pub mod proof;
pub mod timekeeping;
pub mod types;

pub use archive::{ArchiveClient, ArchiveError};
pub use consensus::{ConsensusError, ConsensusView, median_local_time};
pub use crypto::{CryptoError, SecureElement, hmac_tag, hmac_verify, sha3, verify};
pub use gps::{GpsData, GpsError, GpsSource, SimulatedGps};
pub use hlc::{HlcClock, HlcTimestamp};
pub use net::{
    AuthError, Authenticator, EngineSnapshot, Message, MessageId, MessageKind, RejectCounters,
    ReplayCache, Sample, SyncEngine, TimeRequestPayload, TimeResponsePayload, WireError,
};
pub use node::{Node, NodeConfig, NodeError};
pub use oscillator::Oscillator;
pub use proof::{ProofError, ProofGenerator, TimeProof, ZERO_HASH_HEX, verify_chain};
pub use timekeeping::TimekeepingUnit;
pub use types::*;
